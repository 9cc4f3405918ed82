//! Shared test helpers: a store that fails on demand.

#![allow(dead_code, clippy::unwrap_used)]

use barangay::models::{FieldSet, ResidentField};
use barangay::storage::{InMemoryStore, KeyValueStore};
use barangay::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Planned failure for one store operation.
#[derive(Debug, Clone)]
struct Fault {
    operation: &'static str,
    /// Matching calls still to let through before failing.
    skip: usize,
    /// Keep failing after the first hit.
    persistent: bool,
}

/// Action run just before one store operation reaches the data.
struct Hook {
    operation: &'static str,
    skip: usize,
    action: Box<dyn FnOnce() + Send>,
}

/// In-memory store with injectable `StoreUnavailable` failures and
/// interleaved actions.
///
/// Clones share data, fault plans and hooks, so a clone can be handed to a
/// wrapper while the test keeps control.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: Arc<InMemoryStore>,
    faults: Arc<Mutex<Vec<Fault>>>,
    hooks: Arc<Mutex<Vec<Hook>>>,
    calls: Arc<Mutex<HashMap<&'static str, usize>>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the `nth` (1-based) future call of `operation`, once.
    pub fn fail_nth(&self, operation: &'static str, nth: usize) {
        self.faults.lock().unwrap().push(Fault {
            operation,
            skip: nth.saturating_sub(1),
            persistent: false,
        });
    }

    /// Fails every future call of `operation` until healed.
    pub fn fail_always(&self, operation: &'static str) {
        self.faults.lock().unwrap().push(Fault {
            operation,
            skip: 0,
            persistent: true,
        });
    }

    /// Runs `action` once, just before the `nth` (1-based) future call of
    /// `operation` touches the data.
    ///
    /// The action may call back into the store; calls it makes do not count
    /// toward its own trigger.
    pub fn before_nth(
        &self,
        operation: &'static str,
        nth: usize,
        action: impl FnOnce() + Send + 'static,
    ) {
        self.hooks.lock().unwrap().push(Hook {
            operation,
            skip: nth.saturating_sub(1),
            action: Box::new(action),
        });
    }

    /// Removes every planned failure.
    pub fn heal(&self) {
        self.faults.lock().unwrap().clear();
    }

    /// Number of calls made to `operation`.
    pub fn calls(&self, operation: &'static str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    /// Keys held by the underlying store.
    pub fn key_count(&self) -> usize {
        self.inner.key_count()
    }

    /// Takes the hook due on this call, if any.
    fn due_hook(&self, operation: &'static str) -> Option<Hook> {
        let mut hooks = self.hooks.lock().unwrap();
        let index = hooks.iter().position(|h| h.operation == operation)?;
        if hooks[index].skip > 0 {
            hooks[index].skip -= 1;
            return None;
        }
        Some(hooks.remove(index))
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        if let Some(hook) = self.due_hook(operation) {
            (hook.action)();
        }
        let mut faults = self.faults.lock().unwrap();
        let Some(index) = faults.iter().position(|f| f.operation == operation) else {
            return Ok(());
        };
        let fault = &mut faults[index];
        if fault.skip > 0 {
            fault.skip -= 1;
            return Ok(());
        }
        if !fault.persistent {
            faults.remove(index);
        }
        Err(Error::StoreUnavailable {
            operation: operation.to_string(),
            cause: "injected failure".to_string(),
        })
    }
}

impl KeyValueStore for FlakyStore {
    fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.check("hash_set")?;
        self.inner.hash_set(key, field, value)
    }

    fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        self.check("hash_get_all")?;
        self.inner.hash_get_all(key)
    }

    fn hash_delete(&self, key: &str) -> Result<bool> {
        self.check("hash_delete")?;
        self.inner.hash_delete(key)
    }

    fn hash_delete_field(&self, key: &str, field: &str) -> Result<bool> {
        self.check("hash_delete_field")?;
        self.inner.hash_delete_field(key, field)
    }

    fn hash_increment_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.check("hash_increment_by")?;
        self.inner.hash_increment_by(key, field, delta)
    }

    fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        self.check("set_add")?;
        self.inner.set_add(key, member)
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.check("set_remove")?;
        self.inner.set_remove(key, member)
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.check("set_members")?;
        self.inner.set_members(key)
    }

    fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        self.check("set_contains")?;
        self.inner.set_contains(key, member)
    }

    fn set_cardinality(&self, key: &str) -> Result<usize> {
        self.check("set_cardinality")?;
        self.inner.set_cardinality(key)
    }

    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.check("scan_keys")?;
        self.inner.scan_keys(prefix)
    }
}

/// A resident with the fields the counters care about.
pub fn resident(gender: &str, status: &str, purok: &str) -> FieldSet {
    FieldSet::new()
        .with(ResidentField::FirstName, "Test")
        .with(ResidentField::LastName, "Resident")
        .with(ResidentField::Gender, gender)
        .with(ResidentField::VotersStatus, status)
        .with(ResidentField::Purok, purok)
}
