//! In-memory key-value/hash backend.
//!
//! Mirrors the Redis semantics the registry relies on: missing hashes read as
//! empty, emptied hashes and sets disappear, and every call is atomic.

use super::traits::KeyValueStore;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Keyspace {
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
}

/// In-memory store for tests and single-process deployments.
///
/// Data is not persisted between runs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<Keyspace>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys held (hashes and sets).
    #[must_use]
    pub fn key_count(&self) -> usize {
        let data = self.read();
        data.hashes.len() + data.sets.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Keyspace> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Keyspace> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for InMemoryStore {
    fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.write()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.read().hashes.get(key).cloned().unwrap_or_default())
    }

    fn hash_delete(&self, key: &str) -> Result<bool> {
        Ok(self.write().hashes.remove(key).is_some())
    }

    fn hash_delete_field(&self, key: &str, field: &str) -> Result<bool> {
        let mut data = self.write();
        let Some(hash) = data.hashes.get_mut(key) else {
            return Ok(false);
        };
        let removed = hash.remove(field).is_some();
        if hash.is_empty() {
            data.hashes.remove(key);
        }
        Ok(removed)
    }

    fn hash_increment_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut data = self.write();
        let slot = data
            .hashes
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert_with(|| "0".to_string());
        let current: i64 = slot
            .parse()
            .map_err(|_| Error::store("hincrby", format!("{key}.{field} is not an integer")))?;
        let next = current
            .checked_add(delta)
            .ok_or_else(|| Error::store("hincrby", format!("{key}.{field} overflow")))?;
        *slot = next.to_string();
        Ok(next)
    }

    fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .write()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let mut data = self.write();
        let Some(set) = data.sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            data.sets.remove(key);
        }
        Ok(removed)
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .read()
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .read()
            .sets
            .get(key)
            .is_some_and(|set| set.contains(member)))
    }

    fn set_cardinality(&self, key: &str) -> Result<usize> {
        Ok(self.read().sets.get(key).map_or(0, HashSet::len))
    }

    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let data = self.read();
        let mut keys: Vec<String> = data
            .hashes
            .keys()
            .chain(data.sets.keys())
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
