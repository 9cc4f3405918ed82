//! Incremental counter maintenance.
//!
//! Deltas are computed from record snapshots as plain data, then applied
//! with one atomic `HINCRBY` per counter field. Computation never touches
//! the store, so the rules are testable on their own.

use crate::Result;
use crate::models::Resident;
use crate::storage::{
    KeySpace, KeyValueStore, TOTAL_RESIDENTS_FIELD, TOTAL_VOTERS_FIELD, subdivision_field,
};
use std::sync::Arc;

/// Signed adjustments to counter fields.
///
/// Zero entries are dropped, so an empty delta means "no writes".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterDelta {
    entries: Vec<(String, i64)>,
}

impl CounterDelta {
    /// Creates an empty delta.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Delta for a newly created resident.
    #[must_use]
    pub fn for_create(resident: &Resident) -> Self {
        let mut delta = Self::new();
        delta.add(TOTAL_RESIDENTS_FIELD, 1);
        if resident.is_registered_voter() {
            delta.add(TOTAL_VOTERS_FIELD, 1);
        }
        if let Some(purok) = resident.purok() {
            delta.add(subdivision_field(purok), 1);
        }
        delta
    }

    /// Delta for a deleted resident, from its last snapshot.
    #[must_use]
    pub fn for_delete(snapshot: &Resident) -> Self {
        Self::for_create(snapshot).negated()
    }

    /// Delta for an update.
    ///
    /// The voter count moves only on a status transition. A purok change
    /// moves one resident between the two subdivision counters.
    #[must_use]
    pub fn for_update(before: &Resident, after: &Resident) -> Self {
        let mut delta = Self::new();
        match (before.is_registered_voter(), after.is_registered_voter()) {
            (false, true) => delta.add(TOTAL_VOTERS_FIELD, 1),
            (true, false) => delta.add(TOTAL_VOTERS_FIELD, -1),
            _ => {},
        }
        let (old, new) = (before.purok(), after.purok());
        if old != new {
            if let Some(old) = old {
                delta.add(subdivision_field(old), -1);
            }
            if let Some(new) = new {
                delta.add(subdivision_field(new), 1);
            }
        }
        delta
    }

    /// Adds to a field, merging with any existing entry.
    pub fn add(&mut self, field: impl Into<String>, amount: i64) {
        let field = field.into();
        if let Some(index) = self.entries.iter().position(|(f, _)| *f == field) {
            self.entries[index].1 += amount;
            if self.entries[index].1 == 0 {
                self.entries.remove(index);
            }
        } else if amount != 0 {
            self.entries.push((field, amount));
        }
    }

    /// Returns the adjustment for a field (0 when absent).
    #[must_use]
    pub fn get(&self, field: &str) -> i64 {
        self.entries
            .iter()
            .find(|(f, _)| f == field)
            .map_or(0, |(_, amount)| *amount)
    }

    /// Returns the delta with every sign flipped.
    #[must_use]
    pub fn negated(mut self) -> Self {
        for (_, amount) in &mut self.entries {
            *amount = -*amount;
        }
        self
    }

    /// Iterates non-zero entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(f, a)| (f.as_str(), *a))
    }

    /// Returns true if there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Applies counter deltas to the counters row.
#[derive(Clone)]
pub struct CounterMaintainer {
    store: Arc<dyn KeyValueStore>,
    keys: KeySpace,
}

impl CounterMaintainer {
    /// Creates a maintainer over a store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Applies each entry with an atomic increment.
    ///
    /// Returns the number of entries applied before any failure.
    ///
    /// # Errors
    ///
    /// Returns `(applied, error)` on the first failed increment. Entries
    /// already applied stay applied.
    pub fn apply(&self, delta: &CounterDelta) -> std::result::Result<usize, (usize, crate::Error)> {
        let key = self.keys.counters();
        let mut applied = 0;
        for (field, amount) in delta.iter() {
            self.store
                .hash_increment_by(&key, field, amount)
                .map_err(|e| (applied, e))?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Reads a single counter (0 when absent or unparsable).
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn read(&self, field: &str) -> Result<i64> {
        let row = self.store.hash_get_all(&self.keys.counters())?;
        Ok(row.get(field).and_then(|v| v.parse().ok()).unwrap_or(0))
    }
}
