//! Key-value/hash store contract.

use crate::Result;
use std::collections::HashMap;

/// Trait for key-value/hash store backends.
///
/// Each method is one store round-trip and is atomic on its own. Nothing
/// spanning several calls is atomic; the registry layers ordering and
/// compensation on top.
pub trait KeyValueStore: Send + Sync {
    /// Sets one field of a hash.
    fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Reads every field of a hash. A missing key reads as an empty map.
    fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Deletes a whole hash.
    ///
    /// # Returns
    ///
    /// True if the key existed.
    fn hash_delete(&self, key: &str) -> Result<bool>;

    /// Removes one field from a hash.
    fn hash_delete_field(&self, key: &str, field: &str) -> Result<bool>;

    /// Atomically adds `delta` to an integer hash field, creating it at 0.
    ///
    /// # Returns
    ///
    /// The value after the increment.
    fn hash_increment_by(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    /// Adds a member to a set.
    ///
    /// # Returns
    ///
    /// True if the member was newly added.
    fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Removes a member from a set.
    ///
    /// # Returns
    ///
    /// True if the member was present.
    fn set_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// Lists the members of a set, in no particular order.
    fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Checks set membership.
    fn set_contains(&self, key: &str, member: &str) -> Result<bool>;

    /// Returns the number of members in a set.
    fn set_cardinality(&self, key: &str) -> Result<usize>;

    /// Lists keys starting with `prefix`.
    ///
    /// Used only by maintenance scans; backends may iterate incrementally.
    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>>;
}
