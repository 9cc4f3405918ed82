//! Persisted key layout.
//!
//! | Key | Type | Contents |
//! |-----|------|----------|
//! | `{ns}:resident:{id}` | hash | one resident's fields |
//! | `{ns}:residents` | set | ids of every live resident |
//! | `{ns}:counters` | hash | `totalResidents`, `totalVoters`, `residents:{purok}` |

use crate::models::ResidentId;

/// Counters-row field holding the resident total.
pub const TOTAL_RESIDENTS_FIELD: &str = "totalResidents";

/// Counters-row field holding the registered-voter total.
pub const TOTAL_VOTERS_FIELD: &str = "totalVoters";

/// Prefix of per-purok counter fields.
pub const SUBDIVISION_FIELD_PREFIX: &str = "residents:";

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "barangay";

/// Names every key the registry touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl KeySpace {
    /// Creates a key space under the given namespace.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key of a resident's hash.
    #[must_use]
    pub fn resident(&self, id: &ResidentId) -> String {
        format!("{}{}", self.resident_prefix(), id.as_str())
    }

    /// Prefix shared by every resident hash key.
    #[must_use]
    pub fn resident_prefix(&self) -> String {
        format!("{}:resident:", self.namespace)
    }

    /// Extracts the resident id from a resident hash key.
    #[must_use]
    pub fn resident_id_from_key(&self, key: &str) -> Option<ResidentId> {
        key.strip_prefix(&self.resident_prefix())
            .filter(|id| !id.is_empty())
            .map(ResidentId::from)
    }

    /// Key of the membership set.
    #[must_use]
    pub fn members(&self) -> String {
        format!("{}:residents", self.namespace)
    }

    /// Key of the shared counters row.
    #[must_use]
    pub fn counters(&self) -> String {
        format!("{}:counters", self.namespace)
    }
}

/// Counters-row field for a purok.
#[must_use]
pub fn subdivision_field(purok: &str) -> String {
    format!("{SUBDIVISION_FIELD_PREFIX}{purok}")
}

/// Extracts the purok from a counters-row field name.
#[must_use]
pub fn subdivision_from_field(field: &str) -> Option<&str> {
    field.strip_prefix(SUBDIVISION_FIELD_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = KeySpace::new("brgy");
        let id = ResidentId::new("abc");
        assert_eq!(keys.resident(&id), "brgy:resident:abc");
        assert_eq!(keys.members(), "brgy:residents");
        assert_eq!(keys.counters(), "brgy:counters");
        assert_eq!(keys.resident_id_from_key("brgy:resident:abc"), Some(id));
        assert_eq!(keys.resident_id_from_key("brgy:resident:"), None);
        assert_eq!(keys.resident_id_from_key("other:resident:abc"), None);
    }

    #[test]
    fn test_subdivision_fields() {
        assert_eq!(subdivision_field("1"), "residents:1");
        assert_eq!(subdivision_from_field("residents:Mabini"), Some("Mabini"));
        assert_eq!(subdivision_from_field(TOTAL_VOTERS_FIELD), None);
    }
}
