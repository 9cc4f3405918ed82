//! Resident identifiers and records.

use super::{ResidentField, VoterStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Unique identifier for a resident.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResidentId(String);

impl ResidentId {
    /// Creates a resident ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random (UUID v4) identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ResidentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ResidentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A resident record as read from the store.
///
/// Every schema field is present; fields never written read as `""`. Extra
/// hash fields written by other tools are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resident {
    /// Resident identifier.
    pub id: ResidentId,
    /// Field name to value.
    pub fields: BTreeMap<String, String>,
}

impl Resident {
    /// Builds a record from a stored hash.
    #[must_use]
    pub fn from_hash(id: ResidentId, hash: HashMap<String, String>) -> Self {
        let mut fields: BTreeMap<String, String> = hash.into_iter().collect();
        for field in ResidentField::all() {
            fields.entry(field.as_str().to_string()).or_default();
        }
        Self { id, fields }
    }

    /// Returns the value of a schema field (`""` when unset).
    #[must_use]
    pub fn field(&self, field: ResidentField) -> &str {
        self.fields.get(field.as_str()).map_or("", String::as_str)
    }

    /// Returns the purok, or `None` when empty.
    #[must_use]
    pub fn purok(&self) -> Option<&str> {
        Some(self.field(ResidentField::Purok)).filter(|p| !p.is_empty())
    }

    /// Returns true if the stored voter status denotes a registered voter.
    #[must_use]
    pub fn is_registered_voter(&self) -> bool {
        VoterStatus::is_registered_value(self.field(ResidentField::VotersStatus))
    }
}
