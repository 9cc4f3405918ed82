//! Voter registration status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Voter registration state of a resident.
///
/// Stored values are always the canonical lowercase form returned by
/// [`VoterStatus::as_str`]; parsing is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoterStatus {
    /// Registered voter.
    Registered,
    /// Not a registered voter.
    NotRegistered,
}

impl VoterStatus {
    /// Returns the canonical stored form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::NotRegistered => "not-registered",
        }
    }

    /// Parses a voter status, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "registered" => Some(Self::Registered),
            "not-registered" | "not registered" | "not_registered" | "notregistered"
            | "unregistered" => Some(Self::NotRegistered),
            _ => None,
        }
    }

    /// Returns true if the stored value denotes a registered voter.
    ///
    /// Empty or unrecognised values count as not registered.
    #[must_use]
    pub fn is_registered_value(value: &str) -> bool {
        Self::parse(value) == Some(Self::Registered)
    }
}

impl fmt::Display for VoterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
