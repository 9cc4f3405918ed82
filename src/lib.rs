//! # Barangay
//!
//! Resident registry record store with derived aggregate statistics.
//!
//! Residents are stored as per-field hashes in a schemaless key-value/hash
//! store, alongside a membership set of live identifiers and a single shared
//! counters row (population, voters, per-purok counts).
//!
//! ## Layers
//!
//! - **Storage**: the [`storage::KeyValueStore`] contract (in-memory and Redis)
//! - **Registry**: repository, counter maintainer and statistics reader
//! - **Reconcile**: rebuilds the counters row from a full scan when it drifts
//!
//! ## Example
//!
//! ```rust
//! use barangay::models::{FieldSet, ResidentField};
//! use barangay::registry::RegistryService;
//! use barangay::storage::{InMemoryStore, KeySpace};
//! use std::sync::Arc;
//!
//! let service = RegistryService::new(Arc::new(InMemoryStore::new()), KeySpace::default());
//! let created = service.create_resident(
//!     FieldSet::new()
//!         .with(ResidentField::FirstName, "Juan")
//!         .with(ResidentField::VotersStatus, "Registered")
//!         .with(ResidentField::Purok, "1"),
//! )?;
//!
//! let stats = service.read_aggregates_incremental()?;
//! assert_eq!(stats.total_residents, 1);
//! assert_eq!(stats.total_voters, 1);
//! assert_eq!(created.field(ResidentField::VotersStatus), "registered");
//! # Ok::<(), barangay::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod models;
pub mod observability;
pub mod reconcile;
pub mod registry;
pub mod storage;

pub use config::RegistryConfig;
pub use models::{
    FieldSet, IncrementalAggregates, RecomputedAggregates, Resident, ResidentField, ResidentId,
    VoterStatus,
};
pub use reconcile::{CounterReconciler, DriftReport, ReconcileConfig, ReconcileReport};
pub use registry::RegistryService;
pub use storage::{InMemoryStore, KeySpace, KeyValueStore};

/// Error type for registry operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `NotFound` | Target id is not in the membership set, or its hash is empty |
/// | `InvalidInput` | Unknown field names, unrecognised voter status |
/// | `StoreUnavailable` | The first store call of an operation fails, or the circuit is open |
/// | `PartialMutation` | A store call fails after an earlier call of the same operation succeeded |
/// | `OperationFailed` | Configuration, IO and logging setup failures |
/// | `FeatureNotEnabled` | Selecting a backend that was not compiled in |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The targeted resident does not exist.
    #[error("resident not found: {0}")]
    NotFound(String),

    /// Caller-supplied fields were malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The backing store could not be reached.
    ///
    /// No partial effects are assumed safe after this error.
    #[error("store unavailable during '{operation}': {cause}")]
    StoreUnavailable {
        /// The store operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A multi-call logical operation failed part way through.
    ///
    /// `rolled_back` reports whether the compensating calls succeeded. When it
    /// is `false` the store may hold an orphan hash or a drifted counter that
    /// reconciliation will repair.
    #[error("partial mutation in '{operation}' (rolled back: {rolled_back}): {cause}")]
    PartialMutation {
        /// The logical operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
        /// Whether best-effort rollback completed.
        rolled_back: bool,
    },

    /// A non-store operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

impl Error {
    /// Returns `true` for [`Error::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// HTTP-equivalent status for the collaborator layer.
    ///
    /// Partial failures are reported as plain failures: callers never see a
    /// partial-success response.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidInput(_) => 400,
            Self::StoreUnavailable { .. }
            | Self::PartialMutation { .. }
            | Self::OperationFailed { .. }
            | Self::FeatureNotEnabled(_) => 500,
        }
    }

    pub(crate) fn store(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;
