//! Resident registry.
//!
//! - [`ResidentRepository`]: record CRUD and the membership set
//! - [`CounterDelta`] / [`CounterMaintainer`]: incremental counters
//! - [`StatisticsReader`]: cached and recomputed aggregates
//! - [`RegistryService`]: the operations callers use, pairing the above

mod counters;
mod repository;
mod service;
mod stats;

pub use counters::{CounterDelta, CounterMaintainer};
pub use repository::{ResidentIter, ResidentRepository, UpdateOutcome};
pub use service::RegistryService;
pub use stats::StatisticsReader;

pub(crate) use stats::parse_counters;
