//! Data models for the registry.
//!
//! Resident records are schemaless string maps in the store; these types give
//! them a closed field vocabulary and normalize caller input at the
//! repository boundary.

mod aggregates;
mod fields;
mod resident;
mod voter;

pub use aggregates::{
    Census, IncrementalAggregates, Population, RecomputedAggregates, VoterBreakdown,
};
pub use fields::{FieldSet, ResidentField};
pub use resident::{Resident, ResidentId};
pub use voter::VoterStatus;
