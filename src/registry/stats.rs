//! Aggregate statistics readers.

use super::ResidentRepository;
use crate::Result;
use crate::models::{Census, IncrementalAggregates, RecomputedAggregates};
use crate::storage::{
    KeyValueStore, TOTAL_RESIDENTS_FIELD, TOTAL_VOTERS_FIELD, subdivision_from_field,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Reads aggregates either from the counters row or by full scan.
#[derive(Clone)]
pub struct StatisticsReader {
    store: Arc<dyn KeyValueStore>,
    repository: ResidentRepository,
}

impl StatisticsReader {
    /// Creates a reader sharing the repository's store and key space.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, repository: ResidentRepository) -> Self {
        Self { store, repository }
    }

    /// Reads the counters row in a single call.
    ///
    /// Cost does not depend on the number of residents. Values may lag or
    /// drift; unparsable fields are logged and read as absent.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn read_incremental(&self) -> Result<IncrementalAggregates> {
        let row = self
            .store
            .hash_get_all(&self.repository.keys().counters())?;
        Ok(parse_counters(&row))
    }

    /// Tallies every live record.
    ///
    /// Linear in the number of residents.
    ///
    /// # Errors
    ///
    /// Returns the first store error encountered.
    pub fn census(&self) -> Result<Census> {
        let mut census = Census::default();
        for resident in self.repository.iter()? {
            census.add(&resident?);
        }
        Ok(census)
    }

    /// Recomputes aggregates from every live record.
    ///
    /// # Errors
    ///
    /// Returns the first store error encountered.
    pub fn read_recomputed(&self) -> Result<RecomputedAggregates> {
        Ok(self.census()?.recomputed())
    }
}

/// Parses a counters row.
///
/// Unknown and unparsable fields are skipped, as are subdivisions whose
/// count has returned to zero.
pub(crate) fn parse_counters(row: &HashMap<String, String>) -> IncrementalAggregates {
    let mut aggregates = IncrementalAggregates::default();
    for (field, raw) in row {
        let Ok(value) = raw.trim().parse::<i64>() else {
            warn!(field, value = raw, "Ignoring unparsable counter");
            continue;
        };
        match field.as_str() {
            TOTAL_RESIDENTS_FIELD => aggregates.total_residents = value,
            TOTAL_VOTERS_FIELD => aggregates.total_voters = value,
            other => {
                if let Some(purok) = subdivision_from_field(other)
                    && value != 0
                {
                    aggregates.per_subdivision.insert(purok.to_string(), value);
                }
            },
        }
    }
    aggregates
}
