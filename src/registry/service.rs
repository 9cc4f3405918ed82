//! Registry service: record mutations paired with counter maintenance.

use super::{CounterDelta, CounterMaintainer, ResidentRepository, StatisticsReader};
use crate::config::StorageConfig;
use crate::models::{
    Census, FieldSet, IncrementalAggregates, RecomputedAggregates, Resident, ResidentId,
};
use crate::storage::{KeySpace, KeyValueStore, open_store};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Entry point for every registry operation.
///
/// Each mutation first changes the record (rolling back on failure), then
/// applies the matching counter delta. The record is authoritative: if the
/// counter step fails the record change stands and the error reports the
/// drift so reconciliation can repair it.
#[derive(Clone)]
pub struct RegistryService {
    store: Arc<dyn KeyValueStore>,
    repository: ResidentRepository,
    counters: CounterMaintainer,
    stats: StatisticsReader,
}

impl RegistryService {
    /// Creates a service over a store and key space.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, keys: KeySpace) -> Self {
        let repository = ResidentRepository::new(Arc::clone(&store), keys.clone());
        let counters = CounterMaintainer::new(Arc::clone(&store), keys);
        let stats = StatisticsReader::new(Arc::clone(&store), repository.clone());
        Self {
            store,
            repository,
            counters,
            stats,
        }
    }

    /// Opens the configured backend and builds a service over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(open_store(config)?, config.key_space()))
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Returns the key space.
    #[must_use]
    pub const fn keys(&self) -> &KeySpace {
        self.repository.keys()
    }

    /// Returns the record repository.
    #[must_use]
    pub const fn repository(&self) -> &ResidentRepository {
        &self.repository
    }

    /// Creates a resident and counts it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for a bad field value
    /// - [`Error::StoreUnavailable`] if nothing was written
    /// - [`Error::PartialMutation`] if the record or its counters were only
    ///   partly written
    #[instrument(skip(self, fields), fields(operation = "create_resident", field_count = fields.len()))]
    pub fn create_resident(&self, fields: FieldSet) -> Result<Resident> {
        let start = Instant::now();
        let result = self.repository.create(fields).and_then(|resident| {
            let delta = CounterDelta::for_create(&resident);
            self.apply_counters("create_resident", &resident.id, &delta)?;
            Ok(resident)
        });
        if let Ok(resident) = &result {
            tracing::info!(resident_id = %resident.id, "Created resident");
        }
        record("create_resident", &result, start);
        result
    }

    /// Reads one resident.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] or a store error.
    #[instrument(skip(self), fields(resident_id = %id))]
    pub fn get_resident(&self, id: &ResidentId) -> Result<Resident> {
        self.repository.get(id)
    }

    /// Lists every live resident.
    ///
    /// # Errors
    ///
    /// Returns the first store error encountered.
    #[instrument(skip(self))]
    pub fn list_residents(&self) -> Result<Vec<Resident>> {
        self.repository.list()
    }

    /// Merges fields into a resident and adjusts counters for any voter or
    /// purok transition.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the resident does not exist
    /// - [`Error::InvalidInput`] for a bad field value
    /// - [`Error::StoreUnavailable`] if nothing was written
    /// - [`Error::PartialMutation`] if the record or its counters were only
    ///   partly written
    #[instrument(skip(self, fields), fields(resident_id = %id, field_count = fields.len()))]
    pub fn update_resident(&self, id: &ResidentId, fields: FieldSet) -> Result<Resident> {
        let start = Instant::now();
        let result = self.repository.update(id, fields).and_then(|outcome| {
            let delta = CounterDelta::for_update(&outcome.before, &outcome.after);
            self.apply_counters("update_resident", id, &delta)?;
            Ok(outcome.after)
        });
        if result.is_ok() {
            tracing::info!(resident_id = %id, "Updated resident");
        }
        record("update_resident", &result, start);
        result
    }

    /// Deletes a resident and uncounts it.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the resident does not exist
    /// - [`Error::StoreUnavailable`] if nothing was changed
    /// - [`Error::PartialMutation`] if the record or its counters were only
    ///   partly changed
    #[instrument(skip(self), fields(resident_id = %id))]
    pub fn delete_resident(&self, id: &ResidentId) -> Result<()> {
        let start = Instant::now();
        let result = self.repository.delete(id).and_then(|snapshot| {
            self.apply_counters("delete_resident", id, &CounterDelta::for_delete(&snapshot))
        });
        if result.is_ok() {
            tracing::info!(resident_id = %id, "Deleted resident");
        }
        record("delete_resident", &result, start);
        result
    }

    /// Reads the cached counters in one store call.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    #[instrument(skip(self))]
    pub fn read_aggregates_incremental(&self) -> Result<IncrementalAggregates> {
        self.stats.read_incremental()
    }

    /// Recomputes aggregates from every live record.
    ///
    /// # Errors
    ///
    /// Returns the first store error encountered.
    #[instrument(skip(self))]
    pub fn read_aggregates_recomputed(&self) -> Result<RecomputedAggregates> {
        let start = Instant::now();
        let result = self.stats.read_recomputed();
        metrics::histogram!("registry_recompute_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        result
    }

    /// Tallies every live record.
    ///
    /// # Errors
    ///
    /// Returns the first store error encountered.
    pub fn census(&self) -> Result<Census> {
        self.stats.census()
    }

    fn apply_counters(&self, operation: &str, id: &ResidentId, delta: &CounterDelta) -> Result<()> {
        self.counters.apply(delta).map_err(|(applied, e)| {
            tracing::warn!(
                operation,
                resident_id = %id,
                applied,
                pending = delta.iter().count() - applied,
                error = %e,
                "Record changed but counters were not fully updated; reconciliation will repair them"
            );
            metrics::counter!("registry_counter_drift_total", "operation" => operation.to_string())
                .increment(1);
            Error::PartialMutation {
                operation: operation.to_string(),
                cause: e.to_string(),
                rolled_back: false,
            }
        })?;
        Ok(())
    }
}

fn record<T>(operation: &'static str, result: &Result<T>, start: Instant) {
    let status = match result {
        Ok(_) => "success",
        Err(e) if e.is_not_found() => "not_found",
        Err(Error::PartialMutation { .. }) => "partial",
        Err(_) => "error",
    };
    metrics::counter!(
        "registry_mutations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!("registry_mutation_duration_ms", "operation" => operation)
        .record(start.elapsed().as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResidentField;
    use crate::storage::InMemoryStore;

    fn service() -> RegistryService {
        RegistryService::new(Arc::new(InMemoryStore::new()), KeySpace::new("svc"))
    }

    fn person(status: &str, purok: &str) -> FieldSet {
        FieldSet::new()
            .with(ResidentField::FirstName, "Ana")
            .with(ResidentField::Gender, "Female")
            .with(ResidentField::VotersStatus, status)
            .with(ResidentField::Purok, purok)
    }

    fn assert_consistent(service: &RegistryService) {
        let census = service.census().unwrap();
        assert_eq!(service.read_aggregates_incremental().unwrap(), census.as_counters());
    }

    #[test]
    fn test_create_updates_counters() {
        let service = service();
        service.create_resident(person("registered", "1")).unwrap();
        service.create_resident(person("not-registered", "1")).unwrap();
        service.create_resident(person("", "2")).unwrap();

        let counters = service.read_aggregates_incremental().unwrap();
        assert_eq!(counters.total_residents, 3);
        assert_eq!(counters.total_voters, 1);
        assert_eq!(counters.subdivision("1"), 2);
        assert_eq!(counters.subdivision("2"), 1);
        assert_consistent(&service);
    }

    #[test]
    fn test_mixed_case_status_is_counted_consistently() {
        let service = service();
        let created = service.create_resident(person("ReGiStErEd", "1")).unwrap();
        assert_eq!(created.field(ResidentField::VotersStatus), "registered");

        service.delete_resident(&created.id).unwrap();
        let counters = service.read_aggregates_incremental().unwrap();
        assert_eq!(counters.total_voters, 0);
        assert_eq!(counters.total_residents, 0);
    }

    #[test]
    fn test_update_transitions_keep_counters_consistent() {
        let service = service();
        let r = service.create_resident(person("not-registered", "1")).unwrap();

        service
            .update_resident(&r.id, FieldSet::new().with(ResidentField::VotersStatus, "Registered"))
            .unwrap();
        assert_eq!(service.read_aggregates_incremental().unwrap().total_voters, 1);

        service
            .update_resident(&r.id, FieldSet::new().with(ResidentField::VotersStatus, "registered"))
            .unwrap();
        assert_eq!(service.read_aggregates_incremental().unwrap().total_voters, 1);

        service
            .update_resident(&r.id, FieldSet::new().with(ResidentField::Purok, "3"))
            .unwrap();
        let counters = service.read_aggregates_incremental().unwrap();
        assert_eq!(counters.subdivision("1"), 0);
        assert_eq!(counters.subdivision("3"), 1);
        assert_consistent(&service);
    }

    #[test]
    fn test_update_rejects_unknown_status_without_writing() {
        let service = service();
        let r = service.create_resident(person("registered", "1")).unwrap();

        let err = service
            .update_resident(&r.id, FieldSet::new().with(ResidentField::VotersStatus, "maybe"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(
            service.get_resident(&r.id).unwrap().field(ResidentField::VotersStatus),
            "registered"
        );
    }

    #[test]
    fn test_delete_twice_counts_once() {
        let service = service();
        let r = service.create_resident(person("registered", "1")).unwrap();

        service.delete_resident(&r.id).unwrap();
        assert!(service.delete_resident(&r.id).unwrap_err().is_not_found());

        let counters = service.read_aggregates_incremental().unwrap();
        assert_eq!(counters.total_residents, 0);
        assert_eq!(counters.total_voters, 0);
        assert_eq!(counters.subdivision("1"), 0);
    }

    #[test]
    fn test_incremental_matches_recomputed_totals() {
        let service = service();
        for i in 0..10 {
            let status = if i % 3 == 0 { "registered" } else { "not-registered" };
            service.create_resident(person(status, &(i % 4).to_string())).unwrap();
        }
        let incremental = service.read_aggregates_incremental().unwrap();
        let recomputed = service.read_aggregates_recomputed().unwrap();

        assert_eq!(incremental.total_residents, 10);
        assert_eq!(recomputed.population.total, 10);
        assert_eq!(incremental.total_voters, 4);
        assert_eq!(recomputed.voters.voters, 4);
        assert_eq!(recomputed.distinct_subdivision_count, 4);
    }
}
