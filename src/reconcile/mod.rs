//! Counter reconciliation.
//!
//! The counters row is a cache over the resident records. It can drift when
//! a mutation fails between its record write and its counter increments, or
//! when a process dies mid-way. Reconciliation tallies every live record and
//! overwrites the row with the result. It also repairs the two-part record
//! invariant:
//!
//! - **dangling members**: set entries whose hash is gone are removed
//! - **orphan hashes**: hashes whose id is not in the set are deleted
//!
//! An orphan is only deleted once it has been seen on
//! [`CounterReconciler::with_orphan_grace`] consecutive passes (two by
//! default), since a create in flight looks exactly like an orphan until its
//! set add lands. Orphans still inside the grace are reported as suspected.

mod report;

pub use report::{CounterDifference, DriftReport, ReconcileReport, diff_counters};

use crate::Result;
use crate::models::{Census, Resident, ResidentId};
use crate::registry::{RegistryService, parse_counters};
use crate::storage::{
    TOTAL_RESIDENTS_FIELD, TOTAL_VOTERS_FIELD, subdivision_field, subdivision_from_field,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Periodic reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Run the periodic job.
    pub enabled: bool,
    /// Seconds between runs.
    pub interval_secs: u64,
    /// Delete orphan hashes and dangling set entries.
    pub prune_orphans: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
            prune_orphans: true,
        }
    }
}

impl ReconcileConfig {
    /// Applies environment variable overrides.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `BARANGAY_RECONCILE_ENABLED` | `enabled` |
    /// | `BARANGAY_RECONCILE_INTERVAL_SECS` | `interval_secs` |
    /// | `BARANGAY_RECONCILE_PRUNE_ORPHANS` | `prune_orphans` |
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("BARANGAY_RECONCILE_ENABLED")
            && let Some(parsed) = parse_bool(&v)
        {
            self.enabled = parsed;
        }
        if let Ok(v) = std::env::var("BARANGAY_RECONCILE_INTERVAL_SECS")
            && let Ok(parsed) = v.trim().parse::<u64>()
        {
            self.interval_secs = parsed.max(1);
        }
        if let Ok(v) = std::env::var("BARANGAY_RECONCILE_PRUNE_ORPHANS")
            && let Some(parsed) = parse_bool(&v)
        {
            self.prune_orphans = parsed;
        }
        self
    }

    /// Interval between periodic runs.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Rebuilds the counters row from live records.
pub struct CounterReconciler {
    service: RegistryService,
    prune_orphans: bool,
    orphan_grace: u32,
    orphan_sightings: Mutex<HashMap<String, u32>>,
}

impl CounterReconciler {
    /// Creates a reconciler that deletes an orphan on its second sighting.
    #[must_use]
    pub fn new(service: RegistryService) -> Self {
        Self {
            service,
            prune_orphans: true,
            orphan_grace: 2,
            orphan_sightings: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a reconciler from configuration.
    #[must_use]
    pub fn from_config(service: RegistryService, config: &ReconcileConfig) -> Self {
        Self::new(service).with_prune_orphans(config.prune_orphans)
    }

    /// Enables or disables pruning.
    #[must_use]
    pub const fn with_prune_orphans(mut self, prune: bool) -> Self {
        self.prune_orphans = prune;
        self
    }

    /// Sets how many consecutive passes must see an orphan before it is
    /// deleted (minimum 1). A grace of 1 is only safe while no create is in
    /// flight.
    #[must_use]
    pub fn with_orphan_grace(mut self, passes: u32) -> Self {
        self.orphan_grace = passes.max(1);
        self
    }

    /// Compares the counters row against a full tally without writing.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    #[instrument(skip(self))]
    #[allow(clippy::cast_precision_loss)]
    pub fn check_drift(&self) -> Result<DriftReport> {
        let cached = self.service.read_aggregates_incremental()?;
        let actual = self.service.census()?.as_counters();
        let differences = diff_counters(&cached, &actual);
        metrics::gauge!("registry_counter_drift_fields").set(differences.len() as f64);
        Ok(DriftReport {
            checked_at: Utc::now(),
            cached,
            actual,
            differences,
        })
    }

    /// Runs one reconciliation pass.
    ///
    /// With `dry_run` the report describes what would change and nothing is
    /// written.
    ///
    /// # Errors
    ///
    /// Returns the first store error. Counters may be partly rewritten when
    /// the error comes from the overwrite step; the next pass repairs them.
    #[instrument(skip(self), fields(namespace = %self.service.keys().namespace()))]
    #[allow(clippy::cast_precision_loss)]
    pub fn reconcile(&self, dry_run: bool) -> Result<ReconcileReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let result = self.run(dry_run);

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("registry_reconcile_runs_total", "status" => status).increment(1);
        metrics::histogram!("registry_reconcile_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        let mut report = result?;
        report.started_at = started_at;
        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        metrics::gauge!("registry_counter_drift_fields").set(if dry_run {
            report.differences.len() as f64
        } else {
            0.0
        });

        if report.repaired_anything() {
            info!(
                dry_run,
                corrected = report.differences.len(),
                stale_subdivisions = report.stale_subdivisions.len(),
                pruned_members = report.pruned_members.len(),
                pruned_orphans = report.pruned_orphans.len(),
                suspected_orphans = report.suspected_orphans.len(),
                duration_ms = report.duration_ms,
                "Reconciled counters"
            );
        } else {
            debug!(duration_ms = report.duration_ms, "Counters already consistent");
        }
        Ok(report)
    }

    fn run(&self, dry_run: bool) -> Result<ReconcileReport> {
        let store = self.service.store();
        let keys = self.service.keys();
        let repository = self.service.repository();

        // Read the row first so a subdivision first counted after this point
        // is never mistaken for a stale one.
        let row = store.hash_get_all(&keys.counters())?;
        let members = repository.ids()?;
        let mut census = Census::default();
        let mut pruned_members = Vec::new();
        for id in &members {
            let hash = store.hash_get_all(&keys.resident(id))?;
            if hash.is_empty() {
                if self.prune_orphans {
                    if !dry_run {
                        repository.prune_member(id);
                    }
                    pruned_members.push(id.clone());
                }
            } else {
                census.add(&Resident::from_hash(id.clone(), hash));
            }
        }

        let (pruned_orphans, suspected_orphans) = if self.prune_orphans {
            self.sweep_orphans(&members, dry_run)?
        } else {
            (Vec::new(), Vec::new())
        };

        let before = parse_counters(&row);
        let after = census.as_counters();
        let differences = diff_counters(&before, &after);
        let mut stale_subdivisions: Vec<String> = row
            .keys()
            .filter_map(|field| subdivision_from_field(field))
            .filter(|purok| !after.per_subdivision.contains_key(*purok))
            .map(str::to_string)
            .collect();
        stale_subdivisions.sort();

        if !dry_run {
            let counters = keys.counters();
            store.hash_set(
                &counters,
                TOTAL_RESIDENTS_FIELD,
                &after.total_residents.to_string(),
            )?;
            store.hash_set(&counters, TOTAL_VOTERS_FIELD, &after.total_voters.to_string())?;
            for (purok, count) in &after.per_subdivision {
                store.hash_set(&counters, &subdivision_field(purok), &count.to_string())?;
            }
            for purok in &stale_subdivisions {
                store.hash_delete_field(&counters, &subdivision_field(purok))?;
            }
        }

        Ok(ReconcileReport {
            started_at: Utc::now(),
            duration_ms: 0,
            dry_run,
            before,
            after,
            differences,
            stale_subdivisions,
            pruned_members,
            pruned_orphans,
            suspected_orphans,
        })
    }

    /// Finds record hashes outside the membership set and deletes those
    /// seen on enough consecutive passes.
    ///
    /// Returns the pruned ids and the ids still inside the grace.
    fn sweep_orphans(
        &self,
        members: &[ResidentId],
        dry_run: bool,
    ) -> Result<(Vec<ResidentId>, Vec<ResidentId>)> {
        let store = self.service.store();
        let keys = self.service.keys();
        let members: HashSet<&str> = members.iter().map(ResidentId::as_str).collect();

        let mut sightings = self
            .orphan_sightings
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut seen_now = HashMap::new();
        let mut pruned = Vec::new();
        let mut suspected = Vec::new();

        for key in store.scan_keys(&keys.resident_prefix())? {
            let Some(id) = keys.resident_id_from_key(&key) else {
                continue;
            };
            // Re-check: the id may have joined the set after the snapshot.
            if members.contains(id.as_str()) || store.set_contains(&keys.members(), id.as_str())? {
                continue;
            }
            let count = sightings.get(&key).copied().unwrap_or(0) + 1;
            if count < self.orphan_grace {
                seen_now.insert(key, count);
                suspected.push(id);
                continue;
            }
            if !dry_run {
                store.hash_delete(&key)?;
                warn!(resident_id = %id, "Deleted orphan resident record");
            }
            pruned.push(id);
        }

        if !dry_run {
            *sightings = seen_now;
        }
        Ok((pruned, suspected))
    }
}

/// Spawns a task that reconciles on a fixed interval.
///
/// Each pass runs on a blocking thread. Failures are logged and the next
/// tick tries again. Abort the returned handle to stop.
#[must_use]
pub fn spawn_periodic(service: RegistryService, config: &ReconcileConfig) -> JoinHandle<()> {
    let reconciler = Arc::new(CounterReconciler::from_config(service, config));
    let period = config.interval();
    info!(interval_secs = period.as_secs(), "Starting periodic reconciliation");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let reconciler = Arc::clone(&reconciler);
            match tokio::task::spawn_blocking(move || reconciler.reconcile(false)).await {
                Ok(Ok(_)) => {},
                Ok(Err(e)) => warn!(error = %e, "Reconciliation pass failed"),
                Err(e) => warn!(error = %e, "Reconciliation task panicked"),
            }
        }
    })
}

impl RegistryService {
    /// Rebuilds the counters row from live records.
    ///
    /// Dangling set entries are pruned. Orphan records are only reported as
    /// suspected, since a single pass cannot tell them from a create in
    /// flight; the periodic task or a reconciler kept across passes deletes
    /// them.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn reconcile(&self, dry_run: bool) -> Result<ReconcileReport> {
        CounterReconciler::new(self.clone()).reconcile(dry_run)
    }

    /// Compares the counters row against a full tally.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn check_drift(&self) -> Result<DriftReport> {
        CounterReconciler::new(self.clone()).check_drift()
    }
}
