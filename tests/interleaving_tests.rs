//! Deterministic interleavings of concurrent operations.
//!
//! Each test parks one operation just before a chosen store call, runs a
//! competing operation to completion, then lets the first one finish:
//! - A reconcile pass between a create's field writes and its set add
//! - A delete between an update's membership check and its field writes
//! - A create for a new purok between a reconcile's tally and its overwrite

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use barangay::models::ResidentField;
use barangay::storage::{KeySpace, KeyValueStore};
use barangay::{CounterReconciler, Error, FieldSet, RegistryService};
use common::{FlakyStore, resident};
use std::sync::{Arc, Mutex};

fn service() -> (FlakyStore, RegistryService) {
    let store = FlakyStore::new();
    let service = RegistryService::new(Arc::new(store.clone()), KeySpace::new("il"));
    (store, service)
}

// ============================================================================
// Create vs reconcile
// ============================================================================

#[test]
fn test_default_reconcile_spares_unlinked_create() {
    let (store, service) = service();
    let sweeper = service.clone();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_hook = Arc::clone(&seen);
    store.before_nth("set_add", 1, move || {
        let report = sweeper.reconcile(false).unwrap();
        assert!(report.pruned_orphans.is_empty());
        seen_in_hook.lock().unwrap().extend(report.suspected_orphans);
    });

    let created = service.create_resident(resident("Male", "registered", "1")).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![created.id.clone()]);
    assert_eq!(service.get_resident(&created.id).unwrap(), created);
    assert_eq!(service.list_residents().unwrap().len(), 1);
    assert!(!service.check_drift().unwrap().is_drifted());
}

#[test]
fn test_create_whose_record_was_swept_reports_failure() {
    let (store, service) = service();
    let sweeper = CounterReconciler::new(service.clone()).with_orphan_grace(1);
    store.before_nth("set_add", 1, move || {
        let report = sweeper.reconcile(false).unwrap();
        assert_eq!(report.pruned_orphans.len(), 1);
    });

    let err = service.create_resident(resident("Male", "registered", "1")).unwrap_err();
    assert!(matches!(
        err,
        Error::PartialMutation {
            rolled_back: true,
            ..
        }
    ));

    assert!(service.list_residents().unwrap().is_empty());
    assert_eq!(store.set_cardinality(&service.keys().members()).unwrap(), 0);
    let counters = service.read_aggregates_incremental().unwrap();
    assert_eq!(counters.total_residents, 0);
    assert_eq!(counters.total_voters, 0);
    assert!(!service.check_drift().unwrap().is_drifted());
}

// ============================================================================
// Update vs delete
// ============================================================================

#[test]
fn test_update_racing_delete_leaves_no_record() {
    let (store, service) = service();
    let r = service
        .create_resident(resident("Female", "not-registered", "A"))
        .unwrap();
    let deleter = service.clone();
    let id = r.id.clone();
    store.before_nth("hash_set", 1, move || deleter.delete_resident(&id).unwrap());

    let err = service
        .update_resident(
            &r.id,
            FieldSet::new()
                .with(ResidentField::VotersStatus, "registered")
                .with(ResidentField::Purok, "B"),
        )
        .unwrap_err();
    assert!(err.is_not_found());

    assert!(
        store
            .hash_get_all(&service.keys().resident(&r.id))
            .unwrap()
            .is_empty()
    );
    let counters = service.read_aggregates_incremental().unwrap();
    assert_eq!(counters.total_residents, 0);
    assert_eq!(counters.total_voters, 0);
    assert!(counters.per_subdivision.is_empty());
    assert!(!service.check_drift().unwrap().is_drifted());
}

#[test]
fn test_delete_between_update_writes_leaves_no_record() {
    let (store, service) = service();
    let r = service.create_resident(resident("Male", "", "1")).unwrap();
    let deleter = service.clone();
    let id = r.id.clone();
    store.before_nth("hash_set", 2, move || deleter.delete_resident(&id).unwrap());

    let err = service
        .update_resident(
            &r.id,
            FieldSet::new()
                .with(ResidentField::Occupation, "Driver")
                .with(ResidentField::Purok, "2"),
        )
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(service.get_resident(&r.id).unwrap_err().is_not_found());
    assert!(
        store
            .hash_get_all(&service.keys().resident(&r.id))
            .unwrap()
            .is_empty()
    );
    assert!(!service.check_drift().unwrap().is_drifted());
}

// ============================================================================
// Reconcile vs create
// ============================================================================

#[test]
fn test_new_purok_counted_during_reconcile_is_kept() {
    let (store, service) = service();
    service.create_resident(resident("Male", "", "1")).unwrap();
    let creator = service.clone();
    store.before_nth("scan_keys", 1, move || {
        creator.create_resident(resident("Female", "", "9")).unwrap();
    });

    let report = service.reconcile(false).unwrap();
    assert!(report.stale_subdivisions.is_empty());
    assert_eq!(service.read_aggregates_incremental().unwrap().subdivision("9"), 1);

    service.reconcile(false).unwrap();
    assert!(!service.check_drift().unwrap().is_drifted());
}
