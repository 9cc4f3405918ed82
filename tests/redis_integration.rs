//! Redis integration tests.
//!
//! These tests require a running Redis server. Set the environment variable
//! `BARANGAY_TEST_REDIS_URL` to enable them:
//!
//! ```bash
//! export BARANGAY_TEST_REDIS_URL="redis://localhost:6379"
//! cargo test --features redis redis_integration
//! ```
//!
//! Each test uses its own random namespace and cleans up after itself.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::print_stderr)]
#![cfg(feature = "redis")]

mod common;

use barangay::models::{ResidentField, ResidentId};
use barangay::storage::{KeySpace, KeyValueStore, RedisStore};
use barangay::{CounterReconciler, FieldSet, RegistryService};
use common::resident;
use std::env;
use std::sync::Arc;

/// Environment variable for Redis test connection URL.
const REDIS_URL_ENV: &str = "BARANGAY_TEST_REDIS_URL";

/// Macro to skip tests when Redis is not available.
macro_rules! require_redis {
    () => {
        match env::var(REDIS_URL_ENV) {
            Ok(url) => url,
            Err(_) => {
                eprintln!("Skipping test: {REDIS_URL_ENV} not set.");
                return;
            },
        }
    };
}

/// Service over a fresh namespace, plus a guard that deletes its keys.
fn service(url: &str) -> (Arc<RedisStore>, RegistryService, Cleanup) {
    let store = Arc::new(RedisStore::new(url).unwrap());
    let keys = KeySpace::new(format!("barangay-test-{}", ResidentId::generate()));
    let service = RegistryService::new(store.clone(), keys.clone());
    let cleanup = Cleanup {
        store: store.clone(),
        keys,
    };
    (store, service, cleanup)
}

struct Cleanup {
    store: Arc<RedisStore>,
    keys: KeySpace,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        if let Ok(keys) = self.store.scan_keys(&format!("{}:", self.keys.namespace())) {
            for key in keys {
                let _ = self.store.hash_delete(&key);
            }
        }
    }
}

#[test]
fn test_redis_lifecycle() {
    let url = require_redis!();
    let (_store, service, _cleanup) = service(&url);

    let r = service.create_resident(resident("Male", "Registered", "1")).unwrap();
    assert_eq!(service.get_resident(&r.id).unwrap().field(ResidentField::VotersStatus), "registered");

    service
        .update_resident(&r.id, FieldSet::new().with(ResidentField::Purok, "2"))
        .unwrap();
    let counters = service.read_aggregates_incremental().unwrap();
    assert_eq!(counters.total_residents, 1);
    assert_eq!(counters.subdivision("2"), 1);
    assert_eq!(counters.subdivision("1"), 0);

    service.delete_resident(&r.id).unwrap();
    assert!(service.get_resident(&r.id).unwrap_err().is_not_found());
    assert_eq!(service.read_aggregates_incremental().unwrap().total_residents, 0);
}

#[test]
fn test_redis_reconcile_prunes_orphans_after_grace() {
    let url = require_redis!();
    let (store, service, _cleanup) = service(&url);

    service.create_resident(resident("Female", "", "3")).unwrap();
    let orphan = service.keys().resident(&ResidentId::new("orphan"));
    store.hash_set(&orphan, "firstName", "Lost").unwrap();
    store
        .hash_increment_by(&service.keys().counters(), "totalResidents", 4)
        .unwrap();

    let report = service.reconcile(false).unwrap();
    assert!(report.drifted());
    assert_eq!(report.suspected_orphans, vec![ResidentId::new("orphan")]);
    assert!(!store.hash_get_all(&orphan).unwrap().is_empty());

    let report = CounterReconciler::new(service.clone())
        .with_orphan_grace(1)
        .reconcile(false)
        .unwrap();
    assert_eq!(report.pruned_orphans, vec![ResidentId::new("orphan")]);
    assert!(store.hash_get_all(&orphan).unwrap().is_empty());
    assert_eq!(service.read_aggregates_incremental().unwrap().total_residents, 1);
}
