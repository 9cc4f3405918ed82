//! Store resilience wrapper with circuit breaking.
//!
//! Stops hammering an unreachable store: after enough consecutive
//! `StoreUnavailable` failures every call fails fast until the reset timeout
//! elapses, then a limited number of trial calls decide whether to close.
//!
//! # Circuit Breaker States
//!
//! ```text
//! +--------+     failures >= threshold     +------+
//! | Closed | --------------------------->  | Open |
//! +--------+                               +------+
//!     ^                                        |
//!     |  success                               | timeout elapsed
//!     |                                        v
//!     +--------------------------------  +-----------+
//!                                        | Half-Open |
//!                                        +-----------+
//! ```
//!
//! No retries happen here: a failed call is surfaced to the caller as-is.

use super::traits::KeyValueStore;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Resilience configuration for store backends.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreResilienceConfig {
    /// Consecutive failures before opening the circuit.
    pub breaker_failure_threshold: u32,
    /// How long to keep the circuit open before half-open.
    pub breaker_reset_timeout_ms: u64,
    /// Trial calls admitted while half-open, including the first.
    pub breaker_half_open_max_calls: u32,
}

impl Default for StoreResilienceConfig {
    fn default() -> Self {
        Self {
            breaker_failure_threshold: 5,
            breaker_reset_timeout_ms: 30_000,
            breaker_half_open_max_calls: 1,
        }
    }
}

impl StoreResilienceConfig {
    /// Applies environment variable overrides.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `BARANGAY_STORE_BREAKER_FAILURE_THRESHOLD` | `breaker_failure_threshold` |
    /// | `BARANGAY_STORE_BREAKER_RESET_MS` | `breaker_reset_timeout_ms` |
    /// | `BARANGAY_STORE_BREAKER_HALF_OPEN_MAX_CALLS` | `breaker_half_open_max_calls` |
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("BARANGAY_STORE_BREAKER_FAILURE_THRESHOLD")
            && let Ok(parsed) = v.parse::<u32>()
        {
            self.breaker_failure_threshold = parsed.max(1);
        }
        if let Ok(v) = std::env::var("BARANGAY_STORE_BREAKER_RESET_MS")
            && let Ok(parsed) = v.parse::<u64>()
        {
            self.breaker_reset_timeout_ms = parsed;
        }
        if let Ok(v) = std::env::var("BARANGAY_STORE_BREAKER_HALF_OPEN_MAX_CALLS")
            && let Ok(parsed) = v.parse::<u32>()
        {
            self.breaker_half_open_max_calls = parsed.max(1);
        }
        self
    }

    /// Sets the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.breaker_failure_threshold = threshold;
        self
    }

    /// Sets the reset timeout in milliseconds.
    #[must_use]
    pub const fn with_reset_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.breaker_reset_timeout_ms = timeout_ms;
        self
    }

    /// Sets how many trial calls a half-open circuit admits, counting the
    /// call that half-opened it.
    #[must_use]
    pub const fn with_half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.breaker_half_open_max_calls = max_calls;
        self
    }
}

/// Externally visible breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls fail fast.
    Open,
    /// A limited number of trial calls pass through.
    HalfOpen,
}

impl CircuitState {
    /// Gauge value: 0 closed, 1 open, 2 half-open.
    #[must_use]
    pub const fn as_gauge(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

#[derive(Debug)]
enum Circuit {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    /// `admitted` includes the call that moved the circuit out of open.
    HalfOpen { admitted: u32 },
}

/// Breaker shared by every operation on one backend.
#[derive(Debug)]
struct Breaker {
    circuit: Circuit,
    trip_after: u32,
    cool_down: Duration,
    trial_limit: u32,
    backend: &'static str,
}

impl Breaker {
    fn new(config: &StoreResilienceConfig, backend: &'static str) -> Self {
        Self {
            circuit: Circuit::Closed {
                consecutive_failures: 0,
            },
            trip_after: config.breaker_failure_threshold.max(1),
            cool_down: Duration::from_millis(config.breaker_reset_timeout_ms),
            trial_limit: config.breaker_half_open_max_calls.max(1),
            backend,
        }
    }

    /// Returns false if the call must fail fast.
    fn admit(&mut self) -> bool {
        match self.circuit {
            Circuit::Closed { .. } => true,
            Circuit::Open { since } => {
                if since.elapsed() < self.cool_down {
                    return false;
                }
                tracing::info!(backend = self.backend, "Store circuit half-open, trying a call");
                self.circuit = Circuit::HalfOpen { admitted: 1 };
                true
            },
            Circuit::HalfOpen { ref mut admitted } => {
                if *admitted >= self.trial_limit {
                    return false;
                }
                *admitted += 1;
                true
            },
        }
    }

    fn succeeded(&mut self) {
        if !matches!(
            self.circuit,
            Circuit::Closed {
                consecutive_failures: 0
            }
        ) {
            tracing::info!(backend = self.backend, "Store circuit closed");
        }
        self.circuit = Circuit::Closed {
            consecutive_failures: 0,
        };
    }

    /// Returns true if this failure opened the circuit.
    fn failed(&mut self) -> bool {
        let trip = match &mut self.circuit {
            Circuit::Closed {
                consecutive_failures,
            } => {
                *consecutive_failures += 1;
                *consecutive_failures >= self.trip_after
            },
            Circuit::HalfOpen { .. } => true,
            Circuit::Open { .. } => false,
        };
        if trip {
            tracing::warn!(
                backend = self.backend,
                threshold = self.trip_after,
                "Store circuit opened"
            );
            self.circuit = Circuit::Open {
                since: Instant::now(),
            };
        }
        trip
    }

    const fn state(&self) -> CircuitState {
        match self.circuit {
            Circuit::Closed { .. } => CircuitState::Closed,
            Circuit::Open { .. } => CircuitState::Open,
            Circuit::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

/// Store wrapper with circuit breaker protection.
pub struct ResilientStore<S: KeyValueStore> {
    inner: S,
    breaker: Mutex<Breaker>,
    backend_name: &'static str,
}

impl<S: KeyValueStore> ResilientStore<S> {
    /// Wraps a store.
    #[must_use]
    pub fn new(inner: S, config: &StoreResilienceConfig, backend_name: &'static str) -> Self {
        Self {
            inner,
            breaker: Mutex::new(Breaker::new(config, backend_name)),
            backend_name,
        }
    }

    /// Returns the breaker position.
    #[must_use]
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
    }

    fn execute<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);

        if !breaker.admit() {
            let state = breaker.state();
            drop(breaker);
            Self::record_metrics(self.backend_name, operation, "circuit_open", state);
            return Err(Error::StoreUnavailable {
                operation: operation.to_string(),
                cause: format!("circuit breaker open for backend '{}'", self.backend_name),
            });
        }
        drop(breaker);

        let result = call();

        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);

        match &result {
            Err(Error::StoreUnavailable { .. }) => {
                let tripped = breaker.failed();
                let state = breaker.state();
                drop(breaker);
                Self::record_metrics(self.backend_name, operation, "error", state);
                if tripped {
                    metrics::counter!(
                        "store_circuit_breaker_trips_total",
                        "backend" => self.backend_name,
                        "operation" => operation
                    )
                    .increment(1);
                }
            },
            _ => {
                breaker.succeeded();
                let state = breaker.state();
                drop(breaker);
                Self::record_metrics(self.backend_name, operation, "success", state);
            },
        }

        result
    }

    fn record_metrics(
        backend: &'static str,
        operation: &'static str,
        status: &'static str,
        state: CircuitState,
    ) {
        metrics::counter!(
            "store_requests_total",
            "backend" => backend,
            "operation" => operation,
            "status" => status
        )
        .increment(1);
        metrics::gauge!(
            "store_circuit_breaker_state",
            "backend" => backend
        )
        .set(f64::from(state.as_gauge()));
    }
}

impl<S: KeyValueStore> KeyValueStore for ResilientStore<S> {
    fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.execute("hash_set", || self.inner.hash_set(key, field, value))
    }

    fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        self.execute("hash_get_all", || self.inner.hash_get_all(key))
    }

    fn hash_delete(&self, key: &str) -> Result<bool> {
        self.execute("hash_delete", || self.inner.hash_delete(key))
    }

    fn hash_delete_field(&self, key: &str, field: &str) -> Result<bool> {
        self.execute("hash_delete_field", || {
            self.inner.hash_delete_field(key, field)
        })
    }

    fn hash_increment_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.execute("hash_increment_by", || {
            self.inner.hash_increment_by(key, field, delta)
        })
    }

    fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        self.execute("set_add", || self.inner.set_add(key, member))
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.execute("set_remove", || self.inner.set_remove(key, member))
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.execute("set_members", || self.inner.set_members(key))
    }

    fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        self.execute("set_contains", || self.inner.set_contains(key, member))
    }

    fn set_cardinality(&self, key: &str) -> Result<usize> {
        self.execute("set_cardinality", || self.inner.set_cardinality(key))
    }

    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.execute("scan_keys", || self.inner.scan_keys(prefix))
    }
}
