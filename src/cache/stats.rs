//! Cache Statistics Module
//!
//! Tracks store metrics (hits, misses, evictions, expirations) and the
//! lazy layer's computation counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of cache metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups that found a live entry
    pub hits: u64,
    /// Lookups that found nothing (or only an expired entry)
    pub misses: u64,
    /// Entries dropped to respect the capacity limit
    pub evictions: u64,
    /// Entries dropped because their expiration elapsed
    pub expirations: u64,
    /// Current number of entries in the store
    pub total_entries: usize,
    /// Value factories actually executed
    pub factory_executions: u64,
    /// get-or-add calls served by an existing entry or in-flight computation
    pub coalesced_requests: u64,
    /// Value factories that failed
    pub factory_failures: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}

// == Computation Counters ==
/// Lock-free counters updated from inside running factories.
#[derive(Debug, Default)]
pub struct ComputationCounters {
    executions: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
}

impl ComputationCounters {
    pub fn record_execution(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the counters into a store snapshot.
    pub fn apply_to(&self, stats: &mut CacheStats) {
        stats.factory_executions = self.executions.load(Ordering::Relaxed);
        stats.coalesced_requests = self.coalesced.load(Ordering::Relaxed);
        stats.factory_failures = self.failures.load(Ordering::Relaxed);
    }
}
