//! Cache Statistics Module
//!
//! Tracks lookups, structural changes, expirations and listener failures.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Stats Counter ==
/// Atomic counters updated by cache operations and sweeps.
///
/// Lookups run under a shared lock, so every counter is atomic.
#[derive(Debug, Default)]
pub(crate) struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    removals: AtomicU64,
    expirations: AtomicU64,
    capacity_expirations: AtomicU64,
    listener_failures: AtomicU64,
    sweeps: AtomicU64,
}

impl StatsCounter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removals(&self, count: u64) {
        self.removals.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_capacity_expirations(&self, count: u64) {
        self.capacity_expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_listener_failures(&self, count: u64) {
        if count > 0 {
            self.listener_failures.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_sweep(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Returns a point-in-time copy of the counters.
    pub(crate) fn snapshot(&self, total_entries: usize, live_entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            capacity_expirations: self.capacity_expirations.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            total_entries,
            live_entries,
        }
    }
}

// == Cache Stats ==
/// A snapshot of one cache's statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Entries added
    pub inserts: u64,
    /// Entries removed explicitly, by overwrite or by delete-on-expire
    pub removals: u64,
    /// Entries expired by the time-based policy
    pub expirations: u64,
    /// Entries expired by the capacity policy
    pub capacity_expirations: u64,
    /// Listener callbacks that panicked
    pub listener_failures: u64,
    /// Sweeps run against this cache
    pub sweeps: u64,
    /// Entries currently stored, expired or not
    pub total_entries: usize,
    /// Entries currently stored and not expired
    pub live_entries: usize,
}

impl CacheStats {
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
}
