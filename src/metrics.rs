//! Per-handle operation counters.
//!
//! Each [`EntityCache`](crate::EntityCache) handle counts its own operations;
//! counters are not aggregated across processes or across handles attached to
//! the same backing store. They exist for operational visibility — a loader
//! reporting how many records it rejected as duplicates, a bidder watching
//! its hit rate — not for billing-grade accounting.
//!
//! Counters are atomics so the read-path (`retrieve` takes the lock in shared
//! mode and `&self`) can record hits and misses without exclusive access.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for one cache handle.
#[derive(Default)]
pub struct CacheMetrics {
    inserts: AtomicU64,
    duplicates: AtomicU64,
    updates: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    removes: AtomicU64,
    grows: AtomicU64,
}

impl CacheMetrics {
    /// Creates a zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful inserts (new unique key stored).
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Inserts rejected because the unique key was already present.
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    /// Entities modified in place by `update` calls.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Retrieve calls that found at least one match.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Retrieve calls that found nothing.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Entities erased by `remove` calls.
    pub fn removes(&self) -> u64 {
        self.removes.load(Ordering::Relaxed)
    }

    /// Segment growths performed by this handle.
    pub fn grows(&self) -> u64 {
        self.grows.load(Ordering::Relaxed)
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_updates(&self, n: u64) {
        self.updates.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_lookup(&self, found: bool) {
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_removes(&self, n: u64) {
        self.removes.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_grow(&self) {
        self.grows.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for CacheMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheMetrics")
            .field("inserts", &self.inserts())
            .field("duplicates", &self.duplicates())
            .field("updates", &self.updates())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .field("removes", &self.removes())
            .field("grows", &self.grows())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let m = CacheMetrics::new();
        assert_eq!(m.inserts(), 0);
        assert_eq!(m.hits(), 0);
        assert_eq!(m.grows(), 0);
    }

    #[test]
    fn test_lookup_split() {
        let m = CacheMetrics::new();
        m.record_lookup(true);
        m.record_lookup(false);
        m.record_lookup(false);
        assert_eq!(m.hits(), 1);
        assert_eq!(m.misses(), 2);
    }
}
