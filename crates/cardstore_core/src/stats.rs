//! Engine statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = engine.stats();
//! println!("cache hits: {}", stats.cache_hits);
//! println!("fallbacks: {}", stats.fallbacks);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine counters.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct EngineStats {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    /// Reads answered by the backup mirror or a default instead of the backend.
    fallbacks: AtomicU64,
    mirror_writes: AtomicU64,
    mirror_failures: AtomicU64,
    backend_errors: AtomicU64,
    repairs: AtomicU64,
    bytes_written: AtomicU64,
}

impl EngineStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_mirror(&self, outcome: crate::backup::MirrorOutcome) {
        use crate::backup::MirrorOutcome;
        match outcome {
            MirrorOutcome::Written => self.mirror_writes.fetch_add(1, Ordering::Relaxed),
            MirrorOutcome::Failed => self.mirror_failures.fetch_add(1, Ordering::Relaxed),
            MirrorOutcome::Skipped => 0,
        };
    }

    pub(crate) fn record_backend_error(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_repair(&self) {
        self.repairs.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            mirror_writes: self.mirror_writes.load(Ordering::Relaxed),
            mirror_failures: self.mirror_failures.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            repairs: self.repairs.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Facade reads (collections and documents).
    pub reads: u64,
    /// Facade writes that reached the backend.
    pub writes: u64,
    /// Facade deletes that reached the backend.
    pub deletes: u64,
    /// Reads answered from the cache.
    pub cache_hits: u64,
    /// Reads that went to the backend.
    pub cache_misses: u64,
    /// Reads answered by the mirror or a default.
    pub fallbacks: u64,
    /// Successful mirror writes.
    pub mirror_writes: u64,
    /// Failed mirror writes.
    pub mirror_failures: u64,
    /// Backend failures observed.
    pub backend_errors: u64,
    /// Values re-written to the backend from the mirror.
    pub repairs: u64,
    /// Encoded bytes written to the backend.
    pub bytes_written: u64,
}

impl StatsSnapshot {
    /// Fraction of reads answered from the cache.
    #[must_use]
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
