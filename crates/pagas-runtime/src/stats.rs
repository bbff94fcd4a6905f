//! Runtime counters.
//!
//! Counters are atomics so the fault path and worker threads bump them
//! without taking the engine lock; `snapshot` produces the plain struct
//! handed to callers and to the end-of-run report.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the runtime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Faults serviced by a remote fetch.
    pub faults: usize,
    /// Faults whose page was already in flight from the sequential
    /// prefetcher.
    pub prefetch_hits: usize,
    /// Resident pages displaced to make room.
    pub evictions: usize,
    /// Barriers entered (each `sync` contributes two).
    pub barriers: usize,
    /// Bytes pulled from peers, demand and prefetch combined.
    pub bytes_fetched: u64,
    /// Bytes of explicit prefetch requests issued.
    pub bytes_prefetched: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsInternal {
    faults: AtomicU64,
    prefetch_hits: AtomicU64,
    evictions: AtomicU64,
    barriers: AtomicU64,
    bytes_fetched: AtomicU64,
    bytes_prefetched: AtomicU64,
}

impl StatsInternal {
    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prefetch_hit(&self) {
        self.prefetch_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_barrier(&self) {
        self.barriers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetched(&self, bytes: usize) {
        self.bytes_fetched.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_prefetched(&self, bytes: usize) {
        self.bytes_prefetched
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RuntimeStats {
        RuntimeStats {
            faults: self.faults.load(Ordering::Relaxed) as usize,
            prefetch_hits: self.prefetch_hits.load(Ordering::Relaxed) as usize,
            evictions: self.evictions.load(Ordering::Relaxed) as usize,
            barriers: self.barriers.load(Ordering::Relaxed) as usize,
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            bytes_prefetched: self.bytes_prefetched.load(Ordering::Relaxed),
        }
    }
}
