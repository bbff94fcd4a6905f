//! Runtime configuration.

use std::env;

/// Tuning knobs for a [`crate::Runtime`].
///
/// Defaults come first from the environment (`PAGAS_CACHE_SIZE`,
/// `PAGAS_CACHE_LINE`, `PAGAS_WORKERS`), then from built-in values; the
/// builder methods override both.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Total frame cache budget in bytes, rounded down to whole frames.
    pub cache_budget_bytes: usize,
    /// Logical page size as a multiple of the system page.
    pub page_multiplier: usize,
    /// Threads spawned by `run_worker`; 0 means one per CPU.
    pub worker_threads: usize,
    /// Initial slot count of the explicit prefetch queue.
    pub queue_capacity: usize,
    /// Whether `report` prints per-rank counters at finalize.
    pub report_on_finalize: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cache_budget_bytes: env_usize("PAGAS_CACHE_SIZE").unwrap_or(512 * 1024 * 1024),
            page_multiplier: env_usize("PAGAS_CACHE_LINE").unwrap_or(1).max(1),
            worker_threads: env_usize("PAGAS_WORKERS").unwrap_or(0),
            queue_capacity: 16,
            report_on_finalize: false,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the frame cache budget in bytes.
    pub fn with_cache_budget(mut self, bytes: usize) -> Self {
        self.cache_budget_bytes = bytes;
        self
    }

    /// Set the logical page size as a multiple of the system page.
    pub fn with_page_multiplier(mut self, multiplier: usize) -> Self {
        self.page_multiplier = multiplier.max(1);
        self
    }

    /// Set the number of worker threads (0 = one per CPU).
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the initial prefetch queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Print counters when the runtime is finalized.
    pub fn with_report_on_finalize(mut self, on: bool) -> Self {
        self.report_on_finalize = on;
        self
    }

    /// Effective worker thread count.
    pub fn effective_workers(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let cfg = RuntimeConfig::new()
            .with_cache_budget(1 << 20)
            .with_page_multiplier(4)
            .with_worker_threads(3)
            .with_queue_capacity(8);
        assert_eq!(cfg.cache_budget_bytes, 1 << 20);
        assert_eq!(cfg.page_multiplier, 4);
        assert_eq!(cfg.effective_workers(), 3);
        assert_eq!(cfg.queue_capacity, 8);
    }

    #[test]
    fn zero_workers_means_cpu_count() {
        let cfg = RuntimeConfig::new().with_worker_threads(0);
        assert!(cfg.effective_workers() >= 1);
    }

    #[test]
    fn page_multiplier_is_clamped() {
        let cfg = RuntimeConfig::new().with_page_multiplier(0);
        assert_eq!(cfg.page_multiplier, 1);
    }
}
