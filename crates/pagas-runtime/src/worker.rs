//! Node-local worker dispatch.
//!
//! Ranks are the unit of distribution; within a rank, `run_worker` fans a
//! kernel out over the owned index range with scoped threads, one
//! near-even contiguous chunk per thread. The kernel only reads shared
//! memory and writes its own chunk, so chunks never overlap and no
//! locking is needed.

use tracing::debug;

/// Split `[start, end)` into at most `parts` contiguous chunks of
/// near-equal length. Surplus indices go to the leading chunks; empty
/// chunks are omitted.
pub fn partition(start: usize, end: usize, parts: usize) -> Vec<(usize, usize)> {
    let len = end.saturating_sub(start);
    let parts = parts.max(1);
    let base = len / parts;
    let surplus = len % parts;

    let mut chunks = Vec::with_capacity(parts.min(len));
    let mut at = start;
    for i in 0..parts {
        let size = base + usize::from(i < surplus);
        if size == 0 {
            break;
        }
        chunks.push((at, at + size));
        at += size;
    }
    chunks
}

/// Run `body` over `[start, end)` on `threads` scoped threads, each
/// receiving one chunk as a half-open `(start, end)` range. Blocks until
/// every chunk is done; a panic in any chunk propagates.
pub fn run_chunks<F>(start: usize, end: usize, threads: usize, body: F)
where
    F: Fn(usize, usize) + Sync,
{
    let chunks = partition(start, end, threads);
    debug!(start, end, chunks = chunks.len(), "dispatching worker chunks");
    match chunks.as_slice() {
        [] => {}
        [(lo, hi)] => body(*lo, *hi),
        chunks => {
            let body = &body;
            std::thread::scope(|scope| {
                for &(lo, hi) in chunks {
                    scope.spawn(move || body(lo, hi));
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn partition_is_exact_and_balanced() {
        let chunks = partition(10, 33, 4);
        assert_eq!(chunks, vec![(10, 16), (16, 22), (22, 28), (28, 33)]);

        let total: usize = chunks.iter().map(|(lo, hi)| hi - lo).sum();
        assert_eq!(total, 23);
    }

    #[test]
    fn partition_with_more_parts_than_items() {
        let chunks = partition(0, 3, 8);
        assert_eq!(chunks, vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn partition_empty_range() {
        assert!(partition(5, 5, 4).is_empty());
    }

    #[test]
    fn run_chunks_covers_every_index_once() {
        let hits: Vec<AtomicUsize> = (0..100).map(|_| AtomicUsize::new(0)).collect();
        run_chunks(0, 100, 7, |lo, hi| {
            for i in lo..hi {
                hits[i].fetch_add(1, Ordering::Relaxed);
            }
        });
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn single_thread_runs_inline() {
        let count = AtomicUsize::new(0);
        run_chunks(0, 10, 1, |lo, hi| {
            count.fetch_add(hi - lo, Ordering::Relaxed);
        });
        assert_eq!(count.load(Ordering::Relaxed), 10);
    }
}
