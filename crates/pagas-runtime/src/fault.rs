//! Fault resolution.
//!
//! An access violation inside a tracked allocation is turned into a
//! [`FetchPlan`]: which page to materialize, from which owner, into which
//! frame, what to evict, and whether to start the next sequential
//! prefetch. The plan is computed here without touching memory or the
//! transport, so the whole replacement and prefetch behavior is exercised
//! by simulated faults in unit tests; the runtime driver then executes
//! the plan.

use pagas_transport::TransferHandle;

use crate::cache::{FrameCache, PendingPrefetch};
use crate::error::{Result, RuntimeError};
use crate::registry::{AllocId, Registry};

/// Where the faulted page's bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// The sequential prefetch already in flight for exactly this page.
    Pending(TransferHandle),
    /// A fresh blocking read from the owner.
    Remote,
}

/// The next sequential prefetch to issue after servicing a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchIntent {
    pub frame: usize,
    pub alloc: AllocId,
    pub page: usize,
    pub owner: u32,
    /// Byte offset of the page within the allocation.
    pub offset: usize,
    pub len: usize,
    /// Resident page displaced to free the prefetch frame.
    pub evict: Option<(AllocId, usize)>,
}

/// Everything the driver must do to service one fault.
#[derive(Debug)]
pub struct FetchPlan {
    pub alloc: AllocId,
    pub page: usize,
    /// Rank serving the page (owner of its first byte).
    pub owner: u32,
    /// Byte offset of the page within the allocation.
    pub offset: usize,
    /// Bytes of the page inside the allocation (tail page may be short).
    pub len: usize,
    /// Frame that will hold the page.
    pub frame: usize,
    pub source: FetchSource,
    /// Resident page displaced to make room, oldest first.
    pub evict: Option<(AllocId, usize)>,
    /// An in-flight prefetch for a different page whose transfer must be
    /// drained before its frame is reused.
    pub drain: Option<PendingPrefetch>,
    pub prefetch: Option<PrefetchIntent>,
}

/// Resolve a faulting address into a [`FetchPlan`].
///
/// Owned pages are mapped readable for the lifetime of the allocation, so
/// a fault on one means corrupted state; it aborts the job rather than
/// being serviced.
pub fn resolve_fault(
    registry: &Registry,
    cache: &mut FrameCache,
    rank: u32,
    addr: usize,
) -> Result<FetchPlan> {
    let alloc = registry
        .find_containing(addr)
        .ok_or(RuntimeError::UnknownAddress { addr })?;
    let layout = &alloc.layout;
    let offset = addr - alloc.base;
    let page = layout.page_of(offset);
    if layout.owned_pages(rank).contains(page) {
        return Err(RuntimeError::OwnedPageFault { addr });
    }

    let owner = layout.owner_of(layout.page_start(page));

    // A fault on the page the prefetcher already requested consumes that
    // transfer; a fault elsewhere drains and discards it, reusing the
    // reserved frame, so the access pattern never runs behind a stale
    // prediction.
    let (frame, source, evict, drain) =
        if let Some(p) = cache.take_matching_pending(alloc.id, page) {
            (p.frame, FetchSource::Pending(p.handle), None, None)
        } else if let Some(p) = cache.take_pending() {
            (p.frame, FetchSource::Remote, None, Some(p))
        } else {
            let grant = cache.acquire_frame();
            (grant.frame, FetchSource::Remote, grant.evict, None)
        };
    cache.seat(frame, alloc.id, page);

    // One page ahead, only when the successor is foreign and not yet
    // valid. Once the cache has filled, the prediction claims the oldest
    // resident frame so sequential scans keep double-buffering.
    let prefetch = layout.next_page_owner(page).and_then(|next_owner| {
        let next = page + 1;
        if layout.owned_pages(rank).contains(next)
            || alloc.valid.check(next)
            || cache.is_resident(alloc.id, next)
        {
            return None;
        }
        let grant = cache.reserve_prefetch()?;
        Some(PrefetchIntent {
            frame: grant.frame,
            alloc: alloc.id,
            page: next,
            owner: next_owner,
            offset: layout.page_start(next),
            len: layout.page_len(next),
            evict: grant.evict,
        })
    });

    Ok(FetchPlan {
        alloc: alloc.id,
        page,
        owner,
        offset: layout.page_start(page),
        len: layout.page_len(page),
        frame,
        source,
        evict,
        drain,
        prefetch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Allocation;
    use pagas_core::{BlockLayout, ValidityBitmap};

    // 4 ranks, 2000-byte blocks over 1024-byte pages: owned page spans
    // (boundary pages included) are 0..2, 1..4, 3..6, 5..8.
    fn registry() -> Registry {
        let layout = BlockLayout::new(1000, 8000, 4, 1024).unwrap();
        let mut reg = Registry::new();
        reg.insert(Allocation {
            id: AllocId(1),
            base: 0x10000,
            raw_base: 0x10000,
            raw_len: 8192,
            layout,
            valid: ValidityBitmap::new(layout.page_count()),
        });
        reg
    }

    fn fault(reg: &Registry, cache: &mut FrameCache, page: usize) -> FetchPlan {
        resolve_fault(reg, cache, 0, 0x10000 + page * 1024 + 3).unwrap()
    }

    #[test]
    fn unknown_address_is_fatal() {
        let reg = registry();
        let mut cache = FrameCache::new(2);
        let err = resolve_fault(&reg, &mut cache, 0, 0x9000).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownAddress { .. }));
    }

    #[test]
    fn owned_page_fault_is_fatal() {
        let reg = registry();
        let mut cache = FrameCache::new(2);
        let err = resolve_fault(&reg, &mut cache, 0, 0x10000).unwrap_err();
        assert!(matches!(err, RuntimeError::OwnedPageFault { .. }));
    }

    #[test]
    fn remote_fetch_targets_page_owner() {
        let reg = registry();
        let mut cache = FrameCache::new(4);
        let plan = fault(&reg, &mut cache, 4);
        assert_eq!(plan.owner, 2);
        assert_eq!(plan.offset, 4096);
        assert_eq!(plan.len, 1024);
        assert_eq!(plan.source, FetchSource::Remote);
        assert!(plan.evict.is_none());
        assert!(cache.is_resident(AllocId(1), 4));
    }

    #[test]
    fn tail_page_fetch_is_short() {
        let reg = registry();
        let mut cache = FrameCache::new(4);
        let plan = fault(&reg, &mut cache, 7);
        assert_eq!(plan.len, 8000 - 7 * 1024);
        // Last page has no successor to prefetch.
        assert!(plan.prefetch.is_none());
    }

    #[test]
    fn sequential_faults_ride_the_prefetch() {
        let reg = registry();
        let mut cache = FrameCache::new(4);

        let plan = fault(&reg, &mut cache, 3);
        let intent = plan.prefetch.unwrap();
        assert_eq!(intent.page, 4);
        assert_eq!(intent.owner, 2);
        cache.commit_prefetch(intent.frame, intent.alloc, intent.page, TransferHandle(42));

        // Next fault lands on the predicted page and consumes the
        // transfer instead of issuing a new one.
        let plan = fault(&reg, &mut cache, 4);
        assert_eq!(plan.source, FetchSource::Pending(TransferHandle(42)));
        assert!(plan.drain.is_none());
        assert_eq!(plan.frame, intent.frame);
    }

    #[test]
    fn stale_prefetch_is_drained_and_frame_reused() {
        let reg = registry();
        let mut cache = FrameCache::new(4);

        let plan = fault(&reg, &mut cache, 3);
        let intent = plan.prefetch.unwrap();
        cache.commit_prefetch(intent.frame, intent.alloc, intent.page, TransferHandle(7));

        // The access pattern jumps: page 6, not the predicted 4.
        let plan = fault(&reg, &mut cache, 6);
        assert_eq!(plan.source, FetchSource::Remote);
        let drained = plan.drain.unwrap();
        assert_eq!(drained.handle, TransferHandle(7));
        assert_eq!(plan.frame, drained.frame);
    }

    #[test]
    fn full_cache_evicts_in_admission_order() {
        let reg = registry();
        let mut cache = FrameCache::new(2);

        // Rank 1 owns pages 1..4; faults on 0 and 7 have no foreign
        // successor to predict, so they just fill both frames.
        let p0 = resolve_fault(&reg, &mut cache, 1, 0x10000 + 16).unwrap();
        assert!(p0.prefetch.is_none());
        let p7 = resolve_fault(&reg, &mut cache, 1, 0x10000 + 7 * 1024).unwrap();
        assert!(p7.prefetch.is_none());

        // Cache full: the fault displaces the oldest page and its
        // prediction claims the next-oldest frame.
        let plan = resolve_fault(&reg, &mut cache, 1, 0x10000 + 4 * 1024).unwrap();
        assert_eq!(plan.evict, Some((AllocId(1), 0)));
        let intent = plan.prefetch.unwrap();
        assert_eq!(intent.page, 5);
        assert_eq!(intent.owner, 2);
        assert_eq!(intent.evict, Some((AllocId(1), 7)));
        assert!(!cache.is_resident(AllocId(1), 0));
        assert!(!cache.is_resident(AllocId(1), 7));
        assert!(cache.is_resident(AllocId(1), 4));
    }

    #[test]
    fn no_prefetch_into_owned_or_resident_pages() {
        let reg = registry();
        let mut cache = FrameCache::new(4);

        // Rank 1's owned span covers pages 1..4; a fault on page 0 must
        // not prefetch page 1.
        let plan = resolve_fault(&reg, &mut cache, 1, 0x10000 + 16).unwrap();
        assert_eq!(plan.page, 0);
        assert!(plan.prefetch.is_none());

        // Page already resident: no prefetch either.
        let plan = fault(&reg, &mut cache, 5);
        if let Some(i) = plan.prefetch {
            cache.cancel_prefetch(i.frame);
        }
        let plan = fault(&reg, &mut cache, 4);
        assert!(plan.prefetch.is_none());
    }
}
