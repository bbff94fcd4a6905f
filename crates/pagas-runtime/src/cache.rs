//! Frame cache bookkeeping.
//!
//! A fixed pool of page-sized frames backs every remotely fetched page.
//! Frames cycle between their *home* slot in the pool and a *page* site
//! inside some allocation; admission order is FIFO, tracked by a ring.
//! One frame at a time may be reserved for the sequential one-page-ahead
//! prefetch.
//!
//! This module is pure bookkeeping: it decides which frame to use and
//! what to evict, and the runtime driver performs the actual protection
//! changes, relocations, and transfers. That split keeps the replacement
//! policy testable without any memory mapping.

use pagas_core::{FrameRing, RingEntry};
use pagas_transport::TransferHandle;

use crate::registry::AllocId;

/// Where a frame currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSite {
    /// In the pool, idle.
    Home,
    /// Relocated into an allocation, holding that page's contents.
    Page { alloc: AllocId, page: usize },
}

/// An issued but not yet consumed sequential prefetch.
#[derive(Debug, Clone, Copy)]
pub struct PendingPrefetch {
    pub frame: usize,
    pub alloc: AllocId,
    pub page: usize,
    pub handle: TransferHandle,
}

/// A frame granted for a new page, possibly displacing a resident one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGrant {
    pub frame: usize,
    /// Page the driver must invalidate and relocate home first.
    pub evict: Option<(AllocId, usize)>,
}

/// Everything the driver must undo on a cache reset.
#[derive(Debug)]
pub struct ResetPlan {
    /// Resident frames to invalidate and relocate home, admission order.
    pub occupied: Vec<(usize, AllocId, usize)>,
    /// Outstanding prefetch to drain and discard.
    pub pending: Option<PendingPrefetch>,
}

/// FIFO frame cache with a single prefetch slot.
#[derive(Debug)]
pub struct FrameCache {
    ring: FrameRing,
    free: Vec<usize>,
    sites: Vec<FrameSite>,
    pending: Option<PendingPrefetch>,
}

impl FrameCache {
    /// Cache over `capacity` frames, all initially free.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "frame cache needs at least one frame");
        Self {
            ring: FrameRing::new(capacity),
            free: (0..capacity).rev().collect(),
            sites: vec![FrameSite::Home; capacity],
            pending: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.sites.len()
    }

    /// Number of frames currently holding a page.
    pub fn resident(&self) -> usize {
        self.ring.len()
    }

    pub fn site_of(&self, frame: usize) -> FrameSite {
        self.sites[frame]
    }

    /// Whether `page` of `alloc` is resident (seated, not pending).
    pub fn is_resident(&self, alloc: AllocId, page: usize) -> bool {
        self.ring
            .iter()
            .any(|entry| entry.alloc == alloc.0 && entry.page == page)
    }

    pub fn pending(&self) -> Option<&PendingPrefetch> {
        self.pending.as_ref()
    }

    /// Consume the pending prefetch if it covers `(alloc, page)`.
    pub fn take_matching_pending(&mut self, alloc: AllocId, page: usize) -> Option<PendingPrefetch> {
        match self.pending {
            Some(p) if p.alloc == alloc && p.page == page => self.pending.take(),
            _ => None,
        }
    }

    /// Consume the pending prefetch regardless of target. The caller
    /// must drain its transfer before reusing the frame.
    pub fn take_pending(&mut self) -> Option<PendingPrefetch> {
        self.pending.take()
    }

    /// Grant a frame for a faulted page: a free frame if one exists,
    /// otherwise the oldest resident frame, which the driver evicts.
    pub fn acquire_frame(&mut self) -> FrameGrant {
        if let Some(frame) = self.free.pop() {
            return FrameGrant { frame, evict: None };
        }
        // Ring cannot be empty here: every non-free, non-pending frame
        // is seated in it.
        let entry = self
            .ring
            .pop()
            .unwrap_or_else(|| unreachable!("no free frames and empty ring"));
        self.sites[entry.frame] = FrameSite::Home;
        FrameGrant {
            frame: entry.frame,
            evict: Some((AllocId(entry.alloc), entry.page)),
        }
    }

    /// Record that `frame` now holds `page` of `alloc` and joins the
    /// FIFO order at the tail.
    pub fn seat(&mut self, frame: usize, alloc: AllocId, page: usize) {
        self.sites[frame] = FrameSite::Page { alloc, page };
        self.ring.push(RingEntry {
            frame,
            alloc: alloc.0,
            page,
        });
    }

    /// Return a frame to the free pool after the driver relocated it
    /// home.
    pub fn release(&mut self, frame: usize) {
        self.sites[frame] = FrameSite::Home;
        self.free.push(frame);
    }

    /// Reserve a frame for a sequential prefetch: a free frame if one
    /// exists, otherwise the oldest resident frame, which the driver
    /// evicts. Keeps the one-page-ahead double buffer alive once the
    /// cache has filled. Declines when the prediction would displace the
    /// only resident page (that page was just faulted in).
    pub fn reserve_prefetch(&mut self) -> Option<FrameGrant> {
        if self.pending.is_some() {
            return None;
        }
        if let Some(frame) = self.free.pop() {
            return Some(FrameGrant { frame, evict: None });
        }
        if self.ring.len() < 2 {
            return None;
        }
        let entry = self
            .ring
            .pop()
            .unwrap_or_else(|| unreachable!("ring length checked above"));
        self.sites[entry.frame] = FrameSite::Home;
        Some(FrameGrant {
            frame: entry.frame,
            evict: Some((AllocId(entry.alloc), entry.page)),
        })
    }

    /// Record the issued transfer for a frame from [`Self::reserve_prefetch`].
    pub fn commit_prefetch(
        &mut self,
        frame: usize,
        alloc: AllocId,
        page: usize,
        handle: TransferHandle,
    ) {
        self.pending = Some(PendingPrefetch {
            frame,
            alloc,
            page,
            handle,
        });
    }

    /// Undo a reservation whose transfer was never issued.
    pub fn cancel_prefetch(&mut self, frame: usize) {
        self.free.push(frame);
    }

    /// Drop one resident page, preserving FIFO order of the rest.
    /// Returns the frame that held it, already moved to the free pool;
    /// the driver still has to relocate it home.
    pub fn evict_page(&mut self, alloc: AllocId, page: usize) -> Option<usize> {
        let mut frame = None;
        self.ring.retain(|entry| {
            if entry.alloc == alloc.0 && entry.page == page {
                frame = Some(entry.frame);
                false
            } else {
                true
            }
        });
        if let Some(frame) = frame {
            self.sites[frame] = FrameSite::Home;
            self.free.push(frame);
        }
        frame
    }

    /// Drop every frame belonging to `alloc`, preserving FIFO order of
    /// the rest. Returns what the driver must relocate home, plus any
    /// pending prefetch into the allocation.
    pub fn drop_allocation(&mut self, alloc: AllocId) -> ResetPlan {
        let mut occupied = Vec::new();
        self.ring.retain(|entry| {
            if entry.alloc == alloc.0 {
                occupied.push((entry.frame, AllocId(entry.alloc), entry.page));
                false
            } else {
                true
            }
        });
        for &(frame, _, _) in &occupied {
            self.sites[frame] = FrameSite::Home;
            self.free.push(frame);
        }
        let pending = match self.pending {
            Some(p) if p.alloc == alloc => {
                self.free.push(p.frame);
                self.pending.take()
            }
            _ => None,
        };
        ResetPlan { occupied, pending }
    }

    /// Empty the whole cache. Used at synchronization points, where any
    /// resident copy may be stale.
    pub fn reset(&mut self) -> ResetPlan {
        let mut occupied = Vec::new();
        for entry in self.ring.iter() {
            occupied.push((entry.frame, AllocId(entry.alloc), entry.page));
        }
        self.ring.reset();
        for &(frame, _, _) in &occupied {
            self.sites[frame] = FrameSite::Home;
            self.free.push(frame);
        }
        let pending = self.pending.take();
        if let Some(p) = &pending {
            self.free.push(p.frame);
        }
        ResetPlan { occupied, pending }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: AllocId = AllocId(1);
    const B: AllocId = AllocId(2);

    #[test]
    fn fifo_eviction_order() {
        let mut cache = FrameCache::new(2);
        let g0 = cache.acquire_frame();
        assert_eq!(g0.evict, None);
        cache.seat(g0.frame, A, 0);
        let g1 = cache.acquire_frame();
        assert_eq!(g1.evict, None);
        cache.seat(g1.frame, A, 1);

        // Cache full: the next grant displaces the oldest page.
        let g2 = cache.acquire_frame();
        assert_eq!(g2.evict, Some((A, 0)));
        cache.seat(g2.frame, A, 2);
        assert!(!cache.is_resident(A, 0));
        assert!(cache.is_resident(A, 1));
        assert!(cache.is_resident(A, 2));
    }

    #[test]
    fn prefetch_never_displaces_the_only_resident_page() {
        let mut cache = FrameCache::new(1);
        let g = cache.acquire_frame();
        cache.seat(g.frame, A, 0);
        assert!(cache.reserve_prefetch().is_none());
    }

    #[test]
    fn prefetch_claims_oldest_frame_when_cache_is_full() {
        let mut cache = FrameCache::new(2);
        for page in 0..2 {
            let g = cache.acquire_frame();
            cache.seat(g.frame, A, page);
        }

        let grant = cache.reserve_prefetch().unwrap();
        assert_eq!(grant.evict, Some((A, 0)));
        assert!(!cache.is_resident(A, 0));
        assert!(cache.is_resident(A, 1));
        cache.commit_prefetch(grant.frame, A, 2, TransferHandle(3));

        // The claimed frame cycles back through the pending slot.
        let p = cache.take_matching_pending(A, 2).unwrap();
        assert_eq!(p.frame, grant.frame);
    }

    #[test]
    fn matching_pending_is_consumed() {
        let mut cache = FrameCache::new(2);
        let g = cache.acquire_frame();
        cache.seat(g.frame, A, 0);
        let grant = cache.reserve_prefetch().unwrap();
        cache.commit_prefetch(grant.frame, A, 1, TransferHandle(7));

        assert!(cache.take_matching_pending(A, 2).is_none());
        let p = cache.take_matching_pending(A, 1).unwrap();
        assert_eq!(p.handle, TransferHandle(7));
        assert_eq!(p.frame, grant.frame);
        assert!(cache.pending().is_none());
    }

    #[test]
    fn only_one_pending_at_a_time() {
        let mut cache = FrameCache::new(4);
        let grant = cache.reserve_prefetch().unwrap();
        cache.commit_prefetch(grant.frame, A, 1, TransferHandle(1));
        assert!(cache.reserve_prefetch().is_none());
    }

    #[test]
    fn drop_allocation_keeps_others_in_order() {
        let mut cache = FrameCache::new(4);
        for (alloc, page) in [(A, 0), (B, 0), (A, 1), (B, 1)] {
            let g = cache.acquire_frame();
            cache.seat(g.frame, alloc, page);
        }
        let plan = cache.drop_allocation(A);
        assert_eq!(plan.occupied.len(), 2);
        assert!(!cache.is_resident(A, 0));
        assert!(cache.is_resident(B, 0));
        assert_eq!(cache.resident(), 2);

        // B pages keep their admission order.
        let g = cache.acquire_frame();
        assert_eq!(g.evict, None); // freed frames are reused first
        cache.seat(g.frame, B, 2);
        let g = cache.acquire_frame();
        cache.seat(g.frame, B, 3);
        let g = cache.acquire_frame();
        assert_eq!(g.evict, Some((B, 0)));
        cache.seat(g.frame, B, 4);
    }

    #[test]
    fn reset_frees_everything() {
        let mut cache = FrameCache::new(3);
        for page in 0..2 {
            let g = cache.acquire_frame();
            cache.seat(g.frame, A, page);
        }
        let grant = cache.reserve_prefetch().unwrap();
        cache.commit_prefetch(grant.frame, A, 2, TransferHandle(9));

        let plan = cache.reset();
        assert_eq!(plan.occupied.len(), 2);
        assert!(plan.pending.is_some());
        assert_eq!(cache.resident(), 0);

        // All frames usable again without eviction.
        for page in 0..3 {
            let g = cache.acquire_frame();
            assert_eq!(g.evict, None);
            cache.seat(g.frame, A, page);
        }
    }
}
