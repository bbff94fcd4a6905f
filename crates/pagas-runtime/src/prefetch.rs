//! Application-directed prefetch.
//!
//! `prefetch(addr, len)` turns a byte range into per-owner transfer
//! pieces: the range is rounded outward to page boundaries, clipped to
//! the allocation, stripped of the caller's own pages, and split so each
//! piece is served by a single owner with one non-blocking read. The
//! pieces live in a [`PrefetchQueue`] until the data is consumed by a
//! fault or released by `discard`.
//!
//! Range splitting is pure layout arithmetic, kept free of runtime state
//! for the same reason the fault engine is: the tests drive it directly.

use pagas_core::{BlockLayout, PageSpan, TransferQueue};
use pagas_transport::TransferHandle;

use crate::registry::AllocId;

/// One single-owner piece of a requested prefetch range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchPiece {
    pub pages: PageSpan,
    pub owner: u32,
    /// Byte offset of `pages.start` within the allocation.
    pub offset: usize,
    /// Transfer length in bytes (tail page clipped to the allocation).
    pub len: usize,
}

/// An outstanding or materialized explicit prefetch.
#[derive(Debug)]
pub struct PrefetchEntry {
    pub alloc: AllocId,
    pub pages: PageSpan,
    pub owner: u32,
    pub offset: usize,
    pub len: usize,
    /// In-flight transfer; `None` once the pages are materialized.
    pub handle: Option<TransferHandle>,
}

impl PrefetchEntry {
    pub fn covers(&self, alloc: AllocId, page: usize) -> bool {
        self.alloc == alloc && self.pages.contains(page)
    }
}

/// Split `[offset, offset + len)` of an allocation into prefetch pieces
/// for `rank`.
///
/// Shared boundary pages of the caller's block are already mapped, so
/// the owned exclusion removes them too; what remains is at most one
/// interval below the owned span and one above, each further split at
/// owner boundaries.
pub fn plan_prefetch(
    layout: &BlockLayout,
    rank: u32,
    offset: usize,
    len: usize,
) -> Vec<PrefetchPiece> {
    if len == 0 || offset >= layout.size() {
        return Vec::new();
    }
    let end = (offset + len).min(layout.size());
    let first_page = layout.page_of(offset);
    let last_page = layout.page_of(end - 1) + 1;
    let owned = layout.owned_pages(rank);

    let below = PageSpan {
        start: first_page,
        end: last_page.min(owned.start),
    };
    let above = PageSpan {
        start: first_page.max(owned.end),
        end: last_page,
    };

    let mut pieces = Vec::new();
    for span in [below, above] {
        if span.is_empty() {
            continue;
        }
        let mut start = span.start;
        while start < span.end {
            let owner = layout.owner_of(layout.page_start(start));
            let mut stop = start + 1;
            while stop < span.end && layout.owner_of(layout.page_start(stop)) == owner {
                stop += 1;
            }
            let piece_offset = layout.page_start(start);
            let piece_end = layout.page_start(stop).min(layout.size());
            pieces.push(PrefetchPiece {
                pages: PageSpan { start, end: stop },
                owner,
                offset: piece_offset,
                len: piece_end - piece_offset,
            });
            start = stop;
        }
    }
    pieces
}

/// Queue of outstanding explicit prefetches.
///
/// Entries keep their slot index from insertion to removal, so an entry
/// found during fault servicing can be updated in place.
#[derive(Debug)]
pub struct PrefetchQueue {
    entries: TransferQueue<PrefetchEntry>,
}

impl PrefetchQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: TransferQueue::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, entry: PrefetchEntry) -> usize {
        self.entries.insert(entry)
    }

    /// First entry covering `page` of `alloc`, insertion order.
    pub fn find_covering(&self, alloc: AllocId, page: usize) -> Option<usize> {
        self.entries.find(|entry| entry.covers(alloc, page))
    }

    /// Indices of every entry of `alloc` overlapping pages
    /// `[start, end)`, insertion order.
    pub fn overlapping(&self, alloc: AllocId, start: usize, end: usize) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|(_, entry)| {
                entry.alloc == alloc && entry.pages.start < end && start < entry.pages.end
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Indices of every entry of `alloc`, insertion order.
    pub fn of_allocation(&self, alloc: AllocId) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.alloc == alloc)
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn get(&self, index: usize) -> Option<&PrefetchEntry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PrefetchEntry> {
        self.entries.get_mut(index)
    }

    pub fn remove(&mut self, index: usize) -> PrefetchEntry {
        self.entries.remove(index)
    }

    /// Drain every entry, insertion order. Used at synchronization and
    /// teardown, where all outstanding transfers must be settled.
    pub fn drain_all(&mut self) -> Vec<PrefetchEntry> {
        let indices: Vec<usize> = self.entries.iter().map(|(idx, _)| idx).collect();
        indices
            .into_iter()
            .map(|idx| self.entries.remove(idx))
            .collect()
    }
}
