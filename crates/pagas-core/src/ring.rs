//! FIFO admission ring for the frame cache.
//!
//! Records which (allocation, page) each occupied cache frame currently
//! holds, in admission order. The front entry is always the next eviction
//! victim; there is no recency tracking. Capacity is fixed at construction,
//! one slot per cache frame.

/// One occupied cache frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingEntry {
    /// Frame holding the page.
    pub frame: usize,
    /// Allocation the page belongs to.
    pub alloc: u64,
    /// Page index within the allocation.
    pub page: usize,
}

/// Fixed-capacity FIFO ring of admitted frames.
#[derive(Debug)]
pub struct FrameRing {
    slots: Box<[Option<RingEntry>]>,
    start: usize,
    len: usize,
}

impl FrameRing {
    /// Create an empty ring with room for `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)].into_boxed_slice(),
            start: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Admit an entry at the back of the ring. Panics if the ring is full;
    /// the cache evicts before admitting.
    pub fn push(&mut self, entry: RingEntry) {
        assert!(!self.is_full(), "frame ring overflow");
        let idx = (self.start + self.len) % self.slots.len();
        self.slots[idx] = Some(entry);
        self.len += 1;
    }

    /// The oldest admitted entry, i.e. the next eviction victim.
    pub fn front(&self) -> Option<&RingEntry> {
        if self.len == 0 {
            None
        } else {
            self.slots[self.start].as_ref()
        }
    }

    /// Remove and return the oldest admitted entry.
    pub fn pop(&mut self) -> Option<RingEntry> {
        if self.len == 0 {
            return None;
        }
        let entry = self.slots[self.start].take();
        self.start = (self.start + 1) % self.slots.len();
        self.len -= 1;
        entry
    }

    /// Iterate entries in admission order (oldest first).
    pub fn iter(&self) -> impl Iterator<Item = &RingEntry> {
        (0..self.len).filter_map(move |i| self.slots[(self.start + i) % self.slots.len()].as_ref())
    }

    /// Drop every entry for which `keep` returns false, preserving
    /// admission order. Used when an allocation is freed while some of its
    /// pages are still cached.
    pub fn retain<F: FnMut(&RingEntry) -> bool>(&mut self, mut keep: F) {
        let kept: Vec<RingEntry> = self.iter().copied().filter(|e| keep(e)).collect();
        self.reset();
        for e in kept {
            self.push(e);
        }
    }

    /// Remove every entry.
    pub fn reset(&mut self) {
        self.slots.fill(None);
        self.start = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(frame: usize, page: usize) -> RingEntry {
        RingEntry {
            frame,
            alloc: 1,
            page,
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut ring = FrameRing::new(3);
        ring.push(entry(0, 10));
        ring.push(entry(1, 11));
        ring.push(entry(2, 12));
        assert!(ring.is_full());
        assert_eq!(ring.pop().unwrap().page, 10);
        assert_eq!(ring.pop().unwrap().page, 11);
        ring.push(entry(0, 13));
        assert_eq!(ring.pop().unwrap().page, 12);
        assert_eq!(ring.pop().unwrap().page, 13);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_front_is_oldest() {
        let mut ring = FrameRing::new(2);
        ring.push(entry(0, 5));
        ring.push(entry(1, 6));
        assert_eq!(ring.front().unwrap().page, 5);
        ring.pop();
        assert_eq!(ring.front().unwrap().page, 6);
    }

    #[test]
    fn test_wraparound_keeps_order() {
        let mut ring = FrameRing::new(2);
        for p in 0..10 {
            if ring.is_full() {
                ring.pop();
            }
            ring.push(entry(p % 2, p));
        }
        let pages: Vec<usize> = ring.iter().map(|e| e.page).collect();
        assert_eq!(pages, vec![8, 9]);
    }

    #[test]
    fn test_retain_preserves_order() {
        let mut ring = FrameRing::new(4);
        for p in 0..4 {
            ring.push(RingEntry {
                frame: p,
                alloc: (p % 2) as u64,
                page: p,
            });
        }
        ring.retain(|e| e.alloc == 0);
        let pages: Vec<usize> = ring.iter().map(|e| e.page).collect();
        assert_eq!(pages, vec![0, 2]);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_reset() {
        let mut ring = FrameRing::new(2);
        ring.push(entry(0, 1));
        ring.reset();
        assert!(ring.is_empty());
        assert!(ring.front().is_none());
    }
}
