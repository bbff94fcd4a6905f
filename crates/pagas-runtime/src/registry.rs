//! Allocation registry.
//!
//! Allocations are kept sorted by base address so a faulting address can
//! be attributed with a binary search instead of a linear scan. The
//! registry owns the per-allocation validity bitmaps; the cache refers
//! to pages only through `(AllocId, page index)` pairs.

use pagas_core::{BlockLayout, ValidityBitmap};

use crate::error::{Result, RuntimeError};

/// Identifier of one collective allocation, unique within a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocId(pub u64);

impl std::fmt::Display for AllocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "alloc({})", self.0)
    }
}

/// One live collective allocation.
#[derive(Debug)]
pub struct Allocation {
    pub id: AllocId,
    /// Page-aligned base of the user-visible region.
    pub base: usize,
    /// Base of the underlying reservation (may precede `base`).
    pub raw_base: usize,
    /// Length of the underlying reservation.
    pub raw_len: usize,
    pub layout: BlockLayout,
    /// One bit per page of the region; set pages are locally readable.
    pub valid: ValidityBitmap,
}

impl Allocation {
    /// Number of logical pages covering the region.
    pub fn page_count(&self) -> usize {
        self.layout.page_count()
    }

    /// Address of page `index` within this allocation.
    pub fn page_addr(&self, index: usize) -> usize {
        self.base + index * self.layout.page_size()
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.base + self.layout.size()
    }
}

/// Address-sorted set of live allocations.
#[derive(Debug, Default)]
pub struct Registry {
    // Sorted by `base`; regions never overlap.
    entries: Vec<Allocation>,
}

impl Registry {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn insert(&mut self, alloc: Allocation) {
        let at = self
            .entries
            .partition_point(|entry| entry.base < alloc.base);
        self.entries.insert(at, alloc);
    }

    pub fn remove(&mut self, id: AllocId) -> Result<Allocation> {
        match self.entries.iter().position(|entry| entry.id == id) {
            Some(at) => Ok(self.entries.remove(at)),
            None => Err(RuntimeError::UnknownAllocation(id)),
        }
    }

    pub fn get(&self, id: AllocId) -> Result<&Allocation> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .ok_or(RuntimeError::UnknownAllocation(id))
    }

    pub fn get_mut(&mut self, id: AllocId) -> Result<&mut Allocation> {
        self.entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(RuntimeError::UnknownAllocation(id))
    }

    /// Allocation covering `addr`, found by binary search.
    pub fn find_containing(&self, addr: usize) -> Option<&Allocation> {
        let at = self.entries.partition_point(|entry| entry.base <= addr);
        if at == 0 {
            return None;
        }
        let entry = &self.entries[at - 1];
        entry.contains(addr).then_some(entry)
    }

    /// Mutable variant of [`Self::find_containing`].
    pub fn find_containing_mut(&mut self, addr: usize) -> Option<&mut Allocation> {
        let at = self.entries.partition_point(|entry| entry.base <= addr);
        if at == 0 {
            return None;
        }
        let entry = &mut self.entries[at - 1];
        entry.contains(addr).then(move || entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Allocation> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Allocation> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(id: u64, base: usize, size: usize) -> Allocation {
        let layout = BlockLayout::new(size / 8, size, 4, 64).unwrap();
        let pages = layout.page_count();
        Allocation {
            id: AllocId(id),
            base,
            raw_base: base,
            raw_len: size,
            layout,
            valid: ValidityBitmap::new(pages),
        }
    }

    #[test]
    fn find_containing_hits_right_region() {
        let mut reg = Registry::new();
        reg.insert(alloc(2, 0x2000, 512));
        reg.insert(alloc(1, 0x1000, 512));
        reg.insert(alloc(3, 0x3000, 512));

        assert_eq!(reg.find_containing(0x1000).unwrap().id, AllocId(1));
        assert_eq!(reg.find_containing(0x21ff).unwrap().id, AllocId(2));
        assert_eq!(reg.find_containing(0x31ff).unwrap().id, AllocId(3));
        assert!(reg.find_containing(0x0fff).is_none());
        // Gap between regions.
        assert!(reg.find_containing(0x1200).is_none());
        // One past the end.
        assert!(reg.find_containing(0x3200).is_none());
    }

    #[test]
    fn insert_keeps_sorted_order() {
        let mut reg = Registry::new();
        reg.insert(alloc(1, 0x9000, 256));
        reg.insert(alloc(2, 0x1000, 256));
        reg.insert(alloc(3, 0x5000, 256));
        let bases: Vec<usize> = reg.iter().map(|a| a.base).collect();
        assert_eq!(bases, vec![0x1000, 0x5000, 0x9000]);
    }

    #[test]
    fn remove_unknown_id_errors() {
        let mut reg = Registry::new();
        reg.insert(alloc(1, 0x1000, 256));
        assert!(reg.remove(AllocId(9)).is_err());
        assert!(reg.remove(AllocId(1)).is_ok());
        assert!(reg.is_empty());
    }
}
