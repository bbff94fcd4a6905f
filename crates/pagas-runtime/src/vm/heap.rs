//! Process-local virtual memory backed by anonymous mappings.
//!
//! `HeapMemory` keeps every reservation readable and writable at the OS
//! level and tracks the logical protection of each page in a table
//! instead. Relocation copies bytes rather than remapping. That makes it
//! usable on any platform and, with [`HeapMemory::with_page_size`], lets
//! tests run the whole paging machinery on tiny pages where a single
//! allocation spans many of them.
//!
//! Accesses that the runtime would reject are caught by the checked
//! accessors consulting the cache state, not by hardware, so a stray raw
//! pointer dereference into a logically-unmapped page is not trapped here.

use std::collections::HashMap;

use memmap2::MmapMut;
use parking_lot::Mutex;

use crate::error::{Result, RuntimeError};
use crate::vm::{Protection, VirtualMemory};

struct Region {
    // Held only to keep the mapping alive; the aligned base is derived
    // from it once at reservation time.
    _map: MmapMut,
    len: usize,
}

/// Heap-backed [`VirtualMemory`] with emulated protections.
pub struct HeapMemory {
    page_size: usize,
    regions: Mutex<HashMap<usize, Region>>,
    protections: Mutex<HashMap<usize, Protection>>,
}

impl HeapMemory {
    /// System-page-sized instance, matching what [`super::SysMemory`]
    /// would report.
    pub fn new() -> Self {
        Self::with_page_size(page_size_hint())
    }

    /// Instance with an explicit logical page size. Must be a power of
    /// two. Small values (64, 256) keep test allocations multi-page.
    pub fn with_page_size(page_size: usize) -> Self {
        assert!(page_size.is_power_of_two(), "page size must be a power of two");
        Self {
            page_size,
            regions: Mutex::new(HashMap::new()),
            protections: Mutex::new(HashMap::new()),
        }
    }

    /// Logical protection of the page containing `addr`, if reserved.
    pub fn protection_of(&self, addr: usize) -> Option<Protection> {
        let page = addr & !(self.page_size - 1);
        self.protections.lock().get(&page).copied()
    }

    fn set_range(&self, addr: usize, len: usize, prot: Protection) {
        let mut table = self.protections.lock();
        let mut page = addr & !(self.page_size - 1);
        let end = addr + len;
        while page < end {
            table.insert(page, prot);
            page += self.page_size;
        }
    }

    fn round_up(&self, len: usize) -> usize {
        (len + self.page_size - 1) & !(self.page_size - 1)
    }
}

impl Default for HeapMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMemory for HeapMemory {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn reserve(&self, len: usize) -> Result<usize> {
        let len = self.round_up(len.max(self.page_size));
        // Over-allocate one page so the logical base can be aligned even
        // when the logical page is larger than the system page.
        let map = MmapMut::map_anon(len + self.page_size)
            .map_err(|source| RuntimeError::Reserve { len, source })?;
        let raw = map.as_ptr() as usize;
        let base = (raw + self.page_size - 1) & !(self.page_size - 1);
        self.regions.lock().insert(base, Region { _map: map, len });
        self.set_range(base, len, Protection::None);
        Ok(base)
    }

    fn reserve_at(&self, _addr: usize, len: usize) -> Result<usize> {
        // One process, one address space: the broadcast hint is
        // meaningless here, so place the region wherever it lands.
        self.reserve(len)
    }

    fn protect(&self, addr: usize, len: usize, prot: Protection) -> Result<()> {
        self.set_range(addr, len, prot);
        Ok(())
    }

    fn relocate(&self, src: usize, dst: usize, len: usize) -> Result<()> {
        // A real remap carries the contents and leaves the source
        // unmapped; emulate with a copy and a protection transfer.
        unsafe {
            std::ptr::copy(src as *const u8, dst as *mut u8, len);
        }
        let prot = self.protection_of(src).unwrap_or(Protection::None);
        self.set_range(dst, len, prot);
        self.set_range(src, len, Protection::None);
        Ok(())
    }

    fn release(&self, addr: usize, _len: usize) -> Result<()> {
        let region = self.regions.lock().remove(&addr);
        match region {
            Some(region) => {
                let mut table = self.protections.lock();
                let mut page = addr;
                while page < addr + region.len {
                    table.remove(&page);
                    page += self.page_size;
                }
                Ok(())
            }
            None => Err(RuntimeError::UnknownAddress { addr }),
        }
    }
}

fn page_size_hint() -> usize {
    #[cfg(unix)]
    {
        let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if n > 0 {
            return n as usize;
        }
    }
    4096
}
