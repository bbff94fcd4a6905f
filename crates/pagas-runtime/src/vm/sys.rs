//! Linux virtual memory through `mmap`/`mprotect`/`mremap`.
//!
//! Reservations are `PROT_NONE` + `MAP_NORESERVE`, so an allocation can
//! cover far more address space than physical memory. Relocation uses
//! `MREMAP_MAYMOVE | MREMAP_FIXED`, which moves page table entries
//! without copying a byte; that is what makes installing a fetched frame
//! at its home address cheap.

use std::io;

use crate::error::{Result, RuntimeError};
use crate::vm::{Protection, VirtualMemory};

/// Real-page [`VirtualMemory`] for Linux.
pub struct SysMemory {
    page_size: usize,
}

impl SysMemory {
    pub fn new() -> Self {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        Self { page_size }
    }
}

impl Default for SysMemory {
    fn default() -> Self {
        Self::new()
    }
}

fn prot_flags(prot: Protection) -> libc::c_int {
    match prot {
        Protection::None => libc::PROT_NONE,
        Protection::Read => libc::PROT_READ,
        Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
    }
}

impl VirtualMemory for SysMemory {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn reserve(&self, len: usize) -> Result<usize> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_NONE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(RuntimeError::Reserve {
                len,
                source: io::Error::last_os_error(),
            });
        }
        Ok(ptr as usize)
    }

    fn reserve_at(&self, addr: usize, len: usize) -> Result<usize> {
        // MAP_FIXED would silently unmap whatever already lives there;
        // if the hint cannot be honored the mapping goes wherever the
        // kernel places it and the caller works with the returned base.
        let ptr = unsafe {
            libc::mmap(
                addr as *mut libc::c_void,
                len,
                libc::PROT_NONE,
                libc::MAP_ANONYMOUS
                    | libc::MAP_PRIVATE
                    | libc::MAP_NORESERVE
                    | libc::MAP_FIXED_NOREPLACE,
                -1,
                0,
            )
        };
        if ptr != libc::MAP_FAILED {
            return Ok(ptr as usize);
        }
        self.reserve(len)
    }

    fn protect(&self, addr: usize, len: usize, prot: Protection) -> Result<()> {
        let rc = unsafe { libc::mprotect(addr as *mut libc::c_void, len, prot_flags(prot)) };
        if rc != 0 {
            return Err(RuntimeError::Protect {
                addr,
                len,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn relocate(&self, src: usize, dst: usize, len: usize) -> Result<()> {
        let ptr = unsafe {
            libc::mremap(
                src as *mut libc::c_void,
                len,
                len,
                libc::MREMAP_MAYMOVE | libc::MREMAP_FIXED,
                dst as *mut libc::c_void,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(RuntimeError::Relocate {
                src,
                dst,
                len,
                source: io::Error::last_os_error(),
            });
        }
        // mremap leaves a hole at the source; re-reserve it so the
        // address can be protected and remapped over later.
        let hole = unsafe {
            libc::mmap(
                src as *mut libc::c_void,
                len,
                libc::PROT_NONE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_NORESERVE | libc::MAP_FIXED,
                -1,
                0,
            )
        };
        if hole == libc::MAP_FAILED {
            return Err(RuntimeError::Relocate {
                src,
                dst,
                len,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn release(&self, addr: usize, len: usize) -> Result<()> {
        let rc = unsafe { libc::munmap(addr as *mut libc::c_void, len) };
        if rc != 0 {
            return Err(RuntimeError::Release {
                addr,
                len,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_protect_release() {
        let vm = SysMemory::new();
        let len = vm.page_size() * 4;
        let base = vm.reserve(len).unwrap();
        vm.protect(base, vm.page_size(), Protection::ReadWrite).unwrap();
        unsafe { crate::vm::write_value::<u64>(base, 42) };
        assert_eq!(unsafe { crate::vm::read_value::<u64>(base) }, 42);
        vm.release(base, len).unwrap();
    }

    #[test]
    fn relocate_carries_contents() {
        let vm = SysMemory::new();
        let page = vm.page_size();
        let base = vm.reserve(page * 4).unwrap();
        vm.protect(base, page, Protection::ReadWrite).unwrap();
        unsafe { crate::vm::write_value::<u64>(base, 7) };
        vm.relocate(base, base + page * 2, page).unwrap();
        assert_eq!(unsafe { crate::vm::read_value::<u64>(base + page * 2) }, 7);
        // The vacated source is reserved again and can be reused.
        vm.protect(base, page, Protection::ReadWrite).unwrap();
        unsafe { crate::vm::write_value::<u64>(base, 9) };
        vm.release(base, page * 4).unwrap();
    }
}
