//! Virtual-memory seam.
//!
//! Every raw reservation, protection change, relocation, and release in the
//! runtime goes through the [`VirtualMemory`] trait. Above this seam the
//! cache and fault logic deal only in page and frame identifiers, so they
//! are unit-testable without touching real protection bits.
//!
//! Two implementations:
//! - [`SysMemory`] (Linux): real `mmap`/`mprotect`/`mremap`, plus the
//!   SIGSEGV bridge in [`sigsegv`]. A frame relocation is a true remap; no
//!   bytes are copied.
//! - [`HeapMemory`]: anonymous `memmap2` regions with protections tracked
//!   in a table and relocation by copy. Tests and single-process runs use
//!   this one; accidental access is caught by the checked accessors rather
//!   than by hardware.

pub mod heap;
#[cfg(target_os = "linux")]
pub mod sigsegv;
#[cfg(target_os = "linux")]
pub mod sys;

pub use heap::HeapMemory;
#[cfg(target_os = "linux")]
pub use sys::SysMemory;

use crate::error::Result;

/// Page protection modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// No access: any touch raises an access violation.
    None,
    /// Read-only: foreign pages resident in the cache.
    Read,
    /// Read-write: owned pages and the frame pool.
    ReadWrite,
}

/// Capability for reserving, protecting, and relocating address space.
///
/// Addresses are plain integers on both sides of the seam; only the
/// implementations turn them back into pointers.
pub trait VirtualMemory: Send + Sync {
    /// System page granularity in bytes.
    fn page_size(&self) -> usize;

    /// Reserve `len` bytes of page-aligned address space with no access.
    fn reserve(&self, len: usize) -> Result<usize>;

    /// Reserve `len` bytes at a fixed address, as broadcast by rank 0, so
    /// every rank maps the same virtual range. Returns the actual base,
    /// which implementations without a shared address space (the heap VM
    /// inside one process) may place elsewhere.
    fn reserve_at(&self, addr: usize, len: usize) -> Result<usize>;

    /// Change the protection of `[addr, addr + len)`.
    fn protect(&self, addr: usize, len: usize, prot: Protection) -> Result<()>;

    /// Move the mapping backing `[src, src + len)` to `dst`. After the
    /// call `dst` carries the contents and `src` reverts to a reserved,
    /// no-access range, so it can be protected and reused later.
    fn relocate(&self, src: usize, dst: usize, len: usize) -> Result<()>;

    /// Release a reservation made by `reserve`/`reserve_at`.
    fn release(&self, addr: usize, len: usize) -> Result<()>;
}

/// Copy `src` into mapped memory at `addr`.
///
/// # Safety
///
/// `[addr, addr + src.len())` must lie inside a region the caller mapped
/// writable through a [`VirtualMemory`] implementation.
pub(crate) unsafe fn write_bytes(addr: usize, src: &[u8]) {
    std::ptr::copy_nonoverlapping(src.as_ptr(), addr as *mut u8, src.len());
}

/// Read one `T` from mapped memory at `addr` (possibly unaligned).
///
/// # Safety
///
/// `[addr, addr + size_of::<T>())` must lie inside a mapped, readable
/// region holding a valid bit pattern for `T`.
pub(crate) unsafe fn read_value<T: Copy>(addr: usize) -> T {
    std::ptr::read_unaligned(addr as *const T)
}

/// Write one `T` to mapped memory at `addr` (possibly unaligned).
///
/// # Safety
///
/// `[addr, addr + size_of::<T>())` must lie inside a region mapped
/// writable.
pub(crate) unsafe fn write_value<T: Copy>(addr: usize, value: T) {
    std::ptr::write_unaligned(addr as *mut T, value);
}
