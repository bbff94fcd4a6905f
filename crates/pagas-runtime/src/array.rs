//! Typed view over a distributed region.
//!
//! A [`DistArray`] is a flat array of `T` distributed blockwise along
//! its leading dimension. Every rank sees the whole index space; reads
//! go through the checked accessors, which page foreign data in on
//! demand, and writes are restricted to the caller's owned block.
//!
//! For multi-dimensional data the leading extent is the first dimension
//! and `len / extent` elements ride along per leading index; ownership
//! and distribution only ever cut along the leading dimension.

use std::marker::PhantomData;
use std::mem::size_of;
use std::ops::Range;

use pagas_core::BlockLayout;
use pagas_transport::Transport;

use crate::error::{Result, RuntimeError};
use crate::registry::AllocId;
use crate::runtime::Runtime;
use crate::vm::{self, VirtualMemory};

/// Handle to one collectively allocated distributed array.
///
/// The handle is plain data (no drop glue); the region it names lives
/// until [`Runtime::free_array`] or finalize.
#[derive(Debug, Clone, Copy)]
pub struct DistArray<T: Copy> {
    id: AllocId,
    base: usize,
    layout: BlockLayout,
    extent: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<Tr: Transport, M: VirtualMemory> Runtime<Tr, M> {
    /// Collectively allocate a distributed array of `len` elements whose
    /// leading dimension has `extent` entries. Every rank must call with
    /// the same arguments.
    pub fn allocate_array<T: Copy>(&self, extent: usize, len: usize) -> Result<DistArray<T>> {
        let size = len * size_of::<T>();
        let (id, base) = self.allocate_region(extent, size)?;
        let layout = self.layout_of(id)?;
        Ok(DistArray {
            id,
            base,
            layout,
            extent,
            len,
            _marker: PhantomData,
        })
    }

    /// Collectively release an array.
    pub fn free_array<T: Copy>(&self, array: DistArray<T>) -> Result<()> {
        self.free_region(array.id)
    }
}

impl<T: Copy> DistArray<T> {
    pub fn id(&self) -> AllocId {
        self.id
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Extent of the distributed leading dimension.
    pub fn extent(&self) -> usize {
        self.extent
    }

    /// Elements per leading index.
    fn row(&self) -> usize {
        self.len / self.extent
    }

    fn addr_of(&self, index: usize) -> usize {
        self.base + index * size_of::<T>()
    }

    /// Raw pointer to one element.
    ///
    /// Dereferencing it is only sound where the element is already
    /// resident, or on Linux with
    /// [`Runtime::install_fault_handler`](crate::Runtime::install_fault_handler)
    /// active, which pages foreign data in on the hardware fault.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn as_ptr(&self, index: usize) -> *const T {
        assert!(index < self.len, "index {index} out of bounds ({})", self.len);
        self.addr_of(index) as *const T
    }

    /// First leading index owned by `rank`.
    pub fn start_at(&self, rank: u32) -> usize {
        self.layout.start(rank)
    }

    /// One past the last leading index owned by `rank`.
    pub fn end_at(&self, rank: u32) -> usize {
        self.layout.end(rank)
    }

    /// First leading index owned by the calling rank.
    pub fn start<Tr: Transport, M: VirtualMemory>(&self, rt: &Runtime<Tr, M>) -> usize {
        self.start_at(rt.rank())
    }

    /// One past the last leading index owned by the calling rank.
    pub fn end<Tr: Transport, M: VirtualMemory>(&self, rt: &Runtime<Tr, M>) -> usize {
        self.end_at(rt.rank())
    }

    /// Element index range owned by the calling rank.
    pub fn owned_elems<Tr: Transport, M: VirtualMemory>(&self, rt: &Runtime<Tr, M>) -> Range<usize> {
        self.start(rt) * self.row()..self.end(rt) * self.row()
    }

    /// Read one element, paging its data in if a peer owns it.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn read<Tr: Transport, M: VirtualMemory>(
        &self,
        rt: &Runtime<Tr, M>,
        index: usize,
    ) -> Result<T> {
        assert!(index < self.len, "index {index} out of bounds ({})", self.len);
        let addr = self.addr_of(index);
        rt.ensure_readable(addr, size_of::<T>())?;
        Ok(unsafe { vm::read_value(addr) })
    }

    /// Read a contiguous element range into a vector, paging missing
    /// data in with at most one fetch per page.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn read_range<Tr: Transport, M: VirtualMemory>(
        &self,
        rt: &Runtime<Tr, M>,
        range: Range<usize>,
    ) -> Result<Vec<T>> {
        assert!(range.end <= self.len, "range end {} out of bounds ({})", range.end, self.len);
        let count = range.end.saturating_sub(range.start);
        let mut out = Vec::with_capacity(count);
        if count == 0 {
            return Ok(out);
        }
        let addr = self.addr_of(range.start);
        rt.ensure_readable(addr, count * size_of::<T>())?;
        for i in 0..count {
            out.push(unsafe { vm::read_value(addr + i * size_of::<T>()) });
        }
        Ok(out)
    }

    /// Write one element of this rank's owned block. Writing outside
    /// the owned block is fatal; peers own that data.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn write<Tr: Transport, M: VirtualMemory>(
        &self,
        rt: &Runtime<Tr, M>,
        index: usize,
        value: T,
    ) -> Result<()> {
        assert!(index < self.len, "index {index} out of bounds ({})", self.len);
        let owned = self.owned_elems(rt);
        if !owned.contains(&index) {
            return rt.fatal(Err(RuntimeError::ForeignWrite {
                index,
                start: owned.start,
                end: owned.end,
            }));
        }
        unsafe { vm::write_value(self.addr_of(index), value) };
        Ok(())
    }

    /// Fill this rank's owned block, `value = f(element index)`.
    pub fn fill_owned<Tr: Transport, M: VirtualMemory>(
        &self,
        rt: &Runtime<Tr, M>,
        f: impl Fn(usize) -> T,
    ) -> Result<()> {
        for index in self.owned_elems(rt) {
            self.write(rt, index, f(index))?;
        }
        Ok(())
    }

    /// Start pulling an element range from its owners ahead of use.
    pub fn prefetch<Tr: Transport, M: VirtualMemory>(
        &self,
        rt: &Runtime<Tr, M>,
        range: Range<usize>,
    ) -> Result<()> {
        let count = range.end.saturating_sub(range.start);
        rt.prefetch(self.addr_of(range.start), count * size_of::<T>())
    }

    /// Release prefetched data covering an element range.
    pub fn discard<Tr: Transport, M: VirtualMemory>(
        &self,
        rt: &Runtime<Tr, M>,
        range: Range<usize>,
    ) -> Result<()> {
        let count = range.end.saturating_sub(range.start);
        rt.discard(self.addr_of(range.start), count * size_of::<T>())
    }

    /// Collectively drop every remote copy of this array, for reuse
    /// between phases.
    pub fn invalidate<Tr: Transport, M: VirtualMemory>(&self, rt: &Runtime<Tr, M>) -> Result<()> {
        rt.invalidate(self.id)
    }

    /// Slice over this rank's owned elements.
    ///
    /// # Safety
    ///
    /// The caller must not hold an [`Self::owned_slice_mut`] over the
    /// same block and must not let the slice outlive the allocation.
    pub unsafe fn owned_slice<Tr: Transport, M: VirtualMemory>(
        &self,
        rt: &Runtime<Tr, M>,
    ) -> &[T] {
        let owned = self.owned_elems(rt);
        std::slice::from_raw_parts(self.addr_of(owned.start) as *const T, owned.end - owned.start)
    }

    /// Mutable slice over this rank's owned elements, for kernels that
    /// write their block in bulk.
    ///
    /// # Safety
    ///
    /// The caller must not hold any other reference into the array and
    /// must not let the slice outlive the allocation.
    pub unsafe fn owned_slice_mut<Tr: Transport, M: VirtualMemory>(
        &self,
        rt: &Runtime<Tr, M>,
    ) -> &mut [T] {
        let owned = self.owned_elems(rt);
        std::slice::from_raw_parts_mut(
            self.addr_of(owned.start) as *mut T,
            owned.end - owned.start,
        )
    }
}
