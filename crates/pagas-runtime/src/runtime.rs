//! Runtime driver.
//!
//! [`Runtime`] owns the frame pool, the allocation registry, the frame
//! cache, and the explicit prefetch queue, and executes the pure plans
//! produced by [`crate::fault`], [`crate::prefetch`], and
//! [`crate::sync_protocol`] against the transport and the virtual-memory
//! seam. One mutex guards the whole engine state; transfers performed
//! under it are one-sided, so no peer interaction can deadlock against
//! the lock.
//!
//! Every public operation is fatal on error: the failure is logged, the
//! job is collectively aborted so no peer hangs at a barrier, and the
//! error is returned to the caller.

use std::sync::Arc;

use parking_lot::Mutex;
use pagas_core::BlockLayout;
use pagas_transport::{SegmentId, Transport};
use tracing::{debug, error, info};

use crate::cache::{FrameCache, PendingPrefetch};
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::fault::{self, FetchSource};
use crate::prefetch::{plan_prefetch, PrefetchEntry, PrefetchQueue};
use crate::registry::{AllocId, Allocation, Registry};
use crate::stats::{RuntimeStats, StatsInternal};
use crate::sync_protocol::boundary_transfers;
use crate::vm::{self, Protection, VirtualMemory};
use crate::worker;

struct Inner {
    registry: Registry,
    cache: FrameCache,
    queue: PrefetchQueue,
    next_alloc: u64,
}

/// One rank's view of the partitioned global address space.
pub struct Runtime<T: Transport, M: VirtualMemory> {
    transport: T,
    vm: M,
    config: RuntimeConfig,
    /// Logical page size: system page times the configured multiplier.
    page_size: usize,
    pool_base: usize,
    pool_raw: (usize, usize),
    frame_count: usize,
    inner: Mutex<Inner>,
    stats: StatsInternal,
}

impl<T: Transport, M: VirtualMemory> Runtime<T, M> {
    /// Bring up this rank's runtime: fix the logical page size, reserve
    /// the frame pool, and wait for every peer to do the same.
    pub fn init(transport: T, vm: M, config: RuntimeConfig) -> Result<Arc<Self>> {
        let page_size = vm.page_size() * config.page_multiplier;
        let frame_count = (config.cache_budget_bytes / page_size).max(1);

        let raw_len = frame_count * page_size + page_size;
        let raw = vm.reserve(raw_len)?;
        let pool_base = round_up(raw, page_size);

        info!(
            rank = transport.rank(),
            size = transport.size(),
            page_size,
            frame_count,
            "runtime initialized"
        );

        let runtime = Arc::new(Self {
            transport,
            vm,
            page_size,
            pool_base,
            pool_raw: (raw, raw_len),
            frame_count,
            inner: Mutex::new(Inner {
                registry: Registry::new(),
                cache: FrameCache::new(frame_count),
                queue: PrefetchQueue::new(config.queue_capacity),
                next_alloc: 1,
            }),
            stats: StatsInternal::default(),
            config,
        });
        runtime.barrier()?;
        Ok(runtime)
    }

    pub fn rank(&self) -> u32 {
        self.transport.rank()
    }

    pub fn size(&self) -> u32 {
        self.transport.size()
    }

    /// Whether this rank should produce job-level output. Exactly one
    /// rank answers true.
    pub fn is_output_rank(&self) -> bool {
        self.transport.rank() == 0
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Logical page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats.snapshot()
    }

    /// Log this rank's counters.
    pub fn report(&self) {
        let s = self.stats.snapshot();
        info!(
            rank = self.transport.rank(),
            faults = s.faults,
            prefetch_hits = s.prefetch_hits,
            evictions = s.evictions,
            barriers = s.barriers,
            bytes_fetched = s.bytes_fetched,
            bytes_prefetched = s.bytes_prefetched,
            "runtime counters"
        );
    }

    pub(crate) fn fatal<V>(&self, result: Result<V>) -> Result<V> {
        if let Err(err) = &result {
            error!(rank = self.transport.rank(), error = %err, "fatal runtime failure, aborting job");
            self.transport.abort(1);
        }
        result
    }

    fn barrier(&self) -> Result<()> {
        self.transport.barrier()?;
        self.stats.record_barrier();
        Ok(())
    }

    /// Collectively create a distributed region of `size` bytes whose
    /// leading dimension has `extent` entries. Returns the id and the
    /// local base address. Every rank must call with the same arguments.
    pub fn allocate_region(&self, extent: usize, size: usize) -> Result<(AllocId, usize)> {
        let result = self.allocate_region_inner(extent, size);
        self.fatal(result)
    }

    fn allocate_region_inner(&self, extent: usize, size: usize) -> Result<(AllocId, usize)> {
        // Allocation is collective; diverging arguments would produce
        // diverging layouts and silent corruption, so they are fatal.
        let mut mine = [0u8; 16];
        mine[..8].copy_from_slice(&(extent as u64).to_le_bytes());
        mine[8..].copy_from_slice(&(size as u64).to_le_bytes());
        let mut all = vec![0u8; 16 * self.transport.size() as usize];
        self.transport.gather_all(&mine, &mut all)?;
        if !all.chunks_exact(16).all(|chunk| chunk == mine.as_slice()) {
            return Err(RuntimeError::CollectiveMismatch { extent, size });
        }

        let layout = BlockLayout::new(extent, size, self.transport.size(), self.page_size)?;
        let padded = layout.page_count() * self.page_size;
        let raw_len = padded + self.page_size;

        // Rank 0 picks the placement and broadcasts it so the region
        // sits at the same virtual address on every rank. Address-space
        // layouts that cannot honor the hint return their own base; the
        // transport names memory by (rank, segment, offset), so that
        // only costs pointer portability, not correctness.
        let mut addr_buf = [0u8; 8];
        let raw_base = if self.transport.rank() == 0 {
            let raw = self.vm.reserve(raw_len)?;
            addr_buf = (raw as u64).to_le_bytes();
            self.transport.broadcast(&mut addr_buf, 0)?;
            raw
        } else {
            self.transport.broadcast(&mut addr_buf, 0)?;
            let hint = u64::from_le_bytes(addr_buf) as usize;
            self.vm.reserve_at(hint, raw_len)?
        };
        let base = round_up(raw_base, self.page_size);

        // Owned pages, boundary pages included, are mapped read-write
        // for the lifetime of the allocation.
        let span = layout.owned_pages(self.transport.rank());
        self.vm.protect(
            base + span.start * self.page_size,
            span.len() * self.page_size,
            Protection::ReadWrite,
        )?;

        let mut inner = self.inner.lock();
        let id = AllocId(inner.next_alloc);
        inner.next_alloc += 1;

        unsafe {
            self.transport
                .export_segment(SegmentId(id.0), base as *mut u8, size)?;
        }

        let mut valid = pagas_core::ValidityBitmap::new(layout.page_count());
        valid.set_range(span.start, span.end);
        inner.registry.insert(Allocation {
            id,
            base,
            raw_base,
            raw_len,
            layout,
            valid,
        });
        drop(inner);

        debug!(rank = self.transport.rank(), %id, extent, size, base = %format_args!("{base:#x}"), "region allocated");

        // Peers must observe the export before any of them can fault a
        // page in.
        self.barrier()?;
        Ok((id, base))
    }

    /// Collectively release a region. Cached pages and outstanding
    /// prefetches into it are dropped first.
    pub fn free_region(&self, id: AllocId) -> Result<()> {
        let result = self.free_region_inner(id);
        self.fatal(result)
    }

    fn free_region_inner(&self, id: AllocId) -> Result<()> {
        // No peer may still be reading our block.
        self.barrier()?;

        let mut inner = self.inner.lock();
        let plan = inner.cache.drop_allocation(id);
        for (frame, alloc, page) in plan.occupied {
            let addr = inner.registry.get(alloc)?.page_addr(page);
            self.vm.relocate(addr, self.frame_home(frame), self.page_size)?;
        }
        if let Some(pending) = plan.pending {
            self.drain_pending(&inner.registry, pending)?;
        }
        for idx in inner.queue.of_allocation(id) {
            let entry = inner.queue.remove(idx);
            if let Some(handle) = entry.handle {
                let mut scratch = vec![0u8; entry.len];
                self.transport.wait_into(handle, &mut scratch)?;
            }
        }

        let alloc = inner.registry.remove(id)?;
        self.transport.unexport_segment(SegmentId(id.0))?;
        self.vm.release(alloc.raw_base, alloc.raw_len)?;
        debug!(rank = self.transport.rank(), %id, "region freed");
        Ok(())
    }

    /// Synchronization point: writes made by every rank to its own block
    /// before the call are visible to reads on every rank after it.
    ///
    /// All remote copies are dropped (cache reset, prefetch queue
    /// drained) and the foreign halves of shared boundary pages are
    /// re-read from their owners.
    pub fn sync(&self) -> Result<()> {
        let result = self.sync_inner();
        self.fatal(result)
    }

    fn sync_inner(&self) -> Result<()> {
        // Every rank finishes its writes before anyone re-reads.
        self.barrier()?;

        let mut inner = self.inner.lock();

        let plan = inner.cache.reset();
        for (frame, alloc, page) in plan.occupied {
            let allocation = inner.registry.get_mut(alloc)?;
            allocation.valid.clear_range(page, page + 1);
            let addr = allocation.page_addr(page);
            self.vm.relocate(addr, self.frame_home(frame), self.page_size)?;
        }
        if let Some(pending) = plan.pending {
            self.drain_pending(&inner.registry, pending)?;
        }

        for entry in inner.queue.drain_all() {
            if let Some(handle) = entry.handle {
                let mut scratch = vec![0u8; entry.len];
                self.transport.wait_into(handle, &mut scratch)?;
            } else {
                // Materialized pages are stale after the barrier; unmap
                // them so the next touch refetches.
                let allocation = inner.registry.get_mut(entry.alloc)?;
                allocation
                    .valid
                    .clear_range(entry.pages.start, entry.pages.end);
                self.vm.protect(
                    allocation.page_addr(entry.pages.start),
                    entry.pages.len() * self.page_size,
                    Protection::None,
                )?;
            }
        }

        // Shared boundary pages stay writable on both neighbours; patch
        // in the neighbour's half so the local copy is current.
        let rank = self.transport.rank();
        let mut patches = Vec::new();
        for alloc in inner.registry.iter() {
            for fetch in boundary_transfers(&alloc.layout, rank) {
                patches.push((alloc.id, alloc.base, fetch));
            }
        }
        for (id, base, fetch) in patches {
            let mut buf = vec![0u8; fetch.len];
            self.transport
                .get(&mut buf, fetch.owner, SegmentId(id.0), fetch.offset)?;
            self.stats.record_fetched(fetch.len);
            unsafe { vm::write_bytes(base + fetch.offset, &buf) };
        }
        drop(inner);

        self.barrier()?;
        debug!(rank, "sync complete");
        Ok(())
    }

    /// Collectively drop every remote copy of one region: cached pages,
    /// in-flight and materialized prefetches. Used when a region is
    /// about to be rewritten wholesale between phases; reads afterwards
    /// refetch current owner data.
    pub fn invalidate(&self, id: AllocId) -> Result<()> {
        let result = self.invalidate_inner(id);
        self.fatal(result)
    }

    fn invalidate_inner(&self, id: AllocId) -> Result<()> {
        self.barrier()?;

        let mut inner = self.inner.lock();
        let plan = inner.cache.drop_allocation(id);
        for (frame, alloc, page) in plan.occupied {
            let allocation = inner.registry.get_mut(alloc)?;
            allocation.valid.clear_range(page, page + 1);
            let addr = allocation.page_addr(page);
            self.vm.relocate(addr, self.frame_home(frame), self.page_size)?;
        }
        if let Some(pending) = plan.pending {
            self.drain_pending(&inner.registry, pending)?;
        }
        for idx in inner.queue.of_allocation(id) {
            let entry = inner.queue.remove(idx);
            match entry.handle {
                Some(handle) => {
                    let mut scratch = vec![0u8; entry.len];
                    self.transport.wait_into(handle, &mut scratch)?;
                }
                None => {
                    let allocation = inner.registry.get_mut(id)?;
                    allocation
                        .valid
                        .clear_range(entry.pages.start, entry.pages.end);
                    self.vm.protect(
                        allocation.page_addr(entry.pages.start),
                        entry.pages.len() * self.page_size,
                        Protection::None,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Begin pulling `[addr, addr + len)` from its owners ahead of use.
    /// The range is rounded outward to pages, clipped to its allocation,
    /// and fetched with one non-blocking read per owner.
    pub fn prefetch(&self, addr: usize, len: usize) -> Result<()> {
        let result = self.prefetch_inner(addr, len);
        self.fatal(result)
    }

    fn prefetch_inner(&self, addr: usize, len: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let alloc = inner
            .registry
            .find_containing(addr)
            .ok_or(RuntimeError::UnknownAddress { addr })?;
        let (id, layout) = (alloc.id, alloc.layout);
        let offset = addr - alloc.base;

        for piece in plan_prefetch(&layout, self.transport.rank(), offset, len) {
            // An earlier overlapping request wins; this piece is skipped.
            if !inner
                .queue
                .overlapping(id, piece.pages.start, piece.pages.end)
                .is_empty()
            {
                continue;
            }

            // Pages already resident in the cache would end up doubly
            // mapped once the entry materializes; drop them first.
            for page in piece.pages.start..piece.pages.end {
                if let Some(frame) = inner.cache.evict_page(id, page) {
                    let allocation = inner.registry.get_mut(id)?;
                    allocation.valid.clear_range(page, page + 1);
                    let page_addr = allocation.page_addr(page);
                    self.vm
                        .relocate(page_addr, self.frame_home(frame), self.page_size)?;
                }
            }

            let handle =
                self.transport
                    .get_begin(piece.owner, SegmentId(id.0), piece.offset, piece.len)?;
            self.stats.record_prefetched(piece.len);
            inner.queue.insert(PrefetchEntry {
                alloc: id,
                pages: piece.pages,
                owner: piece.owner,
                offset: piece.offset,
                len: piece.len,
                handle: Some(handle),
            });
        }
        Ok(())
    }

    /// Release prefetched data covering `[addr, addr + len)`. The
    /// covered pages become refetchable; in-flight transfers are drained
    /// and dropped.
    pub fn discard(&self, addr: usize, len: usize) -> Result<()> {
        let result = self.discard_inner(addr, len);
        self.fatal(result)
    }

    fn discard_inner(&self, addr: usize, len: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let alloc = inner
            .registry
            .find_containing(addr)
            .ok_or(RuntimeError::UnknownAddress { addr })?;
        let (id, base, layout) = (alloc.id, alloc.base, alloc.layout);
        let offset = addr - alloc.base;
        let end = (offset + len).min(layout.size());
        if len == 0 {
            return Ok(());
        }
        let first_page = layout.page_of(offset);
        let last_page = layout.page_of(end - 1) + 1;

        for idx in inner.queue.overlapping(id, first_page, last_page) {
            let entry = inner.queue.remove(idx);
            match entry.handle {
                Some(handle) => {
                    let mut scratch = vec![0u8; entry.len];
                    self.transport.wait_into(handle, &mut scratch)?;
                }
                None => {
                    let allocation = inner.registry.get_mut(id)?;
                    allocation
                        .valid
                        .clear_range(entry.pages.start, entry.pages.end);
                    self.vm.protect(
                        base + entry.pages.start * self.page_size,
                        entry.pages.len() * self.page_size,
                        Protection::None,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Make `[addr, addr + len)` locally readable, fetching any missing
    /// pages. This is the software path of get-on-fault, used by the
    /// checked accessors; on Linux the signal handler funnels hardware
    /// faults into the same resolution.
    pub fn ensure_readable(&self, addr: usize, len: usize) -> Result<()> {
        let result = self.ensure_readable_inner(addr, len);
        self.fatal(result)
    }

    fn ensure_readable_inner(&self, addr: usize, len: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let alloc = inner
            .registry
            .find_containing(addr)
            .ok_or(RuntimeError::UnknownAddress { addr })?;
        let (id, layout) = (alloc.id, alloc.layout);
        let offset = addr - alloc.base;
        let end = (offset + len.max(1)).min(layout.size());
        let end_page = layout.page_of(end - 1);

        let mut page = layout.page_of(offset);
        while page <= end_page {
            let valid_run = inner.registry.get(id)?.valid.valid_run(page);
            if !valid_run.is_empty() {
                page = valid_run.end;
                continue;
            }
            self.service_page(&mut inner, id, page)?;
            page += 1;
        }
        Ok(())
    }

    /// Resolve one invalid page: an outstanding explicit prefetch
    /// covering it wins; otherwise the fault engine picks a frame and an
    /// owner.
    fn service_page(&self, inner: &mut Inner, id: AllocId, page: usize) -> Result<()> {
        if let Some(idx) = inner.queue.find_covering(id, page) {
            return self.materialize_entry(inner, id, idx);
        }

        let addr = {
            let alloc = inner.registry.get(id)?;
            alloc.page_addr(page)
        };
        let plan = fault::resolve_fault(&inner.registry, &mut inner.cache, self.transport.rank(), addr)?;

        if let Some((evicted_alloc, evicted_page)) = plan.evict {
            self.stats.record_eviction();
            let allocation = inner.registry.get_mut(evicted_alloc)?;
            allocation.valid.clear_range(evicted_page, evicted_page + 1);
            let evicted_addr = allocation.page_addr(evicted_page);
            self.vm
                .relocate(evicted_addr, self.frame_home(plan.frame), self.page_size)?;
        }
        if let Some(pending) = plan.drain {
            // Frame reuse: the stale transfer lands in scratch and is
            // dropped.
            let len = inner.registry.get(pending.alloc)?.layout.page_len(pending.page);
            let mut scratch = vec![0u8; len];
            self.transport.wait_into(pending.handle, &mut scratch)?;
        }

        let mut buf = vec![0u8; plan.len];
        match plan.source {
            FetchSource::Pending(handle) => {
                self.transport.wait_into(handle, &mut buf)?;
                self.stats.record_prefetch_hit();
            }
            FetchSource::Remote => {
                self.transport
                    .get(&mut buf, plan.owner, SegmentId(id.0), plan.offset)?;
            }
        }
        self.stats.record_fault();
        self.stats.record_fetched(plan.len);

        // Stage the page in its frame's home slot, then remap the frame
        // over the hole at the page's address.
        let home = self.frame_home(plan.frame);
        let page_addr = {
            let alloc = inner.registry.get(id)?;
            alloc.page_addr(plan.page)
        };
        self.vm.protect(home, self.page_size, Protection::ReadWrite)?;
        unsafe { vm::write_bytes(home, &buf) };
        self.vm.relocate(home, page_addr, self.page_size)?;
        self.vm.protect(page_addr, self.page_size, Protection::Read)?;
        inner
            .registry
            .get_mut(id)?
            .valid
            .set_range(plan.page, plan.page + 1);

        if let Some(intent) = plan.prefetch {
            if let Some((evicted_alloc, evicted_page)) = intent.evict {
                self.stats.record_eviction();
                let allocation = inner.registry.get_mut(evicted_alloc)?;
                allocation.valid.clear_range(evicted_page, evicted_page + 1);
                let evicted_addr = allocation.page_addr(evicted_page);
                self.vm
                    .relocate(evicted_addr, self.frame_home(intent.frame), self.page_size)?;
            }
            match self
                .transport
                .get_begin(intent.owner, SegmentId(intent.alloc.0), intent.offset, intent.len)
            {
                Ok(handle) => {
                    inner
                        .cache
                        .commit_prefetch(intent.frame, intent.alloc, intent.page, handle);
                }
                Err(err) => {
                    inner.cache.cancel_prefetch(intent.frame);
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    /// Complete an explicit prefetch entry: wait for its transfer and
    /// map all covered pages readable. The entry stays queued (handle
    /// cleared) until `discard` or the next sync releases it.
    fn materialize_entry(&self, inner: &mut Inner, id: AllocId, idx: usize) -> Result<()> {
        let (handle, pages, offset, len) = {
            let entry = inner
                .queue
                .get(idx)
                .ok_or(RuntimeError::UnknownAllocation(id))?;
            (entry.handle, entry.pages, entry.offset, entry.len)
        };
        let handle = match handle {
            Some(handle) => handle,
            // Covered pages of a materialized entry are already valid.
            None => return Ok(()),
        };

        let mut buf = vec![0u8; len];
        self.transport.wait_into(handle, &mut buf)?;
        self.stats.record_fetched(len);
        self.stats.record_prefetch_hit();

        let base = inner.registry.get(id)?.base;
        let span_addr = base + pages.start * self.page_size;
        self.vm
            .protect(span_addr, pages.len() * self.page_size, Protection::ReadWrite)?;
        unsafe { vm::write_bytes(base + offset, &buf) };
        self.vm
            .protect(span_addr, pages.len() * self.page_size, Protection::Read)?;
        inner
            .registry
            .get_mut(id)?
            .valid
            .set_range(pages.start, pages.end);
        if let Some(entry) = inner.queue.get_mut(idx) {
            entry.handle = None;
        }
        Ok(())
    }

    /// Fan `body` out over `[start, end)` with this rank's worker
    /// threads; each invocation receives one contiguous chunk.
    pub fn run_worker<F>(&self, start: usize, end: usize, body: F)
    where
        F: Fn(usize, usize) + Sync,
    {
        worker::run_chunks(start, end, self.config.effective_workers(), body);
    }

    /// Collective teardown: free every remaining region, release the
    /// frame pool, and report counters if configured. A nonzero
    /// `exit_code` marks the job failed: peers are aborted with that
    /// code instead of being waited for, since a failing rank cannot
    /// assume anyone still reaches the teardown collectives.
    pub fn finalize(&self, exit_code: i32) -> Result<()> {
        if exit_code != 0 {
            error!(
                rank = self.transport.rank(),
                exit_code, "finalizing after failure, aborting peers"
            );
            self.transport.abort(exit_code);
            self.vm.release(self.pool_raw.0, self.pool_raw.1)?;
            return Ok(());
        }
        let result = self.finalize_inner();
        self.fatal(result)
    }

    fn finalize_inner(&self) -> Result<()> {
        let ids: Vec<AllocId> = {
            let inner = self.inner.lock();
            inner.registry.iter().map(|alloc| alloc.id).collect()
        };
        for id in ids {
            self.free_region_inner(id)?;
        }
        self.barrier()?;
        if self.config.report_on_finalize {
            self.report();
        }
        self.vm.release(self.pool_raw.0, self.pool_raw.1)?;
        info!(rank = self.transport.rank(), "runtime finalized");
        Ok(())
    }

    fn frame_home(&self, frame: usize) -> usize {
        self.pool_base + frame * self.page_size
    }

    /// Number of frames in the cache pool.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub(crate) fn layout_of(&self, id: AllocId) -> Result<BlockLayout> {
        Ok(self.inner.lock().registry.get(id)?.layout)
    }

    fn drain_pending(&self, registry: &Registry, pending: PendingPrefetch) -> Result<()> {
        let len = registry.get(pending.alloc)?.layout.page_len(pending.page);
        let mut scratch = vec![0u8; len];
        self.transport.wait_into(pending.handle, &mut scratch)?;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl<T: Transport + 'static, M: VirtualMemory + 'static> Runtime<T, M> {
    /// Route hardware faults into the runtime, so raw pointer access to
    /// distributed memory pages them in transparently. Effective once
    /// per process.
    pub fn install_fault_handler(self: &Arc<Self>) -> bool {
        let weak = Arc::downgrade(self);
        crate::vm::sigsegv::install(Box::new(move |addr| {
            let Some(runtime) = weak.upgrade() else {
                return false;
            };
            runtime.handle_fault(addr)
        }))
    }

    fn handle_fault(&self, addr: usize) -> bool {
        match self.ensure_readable(addr, 1) {
            Ok(()) => true,
            Err(err) => {
                error!(addr = %format_args!("{addr:#x}"), error = %err, "unresolvable fault");
                false
            }
        }
    }
}

// Logical pages are sys_page * multiplier, which need not be a power of
// two, so bitmask rounding would be wrong here.
fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::round_up;

    #[test]
    fn round_up_handles_non_power_of_two_alignment() {
        assert_eq!(round_up(0, 4096), 0);
        assert_eq!(round_up(1, 4096), 4096);
        assert_eq!(round_up(12288, 12288), 12288);
        assert_eq!(round_up(12289, 12288), 24576);
    }
}
