//! # pagas-transport
//!
//! One-sided transport capability consumed by the pagas DSM runtime.
//!
//! The runtime never talks to a network substrate directly; it drives the
//! [`Transport`] trait: blocking and non-blocking remote reads, remote
//! writes, and the collective operations (barrier, broadcast, all-gather,
//! abort) that anchor the consistency protocol. Remote memory is named by
//! `(owner rank, segment, byte offset)`; segment ids are assigned by an
//! identically advancing counter on every rank, so no raw pointers cross
//! the interface.
//!
//! [`LocalCluster`] provides an in-process implementation with one endpoint
//! per rank (thread), used by the runtime's tests and by single-machine
//! runs. Real substrates (an RDMA library, a PGAS communication layer) plug
//! in behind the same trait.

pub mod local;

pub use local::{LocalCluster, LocalTransport};

use std::fmt;

/// Identifier of a collectively created memory segment.
///
/// Allocation is collective, so every rank assigns the same id to the same
/// logical segment by advancing a local counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg({})", self.0)
    }
}

/// Handle to a non-blocking transfer, redeemed by [`Transport::wait_into`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferHandle(pub u64);

/// Errors surfaced by transport implementations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("job aborted with code {0}")]
    Aborted(i32),
    #[error("rank {owner} has not exported segment {segment}")]
    UnknownSegment { owner: u32, segment: SegmentId },
    #[error("remote read of {len} bytes at offset {offset} exceeds segment {segment} ({seg_len} bytes)")]
    OutOfSegment {
        segment: SegmentId,
        offset: usize,
        len: usize,
        seg_len: usize,
    },
    #[error("unknown transfer handle {0:?}")]
    UnknownHandle(TransferHandle),
    #[error("transfer of {expected} bytes waited into {got}-byte buffer")]
    LengthMismatch { expected: usize, got: usize },
    #[error("peer disconnected during collective")]
    Disconnected,
}

/// One-sided transport over a set of ranks.
///
/// All calls may block. Collectives (`barrier`, `broadcast`, `gather_all`)
/// must be invoked by every rank in the same order; the SPMD execution
/// model guarantees this for correct programs. `abort` tears down the whole
/// job so no rank hangs at a barrier its peers will never reach.
pub trait Transport: Send + Sync {
    /// This process's rank, in `[0, size)`.
    fn rank(&self) -> u32;

    /// Number of ranks in the job.
    fn size(&self) -> u32;

    /// Make `len` bytes at `base` servable to one-sided reads and writes
    /// from peers under `segment`.
    ///
    /// # Safety
    ///
    /// The region must stay valid and at a stable address until
    /// `unexport_segment`; the caller is responsible for ordering remote
    /// access against local writes (the runtime orders them with barriers).
    unsafe fn export_segment(
        &self,
        segment: SegmentId,
        base: *mut u8,
        len: usize,
    ) -> anyhow::Result<()>;

    /// Withdraw a previously exported segment.
    fn unexport_segment(&self, segment: SegmentId) -> anyhow::Result<()>;

    /// Blocking one-sided read from `owner`'s copy of `segment` at
    /// `offset`, filling `dst`.
    fn get(
        &self,
        dst: &mut [u8],
        owner: u32,
        segment: SegmentId,
        offset: usize,
    ) -> anyhow::Result<()>;

    /// Begin a non-blocking one-sided read; the data becomes observable at
    /// `wait_into`.
    fn get_begin(
        &self,
        owner: u32,
        segment: SegmentId,
        offset: usize,
        len: usize,
    ) -> anyhow::Result<TransferHandle>;

    /// Complete a non-blocking read, copying the fetched bytes into `dst`
    /// (which must match the length requested at `get_begin`).
    fn wait_into(&self, handle: TransferHandle, dst: &mut [u8]) -> anyhow::Result<()>;

    /// Blocking one-sided write into `owner`'s copy of `segment`.
    fn put(&self, src: &[u8], owner: u32, segment: SegmentId, offset: usize) -> anyhow::Result<()>;

    /// Block until every rank has arrived.
    fn barrier(&self) -> anyhow::Result<()>;

    /// Replicate `buf` from `root` to every rank.
    fn broadcast(&self, buf: &mut [u8], root: u32) -> anyhow::Result<()>;

    /// Concatenate every rank's `send` contribution into `recv` in rank
    /// order; `recv.len()` must equal `send.len() * size`.
    fn gather_all(&self, send: &[u8], recv: &mut [u8]) -> anyhow::Result<()>;

    /// Collectively terminate the job. Pending and future collectives on
    /// every rank fail with [`TransportError::Aborted`].
    fn abort(&self, code: i32);
}
