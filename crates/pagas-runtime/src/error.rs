//! Runtime error types.
//!
//! Every error here is in the fatal class: the public operations log it,
//! trigger a collective abort so no peer hangs at a barrier, and propagate
//! it to the caller. There is no retry policy and no recoverable variant;
//! a rank that cannot keep its view of the shared address space consistent
//! must stop the whole job.

use crate::registry::AllocId;
use thiserror::Error;

/// Result alias used throughout the runtime.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Fatal runtime failures.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("reserving {len} bytes of address space failed: {source}")]
    Reserve {
        len: usize,
        source: std::io::Error,
    },

    #[error("changing protection of {len} bytes at {addr:#x} failed: {source}")]
    Protect {
        addr: usize,
        len: usize,
        source: std::io::Error,
    },

    #[error("relocating {len} bytes from {src:#x} to {dst:#x} failed: {source}")]
    Relocate {
        src: usize,
        dst: usize,
        len: usize,
        source: std::io::Error,
    },

    #[error("releasing {len} bytes at {addr:#x} failed: {source}")]
    Release {
        addr: usize,
        len: usize,
        source: std::io::Error,
    },

    #[error("access violation at {addr:#x}, outside every tracked allocation")]
    UnknownAddress { addr: usize },

    #[error("unexpected fault on an owned page at {addr:#x}")]
    OwnedPageFault { addr: usize },

    #[error("write at index {index} outside this rank's owned range [{start}, {end})")]
    ForeignWrite {
        index: usize,
        start: usize,
        end: usize,
    },

    #[error("allocation {0:?} is not registered")]
    UnknownAllocation(AllocId),

    #[error("collective allocate arguments disagree across ranks: this rank passed (extent={extent}, size={size})")]
    CollectiveMismatch { extent: usize, size: usize },

    #[error(transparent)]
    Layout(#[from] pagas_core::LayoutError),

    #[error("transport failure: {0}")]
    Transport(anyhow::Error),
}

impl From<anyhow::Error> for RuntimeError {
    fn from(err: anyhow::Error) -> Self {
        RuntimeError::Transport(err)
    }
}
