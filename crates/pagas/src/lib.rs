//! # pagas - Partitioned Global Address Space runtime
//!
//! **Software distributed shared memory** with get-on-fault remote paging,
//! a bounded FIFO frame cache, and barrier-based consistency.
//!
//! A job runs the same program on every rank (SPMD). Distributed arrays
//! are allocated collectively and split blockwise along their leading
//! dimension; each rank writes its own block and reads the whole array,
//! with foreign pages pulled in transparently a page at a time.
//!
//! This is the **meta crate** that re-exports all pagas components for
//! convenient access.
//!
//! ## Quick Start
//!
//! ```
//! use pagas::prelude::*;
//!
//! // Four ranks in one process, tiny pages so the example pages.
//! let endpoints = LocalCluster::new(4).into_endpoints();
//! let handles: Vec<_> = endpoints
//!     .into_iter()
//!     .map(|transport| {
//!         std::thread::spawn(move || -> pagas::runtime::Result<f64> {
//!             let config = RuntimeConfig::new()
//!                 .with_cache_budget(16 * 256)
//!                 .with_worker_threads(1);
//!             let rt = Runtime::init(transport, HeapMemory::with_page_size(256), config)?;
//!             let a: DistArray<f64> = rt.allocate_array(1024, 1024)?;
//!             a.fill_owned(&rt, |i| i as f64)?;
//!             rt.sync()?;
//!             // Read data owned by the last rank.
//!             let tail = a.read(&rt, 1023)?;
//!             rt.free_array(a)?;
//!             rt.finalize(0)?;
//!             Ok(tail)
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     assert_eq!(handle.join().unwrap().unwrap(), 1023.0);
//! }
//! ```
//!
//! ## Components
//!
//! ### Core Structures ([`core`])
//!
//! Block-distribution layout math, per-page validity bitmaps, the FIFO
//! frame ring, and the growable transfer queue. Pure data structures,
//! no I/O.
//!
//! ### Transport ([`transport`])
//!
//! The one-sided [`transport::Transport`] capability: remote reads and
//! writes by `(rank, segment, offset)`, plus the collectives (barrier,
//! broadcast, all-gather, abort) anchoring the consistency protocol.
//! [`transport::LocalCluster`] runs a whole job inside one process, one
//! thread per rank.
//!
//! ### Runtime ([`runtime`])
//!
//! The engine: allocation registry, frame cache, fault resolution,
//! explicit prefetch queue, synchronization, worker dispatch, and the
//! typed [`runtime::DistArray`] view.

pub use pagas_core as core;
pub use pagas_runtime as runtime;
pub use pagas_transport as transport;

pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! # Example
    //!
    //! ```
    //! use pagas::prelude::*;
    //!
    //! let cluster = LocalCluster::new(2);
    //! assert_eq!(cluster.size(), 2);
    //! ```

    // Runtime surface
    pub use crate::runtime::{
        init_tracing, DistArray, HeapMemory, Runtime, RuntimeConfig, RuntimeStats, TracingConfig,
        TracingFormat,
    };

    #[cfg(target_os = "linux")]
    pub use crate::runtime::SysMemory;

    // Transport surface
    pub use crate::transport::{LocalCluster, LocalTransport, SegmentId, Transport};

    // Layout math
    pub use crate::core::{BlockLayout, PageSpan};
}
