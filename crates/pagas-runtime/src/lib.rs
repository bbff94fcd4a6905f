//! # pagas-runtime
//!
//! The memory-virtualization engine of the pagas distributed-shared-memory
//! runtime. A cluster of ranks shares one partitioned address space: each
//! rank owns a contiguous block of every distributed array and reads the
//! rest transparently, a page at a time, through a get-on-fault mechanism
//! backed by a bounded FIFO frame cache with one-page-ahead prefetch.
//!
//! The engine is layered so everything above the virtual-memory seam is
//! testable without real memory protection:
//!
//! - [`vm`] confines every raw mapping, protection, and relocation call
//!   behind the [`vm::VirtualMemory`] trait.
//! - [`registry`] tracks live allocations, address-sorted.
//! - [`cache`] and [`fault`] turn an access violation into a pure
//!   [`fault::FetchPlan`] over page and frame identifiers.
//! - [`prefetch`] holds the explicit, application-directed transfer queue.
//! - [`sync_protocol`] computes the boundary-page exchange behind `sync`.
//! - [`runtime`] drives plans against the transport and the VM, and owns
//!   the public API.

pub mod array;
pub mod cache;
pub mod config;
pub mod error;
pub mod fault;
pub mod prefetch;
pub mod registry;
pub mod runtime;
pub mod stats;
pub mod sync_protocol;
pub mod tracing_support;
pub mod vm;
pub mod worker;

pub use array::DistArray;
pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use registry::{AllocId, Allocation, Registry};
pub use runtime::Runtime;
pub use stats::RuntimeStats;
pub use tracing_support::{init_tracing, TracingConfig, TracingFormat};
pub use vm::{HeapMemory, Protection, VirtualMemory};

#[cfg(target_os = "linux")]
pub use vm::SysMemory;
