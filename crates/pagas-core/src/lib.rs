//! # pagas-core
//!
//! Core data structures for the pagas distributed-shared-memory runtime.
//!
//! This crate provides:
//! - Block-distribution layout math (`BlockLayout`)
//! - Per-page validity bitmaps (`ValidityBitmap`)
//! - FIFO frame admission ring (`FrameRing`)
//! - Intrusive free-list transfer queue (`TransferQueue`)
//!
//! Everything here is pure bookkeeping: no memory mapping, no network, no
//! unsafe code. The runtime crate drives these structures from its fault
//! engine and synchronization protocol.

pub mod bitmap;
pub mod layout;
pub mod queue;
pub mod ring;

pub use bitmap::ValidityBitmap;
pub use layout::{BlockLayout, LayoutError, PageSpan};
pub use queue::TransferQueue;
pub use ring::{FrameRing, RingEntry};
