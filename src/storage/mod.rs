//! # Storage Layer
//!
//! Memory-resident heap pages and the arbitration around them.
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │ BufferPool  (sharded map, pinned handles) │
//! ├───────────────────────────────────────────┤
//! │ Page        (cells, latch, content lock)  │
//! ├───────────────────────────────────────────┤
//! │ DualRef     (lock-free read arbitration)  │
//! └───────────────────────────────────────────┘
//! ```
//!
//! - [`dual_ref`]: packed reader tallies and active-unit flag
//! - [`page`]: page layout, read/write protocol entry points
//! - [`buffer_pool`]: page lookup, creation, pinning and retirement

pub mod buffer_pool;
pub mod dual_ref;
pub mod page;

pub use buffer_pool::{BufferPool, PageHandle};
pub use dual_ref::{dual_ref_stats, reset_dual_ref_stats, DualRef, DualRefStats, ReadToken};
pub use page::{Page, PageKey, WriteProof};
