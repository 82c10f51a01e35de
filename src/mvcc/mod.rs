//! # Multi-Version Concurrency Control (MVCC)
//!
//! Row versioning with two versions kept in place and the rest pushed to an
//! append-only version chain.
//!
//! ## Version Storage: Two In-Place Slots + External Chain
//!
//! ```text
//!        [ Heap Page, cell 7 ]
//!        +------------------------------------+
//!        | Locator                            |
//!        |   left_offset:  0                  |
//!        |   right_offset: seg 3, off 96  ------------\
//!        |   xid_bound: 105, newer: Left      |        \
//!        +------------------------------------+         \
//!        | Left slot   xmin 105  xmax 0       |          \   [ Chain Segment 3 ]
//!        |             "Alice", 31            |           \  +-------------------+
//!        +------------------------------------+            ->| off 96:           |
//!        | Right slot  xmin 101  xmax 105     |              |  xmin 100         |
//!        |             "Alice", 30            |              |  xmax 101         |
//!        +------------------------------------+              |  back: 0          |
//!                                                            |  "Alice", 29      |
//!                                                            +-------------------+
//! ```
//!
//! The two newest versions answer almost every snapshot without leaving the
//! page. Only a snapshot older than both walks the chain.
//!
//! ## Visibility Rules
//!
//! A version V is visible to snapshot S if:
//! 1. V.xmin is seen by S (committed before S, or S's own earlier command)
//! 2. V.xmax is empty, lock-only, aborted, or not seen by S
//!
//! ## Update Protocol
//!
//! An update writes the slot that does not hold the current version:
//!
//! ```text
//! before:  newer = Left (xid 105)       after:  newer = Right (xid 110)
//!          Left  = v105                         Left  = v105, xmax 110
//!          Right = v101  ──push──> chain        Right = v110
//! ```
//!
//! The evicted version goes to the chain only if some snapshot may still
//! see it. Readers never block on this: see [`crate::storage::dual_ref`].
//!
//! ## Key Structures
//!
//! - `VersionSlot`: one stamped in-place version
//! - `Locator`: chain offsets + `xid_bound` + newer side
//! - `RecordCell`: locator + two slots, one per row position
//! - `VersionChain`: segmented append-only store for evicted versions
//! - `choose_branch`: picks the chain offset a walk starts from

pub mod branch;
pub mod chain;
pub mod locator;
pub mod record;
pub mod slot;
pub mod visibility;

pub use branch::choose_branch;
pub use chain::{chain_stats, reset_chain_stats, ChainEntry, ChainStats, VersionChain};
pub use locator::{Locator, LocatorState};
pub use record::{CurrentVersion, RecordCell};
pub use slot::{Side, VersionSlot, VersionStamp};
pub use visibility::{
    read_visible, resolve_all_in_place, resolve_in_place, InPlace, Origin, ReadMode,
    VisibleVersion,
};
