//! # Row Locator
//!
//! The fixed-size, non-versioned part of a row. It never changes length
//! and is updated word by word with atomics.
//!
//! ```text
//! Locator {
//!     left_offset:  AtomicU64   chain head pushed from the left slot (0 = none)
//!     right_offset: AtomicU64   chain head pushed from the right slot (0 = none)
//!     bound:        AtomicU64   NEWER_RIGHT_BIT | xid_bound
//! }
//! ```
//!
//! `xid_bound` is the creator of the newer in-place version and the flag
//! says which slot holds it. A snapshot that sees `xid_bound` starts at the
//! newer slot, any other snapshot starts at the older one.
//!
//! Chain offsets are monotonic, so the larger of the two offsets is always
//! the newest chain entry of the row; its back-links cover the whole
//! evicted history.

use std::sync::atomic::{AtomicU64, Ordering};

use super::slot::Side;
use crate::txn::TxnId;

const NEWER_RIGHT_BIT: u64 = 1 << 63;
const XID_MASK: u64 = !NEWER_RIGHT_BIT;

/// Point-in-time copy of a locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatorState {
    pub left_offset: u64,
    pub right_offset: u64,
    pub xid_bound: TxnId,
    pub newer: Side,
}

impl LocatorState {
    pub fn offset(&self, side: Side) -> u64 {
        match side {
            Side::Left => self.left_offset,
            Side::Right => self.right_offset,
        }
    }

    pub fn has_chain(&self) -> bool {
        self.left_offset != 0 || self.right_offset != 0
    }

    /// Newest chain entry of the row, 0 when nothing was evicted.
    pub fn chain_head(&self) -> u64 {
        self.left_offset.max(self.right_offset)
    }
}

#[derive(Debug, Default)]
pub struct Locator {
    left_offset: AtomicU64,
    right_offset: AtomicU64,
    bound: AtomicU64,
}

impl Locator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> LocatorState {
        let bound = self.bound.load(Ordering::SeqCst);
        LocatorState {
            left_offset: self.left_offset.load(Ordering::SeqCst),
            right_offset: self.right_offset.load(Ordering::SeqCst),
            xid_bound: bound & XID_MASK,
            newer: if bound & NEWER_RIGHT_BIT != 0 {
                Side::Right
            } else {
                Side::Left
            },
        }
    }

    pub(crate) fn store_offset(&self, side: Side, offset: u64) {
        match side {
            Side::Left => self.left_offset.store(offset, Ordering::SeqCst),
            Side::Right => self.right_offset.store(offset, Ordering::SeqCst),
        }
    }

    /// Publishes `xid` as the boundary with `newer` holding its version.
    pub(crate) fn publish_bound(&self, xid: TxnId, newer: Side) {
        debug_assert_eq!(xid & NEWER_RIGHT_BIT, 0);
        let word = match newer {
            Side::Left => xid,
            Side::Right => xid | NEWER_RIGHT_BIT,
        };
        self.bound.store(word, Ordering::SeqCst);
    }
}
