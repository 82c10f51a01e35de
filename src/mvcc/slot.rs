//! # In-Place Version Slots
//!
//! Each record cell owns two version slots, `Left` and `Right`. A slot is a
//! creator/deleter-stamped copy of one row version.
//!
//! ## Slot Layout
//!
//! ```text
//! VersionSlot {
//!     used: AtomicBool,
//!     xmin: AtomicU64,          creator
//!     xmax: AtomicU64,          deleter | LOCK_ONLY_BIT
//!     cids: AtomicU64,          cmax << 32 | cmin
//!     body: UnsafeCell<Vec<u8>> encoded row
//! }
//! ```
//!
//! The stamps are atomics so the lock path can annotate `xmax` with a CAS
//! while readers are registered. The body is plain memory guarded by the
//! dual-reference protocol: it is only written while the slot is marked in
//! flux and the readers of the outgoing unit have drained.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::txn::{CommandId, TxnId, INVALID_XID};

pub mod flags {
    /// Set in the raw `xmax` word when the deleter only locked the row.
    pub const LOCK_ONLY_BIT: u64 = 1 << 63;
    pub const XID_MASK: u64 = !LOCK_ONLY_BIT;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

/// Point-in-time copy of a slot's stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionStamp {
    pub xmin: TxnId,
    pub xmax: TxnId,
    pub lock_only: bool,
    pub cmin: CommandId,
    pub cmax: CommandId,
}

impl VersionStamp {
    pub fn has_deleter(&self) -> bool {
        self.xmax != INVALID_XID && !self.lock_only
    }

    pub(crate) fn raw_xmax(&self) -> u64 {
        pack_xmax(self.xmax, self.lock_only)
    }
}

#[inline]
pub(crate) fn pack_xmax(xid: TxnId, lock_only: bool) -> u64 {
    if lock_only {
        xid | flags::LOCK_ONLY_BIT
    } else {
        xid
    }
}

#[inline]
fn pack_cids(cmin: CommandId, cmax: CommandId) -> u64 {
    ((cmax as u64) << 32) | cmin as u64
}

pub struct VersionSlot {
    used: AtomicBool,
    xmin: AtomicU64,
    xmax: AtomicU64,
    cids: AtomicU64,
    body: UnsafeCell<Vec<u8>>,
}

// SAFETY: every field except `body` is atomic. `body` is written only by the
// single writer holding the page latch, after marking the slot in flux and
// draining readers of the outgoing dual-reference unit; readers skip slots
// marked in flux. No reader can therefore observe `body` while it is being
// mutated.
unsafe impl Sync for VersionSlot {}

impl VersionSlot {
    pub fn new() -> Self {
        Self {
            used: AtomicBool::new(false),
            xmin: AtomicU64::new(INVALID_XID),
            xmax: AtomicU64::new(INVALID_XID),
            cids: AtomicU64::new(0),
            body: UnsafeCell::new(Vec::new()),
        }
    }

    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }

    pub fn stamp(&self) -> VersionStamp {
        let raw_xmax = self.xmax.load(Ordering::Acquire);
        let cids = self.cids.load(Ordering::Acquire);
        VersionStamp {
            xmin: self.xmin.load(Ordering::Acquire),
            xmax: raw_xmax & flags::XID_MASK,
            lock_only: raw_xmax & flags::LOCK_ONLY_BIT != 0,
            cmin: cids as u32,
            cmax: (cids >> 32) as u32,
        }
    }

    /// Copies the body out.
    ///
    /// # Safety
    ///
    /// The caller must hold a validated read token with this slot not in
    /// flux, or hold the page latch.
    pub(crate) unsafe fn copy_payload(&self) -> Vec<u8> {
        (*self.body.get()).clone()
    }

    /// Replaces the whole version.
    ///
    /// # Safety
    ///
    /// The caller must hold the page latch, have marked this slot in flux
    /// (or the cell must be unpublished) and hold write proof for the page.
    pub(crate) unsafe fn overwrite(&self, xmin: TxnId, cmin: CommandId, payload: &[u8]) {
        let body = &mut *self.body.get();
        body.clear();
        body.extend_from_slice(payload);
        self.xmax.store(INVALID_XID, Ordering::Release);
        self.cids.store(pack_cids(cmin, 0), Ordering::Release);
        self.xmin.store(xmin, Ordering::Release);
        self.used.store(true, Ordering::Release);
    }

    /// Stamps the deleter. Requires the page latch.
    pub(crate) fn set_xmax(&self, xmax: TxnId, lock_only: bool, cmax: CommandId) {
        let cmin = self.cids.load(Ordering::Acquire) as u32;
        self.cids.store(pack_cids(cmin, cmax), Ordering::Release);
        self.xmax.store(pack_xmax(xmax, lock_only), Ordering::Release);
    }

    /// Replaces the raw `xmax` word if it still equals `expected`.
    pub(crate) fn cas_xmax(&self, expected: u64, new: u64) -> bool {
        self.xmax
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for VersionSlot {
    fn default() -> Self {
        Self::new()
    }
}
