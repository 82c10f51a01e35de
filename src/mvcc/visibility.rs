//! # Visibility Resolution
//!
//! Finds the version of one row a snapshot sees.
//!
//! ```text
//! read_visible(page, item, snapshot)
//!     │
//!     ├─ page.read_stable ── resolve_in_place
//!     │                        1. load locator
//!     │                        2. candidate = newer slot if snapshot sees
//!     │                           xid_bound, else older slot
//!     │                        3. check candidate, then the other slot,
//!     │                           skipping slots in flux
//!     │                        4. miss → reload locator
//!     │
//!     └─ miss ── choose_branch ── chain.find_visible
//! ```
//!
//! `resolve_in_place` runs under a read token and its result is thrown away
//! if a writer flipped the unit meanwhile, so everything it reports,
//! including corruption, comes from a consistent view. The locator is
//! reloaded after the slot checks: a writer stores the chain offset of an
//! evicted version before marking its slot in flux, so a reader that skipped
//! the slot always sees the offset.

use eyre::{bail, Result};

use super::branch::choose_branch;
use super::chain::{ChainEntry, VersionChain};
use super::locator::LocatorState;
use super::record::RecordCell;
use super::slot::{Side, VersionStamp};
use crate::error::AccessError;
use crate::storage::Page;
use crate::txn::Snapshot;

/// Where a resolved version was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Slot(Side),
    Chain(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleVersion {
    pub origin: Origin,
    pub stamp: VersionStamp,
    pub payload: Vec<u8>,
}

impl From<ChainEntry> for VisibleVersion {
    fn from(entry: ChainEntry) -> Self {
        Self {
            origin: Origin::Chain(entry.offset),
            stamp: entry.stamp,
            payload: entry.payload,
        }
    }
}

/// How the caller intends to use the version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Plain read: fall back to the chain.
    Read,
    /// Read for modification: only in-place versions qualify.
    Modify,
}

#[derive(Debug)]
pub enum InPlace {
    Found(VisibleVersion),
    Miss(LocatorState),
}

/// Resolves `snapshot` against the two in-place slots. Call under a read
/// token or the page latch.
pub fn resolve_in_place(cell: &RecordCell, snapshot: &Snapshot<'_>) -> Result<InPlace> {
    let state = cell.locator().load();
    let newer = state.newer;
    let flux = cell.in_flux();

    if flux != Some(newer) {
        let slot = cell.slot(newer);
        if !slot.is_used() {
            tracing::warn!(target: "twinslot::access", ?newer, "locator names an empty slot");
            bail!(AccessError::corruption("locator names an empty version slot"));
        }
        let xmin = slot.stamp().xmin;
        if xmin != state.xid_bound {
            tracing::warn!(
                target: "twinslot::access",
                xmin,
                bound = state.xid_bound,
                "newer slot creator disagrees with xid bound"
            );
            bail!(AccessError::corruption(format!(
                "newer slot created by {} but xid bound is {}",
                xmin, state.xid_bound
            )));
        }
    }

    let first = if !snapshot.is_mvcc() || snapshot.sees_xid(state.xid_bound) {
        newer
    } else {
        newer.other()
    };

    for side in [first, first.other()] {
        if flux == Some(side) {
            continue;
        }
        let slot = cell.slot(side);
        if !slot.is_used() {
            continue;
        }
        let stamp = slot.stamp();
        if snapshot.is_version_visible(&stamp) {
            // SAFETY: the caller holds a read token or the latch, and the
            // slot is not in flux.
            let payload = unsafe { slot.copy_payload() };
            if cell.in_flux() == Some(side) {
                continue;
            }
            return Ok(InPlace::Found(VisibleVersion {
                origin: Origin::Slot(side),
                stamp,
                payload,
            }));
        }
    }

    Ok(InPlace::Miss(cell.locator().load()))
}

/// Every in-place version `snapshot` sees, newest first. Used by non-MVCC
/// fetches that return one version per call.
pub fn resolve_all_in_place(cell: &RecordCell, snapshot: &Snapshot<'_>) -> Vec<VisibleVersion> {
    let newer = cell.locator().load().newer;
    let flux = cell.in_flux();
    [newer, newer.other()]
        .into_iter()
        .filter(|side| flux != Some(*side))
        .filter_map(|side| {
            let slot = cell.slot(side);
            if !slot.is_used() {
                return None;
            }
            let stamp = slot.stamp();
            snapshot.is_version_visible(&stamp).then(|| VisibleVersion {
                origin: Origin::Slot(side),
                stamp,
                // SAFETY: as in resolve_in_place.
                payload: unsafe { slot.copy_payload() },
            })
        })
        .collect()
}

/// The version of row `item` on `page` that `snapshot` sees, if any.
pub fn read_visible(
    page: &Page,
    item: u16,
    snapshot: &Snapshot<'_>,
    mode: ReadMode,
    chain: &VersionChain,
    retry_limit: u32,
) -> Result<Option<VisibleVersion>> {
    let cell = page.cell(item)?;
    if !cell.is_live() {
        return Ok(None);
    }

    let state = match page.read_stable(retry_limit, || resolve_in_place(cell, snapshot))? {
        InPlace::Found(version) => {
            tracing::trace!(target: "twinslot::access", item, origin = ?version.origin, "in-place hit");
            return Ok(Some(version));
        }
        InPlace::Miss(state) => state,
    };

    if mode == ReadMode::Modify {
        return Ok(None);
    }
    let Some(side) = choose_branch(state.left_offset, state.right_offset, state.xid_bound, snapshot)
    else {
        return Ok(None);
    };
    Ok(chain
        .find_visible(state.offset(side), snapshot)?
        .map(VisibleVersion::from))
}
