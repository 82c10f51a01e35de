//! # Record Cells
//!
//! One logical row at one physical position: a locator plus two version
//! slots.
//!
//! ```text
//! RecordCell
//! ├── state: AtomicU8           UNUSED → LIVE (published with Release)
//! ├── locator: Locator          chain offsets + xid_bound + newer side
//! ├── slots: [VersionSlot; 2]   Left, Right
//! ├── in_flux: AtomicU8         slot currently being overwritten
//! ├── moved_to: Mutex<Option>   mover xid + new home after a cross-partition update
//! └── key: OnceLock<Box<[u8]>>  logical key, for index maintenance
//! ```
//!
//! ## Overwrite Sequence
//!
//! The writer holds the page latch throughout.
//!
//! ```text
//! 1. push the target slot's content to the chain if still needed,
//!    store the new chain head in the target side's offset
//! 2. mark the target slot in flux
//! 3. acquire write proof (flip the dual-reference unit, drain)
//! 4. overwrite the target slot
//! 5. stamp xmax on the superseded version
//! 6. publish xid_bound + newer side
//! 7. clear in flux, commit the write
//! ```
//!
//! A reader registered after step 3 observes the in-flux mark and skips the
//! slot. A reader registered before step 3 is drained before step 4.
//! Because the chain offset is stored before the mark, a reader that skips
//! the slot always finds the evicted content through the locator.

use eyre::{bail, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use super::chain::VersionChain;
use super::locator::{Locator, LocatorState};
use super::slot::{Side, VersionSlot, VersionStamp};
use crate::error::AccessError;
use crate::router::RouteSynopsis;
use crate::storage::Page;
use crate::txn::{CommandId, TransactionOracle, TxnId, TxnState};

const CELL_UNUSED: u8 = 0;
const CELL_LIVE: u8 = 1;

const FLUX_NONE: u8 = 0;
const FLUX_LEFT: u8 = 1;
const FLUX_RIGHT: u8 = 2;

pub struct RecordCell {
    state: AtomicU8,
    locator: Locator,
    slots: [VersionSlot; 2],
    in_flux: AtomicU8,
    moved_to: Mutex<Option<(TxnId, RouteSynopsis)>>,
    key: OnceLock<Box<[u8]>>,
}

/// The version a writer must build on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentVersion {
    pub side: Side,
    pub stamp: VersionStamp,
}

impl RecordCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(CELL_UNUSED),
            locator: Locator::new(),
            slots: [VersionSlot::new(), VersionSlot::new()],
            in_flux: AtomicU8::new(FLUX_NONE),
            moved_to: Mutex::new(None),
            key: OnceLock::new(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.state.load(Ordering::Acquire) == CELL_LIVE
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn slot(&self, side: Side) -> &VersionSlot {
        &self.slots[side.index()]
    }

    pub fn in_flux(&self) -> Option<Side> {
        match self.in_flux.load(Ordering::SeqCst) {
            FLUX_LEFT => Some(Side::Left),
            FLUX_RIGHT => Some(Side::Right),
            _ => None,
        }
    }

    fn mark_in_flux(&self, side: Side) {
        let flag = match side {
            Side::Left => FLUX_LEFT,
            Side::Right => FLUX_RIGHT,
        };
        self.in_flux.store(flag, Ordering::SeqCst);
    }

    fn clear_in_flux(&self) {
        self.in_flux.store(FLUX_NONE, Ordering::SeqCst);
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.key.get().map(|k| &k[..])
    }

    /// The transaction that last moved the row out of this partition and
    /// where it went.
    pub fn moved_to(&self) -> Option<(TxnId, RouteSynopsis)> {
        *self.moved_to.lock()
    }

    /// Where the row went if `xmax` is the transaction that moved it. A
    /// deleter that did not move the row yields `None`.
    pub fn moved_by(&self, xmax: TxnId) -> Option<RouteSynopsis> {
        match *self.moved_to.lock() {
            Some((mover, synopsis)) if mover == xmax => Some(synopsis),
            _ => None,
        }
    }

    /// Requires the page latch.
    pub(crate) fn set_moved_to(&self, mover: TxnId, synopsis: RouteSynopsis) {
        *self.moved_to.lock() = Some((mover, synopsis));
    }

    /// Publishes a fresh row with its first version in the left slot.
    /// Requires the page latch.
    pub(crate) fn initialize(
        &self,
        key: &[u8],
        xmin: TxnId,
        cmin: CommandId,
        payload: &[u8],
    ) -> Result<()> {
        if self.state.load(Ordering::Acquire) != CELL_UNUSED {
            bail!(AccessError::corruption("insert into an occupied record cell"));
        }
        // SAFETY: the cell is unpublished, so no reader looks at its slots,
        // and the page latch excludes other writers.
        unsafe { self.slot(Side::Left).overwrite(xmin, cmin, payload) };
        self.locator.publish_bound(xmin, Side::Left);
        if self.key.set(key.into()).is_err() {
            bail!(AccessError::corruption("record cell key already set"));
        }
        self.state.store(CELL_LIVE, Ordering::Release);
        Ok(())
    }

    /// Newest version whose creator did not abort. Requires the page latch.
    pub(crate) fn current_version(&self, oracle: &dyn TransactionOracle) -> Option<CurrentVersion> {
        let newer = self.locator.load().newer;
        [newer, newer.other()].into_iter().find_map(|side| {
            let slot = self.slot(side);
            if !slot.is_used() {
                return None;
            }
            let stamp = slot.stamp();
            (oracle.state(stamp.xmin) != TxnState::Aborted).then_some(CurrentVersion { side, stamp })
        })
    }

    /// Brings the newest live chain version back in place when both slots
    /// hold aborted versions. Requires the page latch.
    pub(crate) fn restore_from_chain(
        &self,
        page: &Page,
        chain: &VersionChain,
        oracle: &dyn TransactionOracle,
        spin_limit: u32,
    ) -> Result<Option<CurrentVersion>> {
        let state = self.locator.load();
        if !state.has_chain() {
            return Ok(None);
        }
        let Some(entry) = chain.find_live(state.chain_head(), oracle)? else {
            return Ok(None);
        };
        let target = state.newer.other();
        self.write_slot(page, target, spin_limit, |slot| {
            // SAFETY: called from write_slot with the slot in flux and write proof held.
            unsafe { slot.overwrite(entry.stamp.xmin, entry.stamp.cmin, &entry.payload) };
            if entry.stamp.xmax != 0 && oracle.state(entry.stamp.xmax) != TxnState::Aborted {
                slot.set_xmax(entry.stamp.xmax, false, entry.stamp.cmax);
            }
        });
        self.locator.publish_bound(entry.stamp.xmin, target);
        tracing::debug!(
            target: "twinslot::access",
            offset = entry.offset,
            xmin = entry.stamp.xmin,
            "restored chain version in place"
        );
        Ok(Some(CurrentVersion {
            side: target,
            stamp: self.slot(target).stamp(),
        }))
    }

    /// Copy-on-write update into the slot opposite `current`. Requires the
    /// page latch.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn overwrite_other_slot(
        &self,
        page: &Page,
        chain: &VersionChain,
        oracle: &dyn TransactionOracle,
        rel_id: u32,
        current: Side,
        xid: TxnId,
        cid: CommandId,
        payload: &[u8],
        spin_limit: u32,
    ) -> Result<()> {
        let target = current.other();
        let target_slot = self.slot(target);

        if target_slot.is_used() {
            let evicted = target_slot.stamp();
            if may_still_be_visible(&evicted, oracle) {
                // SAFETY: the page latch excludes writers, so the body is stable.
                let body = unsafe { target_slot.copy_payload() };
                let state: LocatorState = self.locator.load();
                let offset = chain.append(rel_id, &evicted, state.chain_head(), &body)?;
                self.locator.store_offset(target, offset);
            }
        }

        self.write_slot(page, target, spin_limit, |slot| {
            // SAFETY: called from write_slot with the slot in flux and write proof held.
            unsafe { slot.overwrite(xid, cid, payload) };
        });
        self.slot(current).set_xmax(xid, false, cid);
        self.locator.publish_bound(xid, target);
        Ok(())
    }

    fn write_slot(&self, page: &Page, side: Side, spin_limit: u32, write: impl FnOnce(&VersionSlot)) {
        self.mark_in_flux(side);
        let proof = page.acquire_write(spin_limit);
        write(self.slot(side));
        self.clear_in_flux();
        page.commit_write(proof);
    }
}

/// False once no snapshot can need the version again: its creator aborted,
/// or its deleter committed below every live snapshot.
fn may_still_be_visible(stamp: &VersionStamp, oracle: &dyn TransactionOracle) -> bool {
    if oracle.state(stamp.xmin) == TxnState::Aborted {
        return false;
    }
    !(stamp.has_deleter()
        && oracle.state(stamp.xmax) == TxnState::Committed
        && stamp.xmax < oracle.oldest_active())
}

impl Default for RecordCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PageKey;
    use crate::txn::snapshot::tests::ScriptedOracle;

    fn page() -> Page {
        Page::new(PageKey {
            rel: 1,
            level: 0,
            partition: 0,
            generation: 1,
            group: 0,
            block: 0,
        })
    }

    #[test]
    fn initialize_publishes_left_slot() {
        let page = page();
        let cell = page.cell(0).unwrap();
        assert!(!cell.is_live());
        cell.initialize(b"k", 5, 0, b"v1").unwrap();
        assert!(cell.is_live());
        let state = cell.locator().load();
        assert_eq!((state.xid_bound, state.newer), (5, Side::Left));
        assert_eq!(cell.key(), Some(&b"k"[..]));
        assert!(cell.initialize(b"k", 6, 0, b"v2").is_err());
    }

    #[test]
    fn overwrite_flips_bound_and_stamps_superseded() {
        let oracle = ScriptedOracle::with(&[(5, TxnState::Committed), (6, TxnState::Active)]);
        let chain = VersionChain::new();
        let page = page();
        let cell = page.cell(0).unwrap();
        cell.initialize(b"k", 5, 0, b"v1").unwrap();

        let _latch = page.latch();
        cell.overwrite_other_slot(&page, &chain, &oracle, 1, Side::Left, 6, 0, b"v2", 16)
            .unwrap();
        let state = cell.locator().load();
        assert_eq!((state.xid_bound, state.newer), (6, Side::Right));
        assert_eq!(cell.slot(Side::Left).stamp().xmax, 6);
        assert!(cell.in_flux().is_none());
        // Right slot was empty: nothing pushed.
        assert!(!state.has_chain());
    }

    #[test]
    fn third_version_pushes_oldest_to_chain() {
        let oracle = ScriptedOracle::with(&[
            (5, TxnState::Committed),
            (6, TxnState::Committed),
            (7, TxnState::Active),
        ]);
        oracle.oldest.store(6, Ordering::Relaxed);
        let chain = VersionChain::new();
        let page = page();
        let cell = page.cell(0).unwrap();
        cell.initialize(b"k", 5, 0, b"v1").unwrap();

        let _latch = page.latch();
        cell.overwrite_other_slot(&page, &chain, &oracle, 1, Side::Left, 6, 0, b"v2", 16)
            .unwrap();
        cell.overwrite_other_slot(&page, &chain, &oracle, 1, Side::Right, 7, 0, b"v3", 16)
            .unwrap();

        let state = cell.locator().load();
        assert_eq!(state.newer, Side::Left);
        assert_ne!(state.left_offset, 0);
        let entry = chain.lookup(state.left_offset).unwrap().unwrap();
        assert_eq!(entry.payload, b"v1");
        assert_eq!((entry.stamp.xmin, entry.stamp.xmax), (5, 6));
    }

    #[test]
    fn dead_version_is_not_pushed() {
        let oracle = ScriptedOracle::with(&[
            (5, TxnState::Committed),
            (6, TxnState::Committed),
            (7, TxnState::Active),
        ]);
        oracle.oldest.store(7, Ordering::Relaxed);
        let chain = VersionChain::new();
        let page = page();
        let cell = page.cell(0).unwrap();
        cell.initialize(b"k", 5, 0, b"v1").unwrap();

        let _latch = page.latch();
        cell.overwrite_other_slot(&page, &chain, &oracle, 1, Side::Left, 6, 0, b"v2", 16)
            .unwrap();
        cell.overwrite_other_slot(&page, &chain, &oracle, 1, Side::Right, 7, 0, b"v3", 16)
            .unwrap();
        assert!(!cell.locator().load().has_chain());
    }

    #[test]
    fn current_version_skips_aborted_newer_slot() {
        let oracle = ScriptedOracle::with(&[(5, TxnState::Committed), (6, TxnState::Aborted)]);
        let chain = VersionChain::new();
        let page = page();
        let cell = page.cell(0).unwrap();
        cell.initialize(b"k", 5, 0, b"v1").unwrap();
        let _latch = page.latch();
        cell.overwrite_other_slot(&page, &chain, &oracle, 1, Side::Left, 6, 0, b"v2", 16)
            .unwrap();
        let current = cell.current_version(&oracle).unwrap();
        assert_eq!(current.side, Side::Left);
        assert_eq!(current.stamp.xmin, 5);
    }
}
