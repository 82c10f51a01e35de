//! # Row Locking
//!
//! `lock` marks the version a snapshot sees with the caller's xid and the
//! lock-only flag, so no other transaction can update or delete it until
//! the caller finishes.
//!
//! ## Following Updates
//!
//! When the seen version was already superseded, the lock walks forward
//! along the update chain, one hop per committed updater:
//!
//! ```text
//! target = creator of the version the snapshot sees
//! loop (page latch held per hop):
//!     current.xmin == target  → annotate current version, done
//!     else find target's xmax (other slot, then version chain)
//!          running  → wait policy
//!          ours     → SelfModified
//!          committed, !follow_updates → Updated
//!          committed, follow_updates  → target = xmax, hops += 1
//! ```
//!
//! A row updated N times since the snapshot takes at most N+1 hops. The hop
//! count is capped by `max_lock_hops`; exceeding it means the chain loops,
//! which is reported as corruption.

use eyre::{bail, Result};

use super::relation::{HeapRelation, Verdict};
use super::{TmResult, WaitPolicy};
use crate::error::AccessError;
use crate::mvcc::slot::pack_xmax;
use crate::mvcc::{read_visible, CurrentVersion, ReadMode, RecordCell};
use crate::router::RouteSynopsis;
use crate::storage::Page;
use crate::txn::{Snapshot, TxnId, TxnState, INVALID_XID};

/// What a lock call achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockReport {
    pub result: TmResult,
    /// Transaction behind a conflict, `INVALID_XID` otherwise.
    pub conflict_xid: TxnId,
    /// Update links followed before the lock was placed.
    pub hops: u32,
    /// The version the snapshot saw had been updated by a committed
    /// transaction.
    pub observed_updated: bool,
    /// Payload of the locked version on success.
    pub version: Option<Vec<u8>>,
}

impl LockReport {
    fn new() -> Self {
        Self {
            result: TmResult::Ok,
            conflict_xid: INVALID_XID,
            hops: 0,
            observed_updated: false,
            version: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == TmResult::Ok
    }
}

enum LockStep {
    Locked(Vec<u8>),
    Refuse(TmResult, TxnId),
    WaitFor(TxnId),
    Successor(TxnId),
    Retry,
}

impl From<Verdict> for LockStep {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Refuse(result, xid) => LockStep::Refuse(result, xid),
            Verdict::WaitFor(xid) => LockStep::WaitFor(xid),
            Verdict::Proceed(_) => LockStep::Retry,
        }
    }
}

impl HeapRelation {
    pub(crate) fn lock_row(
        &self,
        snapshot: &Snapshot<'_>,
        synopsis: &RouteSynopsis,
        wait: WaitPolicy,
        follow_updates: bool,
    ) -> Result<LockReport> {
        let _tier = self.tier_shared();
        let Some(located) = self.locate_row(synopsis)? else {
            bail!(AccessError::RowAbsent);
        };
        let page = &located.page;
        let item = located.addr.item;
        let Some(seen) = read_visible(
            page,
            item,
            snapshot,
            ReadMode::Read,
            self.chain(),
            self.config().read_retry_limit,
        )?
        else {
            bail!(AccessError::RowAbsent);
        };

        let cell = page.cell(item)?;
        let oracle = snapshot.oracle();
        let mut target = seen.stamp.xmin;
        let mut report = LockReport::new();

        loop {
            let latch = page.latch();
            match self.lock_step(page, cell, snapshot, target, wait)? {
                LockStep::Locked(payload) => {
                    tracing::trace!(target: "twinslot::access", %synopsis, hops = report.hops, "row locked");
                    report.version = Some(payload);
                    return Ok(report);
                }
                LockStep::Refuse(result, holder) => {
                    report.result = result;
                    report.conflict_xid = holder;
                    return Ok(report);
                }
                LockStep::WaitFor(holder) => {
                    drop(latch);
                    tracing::debug!(target: "twinslot::access", holder, "lock waiting for holder");
                    oracle.wait_for(holder);
                }
                LockStep::Successor(next) => {
                    report.observed_updated = true;
                    if !follow_updates {
                        report.result = TmResult::Updated;
                        report.conflict_xid = next;
                        return Ok(report);
                    }
                    report.hops += 1;
                    if report.hops > self.config().max_lock_hops {
                        bail!(AccessError::corruption(format!(
                            "update chain of {} exceeds {} hops",
                            synopsis,
                            self.config().max_lock_hops
                        )));
                    }
                    target = next;
                }
                LockStep::Retry => {}
            }
        }
    }

    /// One hop of the lock walk. Requires the page latch.
    fn lock_step(
        &self,
        page: &Page,
        cell: &RecordCell,
        snapshot: &Snapshot<'_>,
        target: TxnId,
        wait: WaitPolicy,
    ) -> Result<LockStep> {
        let oracle = snapshot.oracle();
        let xid = snapshot.own_xid();
        let Some(current) = self.current_or_restored(page, cell, oracle)? else {
            return Ok(LockStep::Refuse(TmResult::Deleted, INVALID_XID));
        };
        if current.stamp.xmin == target {
            return self.annotate(cell, current, snapshot, wait);
        }

        let other = cell.slot(current.side.other());
        let superseded = if other.is_used() && other.stamp().xmin == target {
            Some(other.stamp())
        } else {
            let head = cell.locator().load().chain_head();
            self.chain()
                .find_created_by(head, target)?
                .map(|entry| entry.stamp)
        };
        let successor = match superseded {
            Some(stamp)
                if stamp.xmax != INVALID_XID && oracle.state(stamp.xmax) != TxnState::Aborted =>
            {
                stamp.xmax
            }
            _ => current.stamp.xmin,
        };

        if successor == xid {
            return Ok(LockStep::Refuse(TmResult::SelfModified, xid));
        }
        match oracle.state(successor) {
            TxnState::Committed => Ok(LockStep::Successor(successor)),
            TxnState::Active => wait.on_busy(successor).map(LockStep::from),
            TxnState::Aborted => Ok(LockStep::Refuse(TmResult::Deleted, INVALID_XID)),
        }
    }

    /// Stamps the lock on the current version. Requires the page latch.
    fn annotate(
        &self,
        cell: &RecordCell,
        current: CurrentVersion,
        snapshot: &Snapshot<'_>,
        wait: WaitPolicy,
    ) -> Result<LockStep> {
        let oracle = snapshot.oracle();
        let xid = snapshot.own_xid();
        let stamp = current.stamp;
        let slot = cell.slot(current.side);

        if stamp.xmax != INVALID_XID {
            if stamp.xmax == xid {
                if !stamp.lock_only {
                    return Ok(LockStep::Refuse(TmResult::SelfModified, xid));
                }
                // SAFETY: the page latch excludes writers.
                return Ok(LockStep::Locked(unsafe { slot.copy_payload() }));
            }
            match oracle.state(stamp.xmax) {
                TxnState::Aborted => {}
                TxnState::Active => return wait.on_busy(stamp.xmax).map(LockStep::from),
                TxnState::Committed if stamp.lock_only => {}
                TxnState::Committed => {
                    if cell.moved_by(stamp.xmax).is_some() {
                        bail!(AccessError::SerializationFailure);
                    }
                    return Ok(LockStep::Refuse(TmResult::Deleted, stamp.xmax));
                }
            }
        }

        if !slot.cas_xmax(stamp.raw_xmax(), pack_xmax(xid, true)) {
            return Ok(LockStep::Retry);
        }
        // SAFETY: the page latch excludes writers.
        Ok(LockStep::Locked(unsafe { slot.copy_payload() }))
    }
}
