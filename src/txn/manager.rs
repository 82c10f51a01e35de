//! # Transaction Manager
//!
//! Allocates transaction ids, tracks the active set in a fixed slot array
//! and records commit status. It implements [`TransactionOracle`], which is
//! all the storage layer ever sees of it.
//!
//! ## Memory Layout
//!
//! ```text
//! TransactionManager {
//!     next_xid: AtomicU64,                  // 8 bytes
//!     active_slots: [AtomicU64; 64],        // running xid per slot
//!     slot_horizons: [AtomicU64; 64],       // snapshot xmin per slot
//!     slot_lock: Mutex<()>,                 // serializes begin
//!     states: RwLock<HashMap<TxnId, TxnState>>,
//!     finish_lock + finished: Condvar,      // wait_for wakeups
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! - `begin` holds `slot_lock` while it allocates the xid, copies the set of
//!   running transactions into the snapshot and publishes its own slot, so
//!   no transaction can be running without appearing in a later snapshot.
//! - `commit`/`abort` record the final state *before* clearing the slot:
//!   a snapshot that no longer lists the xid always finds its final state.
//! - `oldest_active` is a lock-free scan over `slot_horizons`.

use eyre::{bail, Result};
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};

use super::snapshot::{Snapshot, SnapshotKind};
use super::{CommandId, TransactionOracle, TxnId, TxnState, FIRST_NORMAL_XID, FROZEN_XID, INVALID_XID};
use crate::config::MAX_CONCURRENT_TXNS;

pub struct TransactionManager {
    next_xid: AtomicU64,
    active_slots: [AtomicU64; MAX_CONCURRENT_TXNS],
    slot_horizons: [AtomicU64; MAX_CONCURRENT_TXNS],
    slot_lock: Mutex<()>,
    states: RwLock<HashMap<TxnId, TxnState>>,
    finish_lock: Mutex<()>,
    finished: Condvar,
}

impl TransactionManager {
    #[allow(clippy::declare_interior_mutable_const)]
    pub fn new() -> Self {
        const INIT: AtomicU64 = AtomicU64::new(0);
        Self {
            next_xid: AtomicU64::new(FIRST_NORMAL_XID),
            #[allow(clippy::borrow_interior_mutable_const)]
            active_slots: [INIT; MAX_CONCURRENT_TXNS],
            #[allow(clippy::borrow_interior_mutable_const)]
            slot_horizons: [INIT; MAX_CONCURRENT_TXNS],
            slot_lock: Mutex::new(()),
            states: RwLock::new(HashMap::new()),
            finish_lock: Mutex::new(()),
            finished: Condvar::new(),
        }
    }

    pub fn begin(&self) -> Result<Transaction<'_>> {
        let _guard = self.slot_lock.lock();

        let Some(slot_idx) = self
            .active_slots
            .iter()
            .position(|slot| slot.load(Ordering::Relaxed) == 0)
        else {
            bail!(
                "too many concurrent transactions (max {})",
                MAX_CONCURRENT_TXNS
            );
        };

        let xid = self.next_xid.fetch_add(1, Ordering::SeqCst);
        let in_progress: SmallVec<[TxnId; 16]> = self
            .active_slots
            .iter()
            .map(|slot| slot.load(Ordering::SeqCst))
            .filter(|&running| running != 0)
            .collect();
        let xmin = in_progress.iter().copied().min().unwrap_or(xid).min(xid);

        self.states.write().insert(xid, TxnState::Active);
        self.slot_horizons[slot_idx].store(xmin, Ordering::SeqCst);
        self.active_slots[slot_idx].store(xid, Ordering::SeqCst);

        tracing::trace!(target: "twinslot::txn", xid, xmin, running = in_progress.len(), "begin");

        Ok(Transaction {
            id: xid,
            slot_idx,
            state: TxnState::Active,
            command_id: 0,
            xmin,
            xmax: xid + 1,
            in_progress,
            manager: self,
            finished: false,
        })
    }

    fn finish(&self, xid: TxnId, slot_idx: usize, state: TxnState) {
        {
            let _guard = self.finish_lock.lock();
            self.states.write().insert(xid, state);
            self.active_slots[slot_idx].store(0, Ordering::SeqCst);
            self.slot_horizons[slot_idx].store(0, Ordering::SeqCst);
        }
        self.finished.notify_all();
        tracing::trace!(target: "twinslot::txn", xid, ?state, "finish");
    }

    /// Number of transactions currently holding a slot.
    pub fn active_count(&self) -> usize {
        self.active_slots
            .iter()
            .filter(|slot| slot.load(Ordering::Relaxed) != 0)
            .count()
    }

    /// Next xid that `begin` will hand out.
    pub fn peek_next_xid(&self) -> TxnId {
        self.next_xid.load(Ordering::SeqCst)
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionOracle for TransactionManager {
    fn state(&self, xid: TxnId) -> TxnState {
        match xid {
            INVALID_XID => TxnState::Aborted,
            FROZEN_XID => TxnState::Committed,
            _ => self
                .states
                .read()
                .get(&xid)
                .copied()
                .unwrap_or(TxnState::Aborted),
        }
    }

    fn oldest_active(&self) -> TxnId {
        let mut min_xid = self.next_xid.load(Ordering::SeqCst);
        for horizon in &self.slot_horizons {
            let xmin = horizon.load(Ordering::SeqCst);
            if xmin != 0 && xmin < min_xid {
                min_xid = xmin;
            }
        }
        min_xid
    }

    fn wait_for(&self, xid: TxnId) {
        let mut guard = self.finish_lock.lock();
        while self.state(xid) == TxnState::Active {
            self.finished.wait(&mut guard);
        }
    }
}

/// A running transaction. Dropping it without `commit` aborts it.
pub struct Transaction<'a> {
    id: TxnId,
    slot_idx: usize,
    state: TxnState,
    command_id: CommandId,
    xmin: TxnId,
    xmax: TxnId,
    in_progress: SmallVec<[TxnId; 16]>,
    manager: &'a TransactionManager,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn command_id(&self) -> CommandId {
        self.command_id
    }

    /// Starts the next command. Versions written by earlier commands of this
    /// transaction become visible to snapshots taken afterwards.
    pub fn next_command(&mut self) -> CommandId {
        self.command_id += 1;
        self.command_id
    }

    /// The transaction's MVCC snapshot at its current command.
    pub fn snapshot(&self) -> Snapshot<'a> {
        self.snapshot_of_kind(SnapshotKind::Mvcc)
    }

    pub fn snapshot_of_kind(&self, kind: SnapshotKind) -> Snapshot<'a> {
        Snapshot::new(
            kind,
            self.id,
            self.command_id,
            self.xmin,
            self.xmax,
            self.in_progress.clone(),
            self.manager,
        )
    }

    pub fn commit(mut self) -> TxnId {
        self.state = TxnState::Committed;
        self.finished = true;
        self.manager.finish(self.id, self.slot_idx, TxnState::Committed);
        self.id
    }

    pub fn rollback(mut self) {
        self.state = TxnState::Aborted;
        self.finished = true;
        self.manager.finish(self.id, self.slot_idx, TxnState::Aborted);
    }
}

impl<'a> Drop for Transaction<'a> {
    fn drop(&mut self) {
        if !self.finished {
            self.manager.finish(self.id, self.slot_idx, TxnState::Aborted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn xids_are_monotonic_and_never_reserved() {
        let mgr = TransactionManager::new();
        let t1 = mgr.begin().unwrap();
        let t2 = mgr.begin().unwrap();
        assert!(t1.id() >= FIRST_NORMAL_XID);
        assert!(t2.id() > t1.id());
    }

    #[test]
    fn commit_and_abort_are_recorded() {
        let mgr = TransactionManager::new();
        let t1 = mgr.begin().unwrap();
        let t2 = mgr.begin().unwrap();
        let (x1, x2) = (t1.id(), t2.id());
        assert_eq!(mgr.state(x1), TxnState::Active);
        t1.commit();
        t2.rollback();
        assert_eq!(mgr.state(x1), TxnState::Committed);
        assert_eq!(mgr.state(x2), TxnState::Aborted);
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn drop_aborts_unfinished_transaction() {
        let mgr = TransactionManager::new();
        let xid = {
            let txn = mgr.begin().unwrap();
            txn.id()
        };
        assert_eq!(mgr.state(xid), TxnState::Aborted);
    }

    #[test]
    fn oldest_active_tracks_snapshot_xmin() {
        let mgr = TransactionManager::new();
        let t1 = mgr.begin().unwrap();
        let t2 = mgr.begin().unwrap();
        let x1 = t1.id();
        assert_eq!(mgr.oldest_active(), x1);
        t1.commit();
        // t2's snapshot still lists t1 as running.
        assert_eq!(mgr.oldest_active(), x1);
        t2.commit();
        assert_eq!(mgr.oldest_active(), mgr.peek_next_xid());
    }

    #[test]
    fn slot_exhaustion_is_an_error() {
        let mgr = TransactionManager::new();
        let mut held = Vec::new();
        for _ in 0..MAX_CONCURRENT_TXNS {
            held.push(mgr.begin().unwrap());
        }
        assert!(mgr.begin().is_err());
        held.pop();
        assert!(mgr.begin().is_ok());
    }

    #[test]
    fn wait_for_returns_after_commit() {
        let mgr = Arc::new(TransactionManager::new());
        let xid = mgr.peek_next_xid();
        let ready = Arc::new(std::sync::Barrier::new(2));

        let holder = {
            let mgr = Arc::clone(&mgr);
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                let txn = mgr.begin().unwrap();
                ready.wait();
                thread::sleep(Duration::from_millis(20));
                txn.commit();
            })
        };

        ready.wait();
        mgr.wait_for(xid);
        assert_eq!(mgr.state(xid), TxnState::Committed);
        holder.join().unwrap();
    }
}
