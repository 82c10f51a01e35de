//! # Heap Relations
//!
//! `HeapRelation` implements [`AccessMethod`] over dual-slot record cells.
//!
//! ## Write Path
//!
//! ```text
//! update(snapshot, synopsis, row)
//!   1. tier lock (shared)
//!   2. locate synopsis → pinned group-0 page
//!   3. loop:
//!        latch page
//!        examine current version ── Refuse ──> TmOutcome
//!             │                  └─ WaitFor ──> unlatch, wait, retry
//!             │ Proceed
//!             v
//!        row tier:      overwrite_other_slot (copy-on-write)
//!        columnar tier: insert at level 0, stamp xmax, record moved_to
//! ```
//!
//! ## Examining the Current Version
//!
//! The current version is the newest in-place version whose creator did not
//! abort. If both slots hold aborted versions, the newest live chain entry
//! is restored into a slot first.
//!
//! | Current version                              | Verdict              |
//! |----------------------------------------------|----------------------|
//! | none                                         | `Deleted`            |
//! | created by us at this command or later       | `SelfModified`       |
//! | invisible, creator still running             | wait policy          |
//! | invisible, created after our snapshot        | `Updated`            |
//! | xmax empty, aborted or our own lock          | proceed              |
//! | xmax ours (not a lock)                       | `SelfModified`       |
//! | xmax running elsewhere                       | wait policy          |
//! | xmax committed lock                          | proceed              |
//! | xmax committed, that xmax moved the row out  | `SerializationFailure` |
//! | xmax committed                               | `Deleted`            |
//!
//! A version locked by this transaction is updatable even when the snapshot
//! cannot see it: that is how a writer that lost a race locks the newest
//! version and then updates it.
//!
//! ## Lock Order
//!
//! An update in a column-grouped tier inserts the new version at level 0
//! while holding the latch of the upper-level page. Latches are therefore
//! taken from higher levels to lower, never the reverse.

use eyre::{bail, ensure, Result};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

use super::lock::LockReport;
use super::scan::Scan;
use super::{AccessMethod, RowDescriptor, TmOutcome, TmResult, WaitPolicy};
use crate::config::{EngineConfig, MAX_ROW_PAYLOAD};
use crate::encoding::{decode_row, merge_rows, restrict_row};
use crate::error::AccessError;
use crate::mvcc::{read_visible, CurrentVersion, ReadMode, RecordCell, VersionChain};
use crate::router::{
    PartitionRouter, PartitionState, PhysicalAddress, RouteSynopsis, TierCatalog, TierLayout,
};
use crate::storage::{BufferPool, Page, PageHandle};
use crate::txn::{CommandId, Snapshot, TransactionOracle, TxnId, TxnState, INVALID_XID};

pub struct HeapRelation {
    rel_id: u32,
    descriptor: RowDescriptor,
    oracle: Arc<dyn TransactionOracle>,
    pool: Arc<BufferPool>,
    chain: Arc<VersionChain>,
    router: PartitionRouter,
    tier_lock: RwLock<()>,
    config: EngineConfig,
}

/// Outcome of examining a row for modification. Requires the page latch.
pub(crate) enum Verdict {
    Proceed(CurrentVersion),
    Refuse(TmResult, TxnId),
    WaitFor(TxnId),
}

impl WaitPolicy {
    pub(crate) fn on_busy(self, holder: TxnId) -> Result<Verdict> {
        match self {
            WaitPolicy::Block => Ok(Verdict::WaitFor(holder)),
            WaitPolicy::Skip => Ok(Verdict::Refuse(TmResult::WouldBlock, holder)),
            WaitPolicy::Error => bail!(AccessError::LockNotAvailable { xid: holder }),
        }
    }
}

/// A located row: its partition, address and pinned group-0 page.
pub(crate) struct RowHandle {
    pub partition: Arc<PartitionState>,
    pub addr: PhysicalAddress,
    pub page: PageHandle,
}

#[derive(Clone, Copy)]
enum Change<'p> {
    Update(&'p [u8]),
    Delete,
}

fn check_row_size(row: &[u8]) -> Result<()> {
    if row.len() > MAX_ROW_PAYLOAD {
        bail!(AccessError::RowTooLarge {
            size: row.len(),
            max: MAX_ROW_PAYLOAD,
        });
    }
    Ok(())
}

pub(crate) fn live_key(cell: &RecordCell) -> Result<Vec<u8>> {
    match cell.key() {
        Some(key) => Ok(key.to_vec()),
        None => bail!(AccessError::corruption("live record cell without a key")),
    }
}

/// Splits a full row into per-group payloads, group 0 first.
pub(crate) fn split_groups(layout: &TierLayout, row: &[u8]) -> Result<Vec<(u16, Vec<u8>)>> {
    let TierLayout::Columnar { groups } = layout else {
        return Ok(vec![(0, row.to_vec())]);
    };
    let width = decode_row(row)?.len();
    let mut out = Vec::with_capacity(groups.len());
    for group in 0..groups.len() as u16 {
        let columns: Vec<usize> = match layout.group_columns(group)? {
            Some(columns) => columns.to_vec(),
            None => (0..width).filter(|&c| layout.group_of(c) == group).collect(),
        };
        out.push((group, restrict_row(row, &columns)?));
    }
    Ok(out)
}

impl HeapRelation {
    pub fn open(
        rel_id: u32,
        descriptor: RowDescriptor,
        oracle: Arc<dyn TransactionOracle>,
        pool: Arc<BufferPool>,
        chain: Arc<VersionChain>,
        config: EngineConfig,
    ) -> Result<Self> {
        let upper = match &descriptor {
            RowDescriptor::Tiered {
                columnar_groups: Some(groups),
            } => {
                ensure!(
                    !groups.is_empty() && groups.iter().all(|g| !g.is_empty()),
                    "column groups must be non-empty"
                );
                TierLayout::Columnar {
                    groups: groups.clone(),
                }
            }
            _ => TierLayout::Row,
        };
        let catalog = TierCatalog::new(config.blocks_per_partition, upper);
        for number in 0..config.level0_partitions {
            catalog.ensure_partition(0, number)?;
        }
        tracing::debug!(target: "twinslot::access", rel_id, ?descriptor, "relation opened");
        Ok(Self {
            rel_id,
            descriptor,
            oracle,
            pool,
            chain,
            router: PartitionRouter::new(rel_id, catalog, config.relocate_retry_limit),
            tier_lock: RwLock::new(()),
            config,
        })
    }

    pub fn rel_id(&self) -> u32 {
        self.rel_id
    }

    pub fn descriptor(&self) -> &RowDescriptor {
        &self.descriptor
    }

    pub(crate) fn oracle(&self) -> &dyn TransactionOracle {
        &*self.oracle
    }

    pub fn router(&self) -> &PartitionRouter {
        &self.router
    }

    pub fn chain(&self) -> &VersionChain {
        &self.chain
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared tier lock. Recursive so a scan can fetch while it holds one.
    pub(crate) fn tier_shared(&self) -> RwLockReadGuard<'_, ()> {
        self.tier_lock.read_recursive()
    }

    pub(crate) fn tier_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.tier_lock.write()
    }

    /// Fresh synopsis for `key` after `RowMoved`. A row moved by an update
    /// resolves to its new home once the updater commits, and to the old
    /// one until then.
    pub fn relocate(&self, key: &[u8]) -> Result<RouteSynopsis> {
        let _tier = self.tier_shared();
        self.router.relocate(key, &*self.oracle)
    }

    pub(crate) fn locate_row(&self, synopsis: &RouteSynopsis) -> Result<Option<RowHandle>> {
        let addr = self.router.locate(synopsis)?;
        let Some(partition) = self
            .router
            .catalog()
            .partition(synopsis.level, synopsis.partition)
        else {
            bail!(AccessError::RowMoved {
                synopsis: *synopsis
            });
        };
        Ok(self
            .pool
            .read_page(addr.page)
            .map(|page| RowHandle {
                partition,
                addr,
                page,
            }))
    }

    /// Visible row at `synopsis`, merged across column groups and restricted
    /// to `projection` when one is given.
    pub fn fetch_columns(
        &self,
        snapshot: &Snapshot<'_>,
        synopsis: &RouteSynopsis,
        projection: Option<&[usize]>,
    ) -> Result<Option<Vec<u8>>> {
        let _tier = self.tier_shared();
        let Some(row) = self.locate_row(synopsis)? else {
            return Ok(None);
        };
        let Some(version) = read_visible(
            &row.page,
            row.addr.item,
            snapshot,
            ReadMode::Read,
            &self.chain,
            self.config.read_retry_limit,
        )?
        else {
            return Ok(None);
        };
        self.complete_row(snapshot, row.partition.layout(), row.addr, version.payload, projection)
            .map(Some)
    }

    /// Merges the other column groups `projection` needs into a group-0
    /// payload, then applies the projection.
    pub(crate) fn complete_row(
        &self,
        snapshot: &Snapshot<'_>,
        layout: &TierLayout,
        addr: PhysicalAddress,
        payload: Vec<u8>,
        projection: Option<&[usize]>,
    ) -> Result<Vec<u8>> {
        let row = if layout.is_columnar() {
            let groups = match projection {
                Some(columns) => layout.groups_for(columns),
                None => layout.all_groups(),
            };
            let mut parts = vec![payload];
            for &group in groups.iter().filter(|&&g| g != 0) {
                let target = addr.in_group(group);
                let Some(page) = self.pool.read_page(target.page) else {
                    bail!(AccessError::corruption(format!(
                        "column group {} page missing for {:?}",
                        group, addr.page
                    )));
                };
                let Some(part) = read_visible(
                    &page,
                    target.item,
                    snapshot,
                    ReadMode::Read,
                    &self.chain,
                    self.config.read_retry_limit,
                )?
                else {
                    bail!(AccessError::corruption(format!(
                        "column group {} has no version for item {}",
                        group, addr.item
                    )));
                };
                parts.push(part.payload);
            }
            merge_rows(&parts)?
        } else {
            payload
        };
        match projection {
            Some(columns) => restrict_row(&row, columns),
            None => Ok(row),
        }
    }

    /// Writes the first version of a row into every group cell. Group 0 is
    /// written last so a visible row always has its other groups.
    pub(crate) fn place_row(
        &self,
        synopsis: &RouteSynopsis,
        key: &[u8],
        xmin: TxnId,
        cmin: CommandId,
        groups: &[(u16, Vec<u8>)],
    ) -> Result<()> {
        let addr = synopsis.address(self.rel_id);
        for (group, payload) in groups.iter().rev() {
            let target = addr.in_group(*group);
            let page = self.pool.read_or_create(target.page);
            {
                let _latch = page.latch();
                page.cell(target.item)?.initialize(key, xmin, cmin, payload)?;
            }
            page.raise_high_water(target.item);
        }
        Ok(())
    }

    fn claim_level0(&self, key: &[u8]) -> Result<(Arc<PartitionState>, u64)> {
        let partitions = self.router.catalog().partitions_at(0);
        ensure!(!partitions.is_empty(), "relation has no level 0 partitions");
        let start = (self.router.index().key_hash(key) % partitions.len() as u64) as usize;
        for i in 0..partitions.len() {
            let partition = &partitions[(start + i) % partitions.len()];
            match partition.claim_seq() {
                Ok(seq) => return Ok((Arc::clone(partition), seq)),
                Err(e) if matches!(AccessError::of(&e), Some(AccessError::PartitionFull { .. })) => {
                    continue
                }
                Err(e) => return Err(e),
            }
        }
        bail!(AccessError::PartitionFull {
            level: 0,
            number: partitions[start].number(),
        })
    }

    fn insert_level0(&self, key: &[u8], row: &[u8], xid: TxnId, cid: CommandId) -> Result<RouteSynopsis> {
        let (partition, seq) = self.claim_level0(key)?;
        let synopsis = RouteSynopsis {
            level: 0,
            partition: partition.number(),
            generation: partition.generation(),
            seq,
        };
        self.place_row(&synopsis, key, xid, cid, &[(0, row.to_vec())])?;
        Ok(synopsis)
    }

    pub(crate) fn current_or_restored(
        &self,
        page: &Page,
        cell: &RecordCell,
        oracle: &dyn TransactionOracle,
    ) -> Result<Option<CurrentVersion>> {
        match cell.current_version(oracle) {
            Some(current) => Ok(Some(current)),
            None => cell.restore_from_chain(page, &self.chain, oracle, self.config.writer_spin_limit),
        }
    }

    /// Decides whether `snapshot`'s transaction may modify the row now.
    /// Requires the page latch.
    pub(crate) fn examine(
        &self,
        page: &Page,
        cell: &RecordCell,
        snapshot: &Snapshot<'_>,
        wait: WaitPolicy,
    ) -> Result<Verdict> {
        let oracle = snapshot.oracle();
        let xid = snapshot.own_xid();
        let Some(current) = self.current_or_restored(page, cell, oracle)? else {
            return Ok(Verdict::Refuse(TmResult::Deleted, INVALID_XID));
        };
        let stamp = current.stamp;

        if stamp.xmin == xid && stamp.cmin >= snapshot.current_command_id() {
            return Ok(Verdict::Refuse(TmResult::SelfModified, xid));
        }

        let locked_by_me = stamp.lock_only && stamp.xmax == xid;
        if !locked_by_me && !snapshot.is_version_visible(&stamp) {
            if snapshot.is_running_elsewhere(stamp.xmin) {
                return wait.on_busy(stamp.xmin);
            }
            if !snapshot.sees_xid(stamp.xmin) {
                let has_history = cell.slot(current.side.other()).is_used()
                    || cell.locator().load().has_chain();
                if !has_history {
                    bail!(AccessError::RowAbsent);
                }
                return Ok(Verdict::Refuse(TmResult::Updated, stamp.xmin));
            }
        }

        let xmax = stamp.xmax;
        if xmax == INVALID_XID {
            return Ok(Verdict::Proceed(current));
        }
        if xmax == xid {
            return Ok(if stamp.lock_only {
                Verdict::Proceed(current)
            } else {
                Verdict::Refuse(TmResult::SelfModified, xid)
            });
        }
        match oracle.state(xmax) {
            TxnState::Aborted => Ok(Verdict::Proceed(current)),
            TxnState::Active => wait.on_busy(xmax),
            TxnState::Committed if stamp.lock_only => Ok(Verdict::Proceed(current)),
            TxnState::Committed => {
                if cell.moved_by(xmax).is_some() {
                    bail!(AccessError::SerializationFailure);
                }
                Ok(Verdict::Refuse(TmResult::Deleted, xmax))
            }
        }
    }

    fn modify(
        &self,
        snapshot: &Snapshot<'_>,
        synopsis: &RouteSynopsis,
        wait: WaitPolicy,
        change: Change<'_>,
    ) -> Result<TmOutcome> {
        if let Change::Update(row) = change {
            check_row_size(row)?;
        }
        let _tier = self.tier_shared();
        let Some(located) = self.locate_row(synopsis)? else {
            bail!(AccessError::RowAbsent);
        };
        let page = &located.page;
        let cell = page.cell(located.addr.item)?;
        if !cell.is_live() {
            bail!(AccessError::RowAbsent);
        }
        let oracle = snapshot.oracle();
        let (xid, cid) = (snapshot.own_xid(), snapshot.current_command_id());

        loop {
            let latch = page.latch();
            let current = match self.examine(page, cell, snapshot, wait)? {
                Verdict::Proceed(current) => current,
                Verdict::Refuse(result, holder) => {
                    tracing::debug!(target: "twinslot::access", xid, holder, ?result, "modify refused");
                    return Ok(TmOutcome::conflict(result, holder));
                }
                Verdict::WaitFor(holder) => {
                    drop(latch);
                    tracing::debug!(target: "twinslot::access", xid, holder, "waiting for row holder");
                    oracle.wait_for(holder);
                    continue;
                }
            };

            return match change {
                Change::Delete => {
                    cell.slot(current.side).set_xmax(xid, false, cid);
                    tracing::trace!(target: "twinslot::access", %synopsis, xid, "row deleted");
                    Ok(TmOutcome::ok(*synopsis))
                }
                Change::Update(row) if located.partition.layout().is_columnar() => {
                    let key = live_key(cell)?;
                    let moved = self.insert_level0(&key, row, xid, cid)?;
                    cell.slot(current.side).set_xmax(xid, false, cid);
                    cell.set_moved_to(xid, moved);
                    drop(latch);
                    if !self
                        .router
                        .index()
                        .begin_move(&key, *synopsis, moved, xid, oracle)
                    {
                        tracing::debug!(target: "twinslot::access", %synopsis, "index entry no longer names the moved row");
                    }
                    tracing::debug!(target: "twinslot::access", from = %synopsis, to = %moved, xid, "row moved to level 0");
                    Ok(TmOutcome::ok(moved))
                }
                Change::Update(row) => {
                    cell.overwrite_other_slot(
                        page,
                        &self.chain,
                        oracle,
                        self.rel_id,
                        current.side,
                        xid,
                        cid,
                        row,
                        self.config.writer_spin_limit,
                    )?;
                    tracing::trace!(target: "twinslot::access", %synopsis, xid, "row updated in place");
                    Ok(TmOutcome::ok(*synopsis))
                }
            };
        }
    }
}

impl AccessMethod for HeapRelation {
    fn insert(&self, snapshot: &Snapshot<'_>, key: &[u8], row: &[u8]) -> Result<RouteSynopsis> {
        check_row_size(row)?;
        let _tier = self.tier_shared();
        let synopsis =
            self.insert_level0(key, row, snapshot.own_xid(), snapshot.current_command_id())?;
        self.router.index().insert(key, synopsis);
        tracing::trace!(target: "twinslot::access", %synopsis, xid = snapshot.own_xid(), "row inserted");
        Ok(synopsis)
    }

    fn update(
        &self,
        snapshot: &Snapshot<'_>,
        synopsis: &RouteSynopsis,
        row: &[u8],
        wait: WaitPolicy,
    ) -> Result<TmOutcome> {
        self.modify(snapshot, synopsis, wait, Change::Update(row))
    }

    fn delete(
        &self,
        snapshot: &Snapshot<'_>,
        synopsis: &RouteSynopsis,
        wait: WaitPolicy,
    ) -> Result<TmOutcome> {
        self.modify(snapshot, synopsis, wait, Change::Delete)
    }

    fn lock(
        &self,
        snapshot: &Snapshot<'_>,
        synopsis: &RouteSynopsis,
        wait: WaitPolicy,
        follow_updates: bool,
    ) -> Result<LockReport> {
        self.lock_row(snapshot, synopsis, wait, follow_updates)
    }

    fn fetch(&self, snapshot: &Snapshot<'_>, synopsis: &RouteSynopsis) -> Result<Option<Vec<u8>>> {
        self.fetch_columns(snapshot, synopsis, None)
    }

    fn scan<'a>(&'a self, snapshot: &'a Snapshot<'a>) -> Scan<'a> {
        Scan::new(self, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{decode_row, encode_row};
    use crate::txn::TransactionManager;

    fn relation(descriptor: RowDescriptor) -> (Arc<TransactionManager>, HeapRelation) {
        let txns = Arc::new(TransactionManager::new());
        let rel = HeapRelation::open(
            1,
            descriptor,
            txns.clone(),
            Arc::new(BufferPool::new()),
            Arc::new(VersionChain::new()),
            EngineConfig::default(),
        )
        .unwrap();
        (txns, rel)
    }

    #[test]
    fn insert_then_read_after_commit() {
        let (txns, rel) = relation(RowDescriptor::Flat);

        let t1 = txns.begin().unwrap();
        let syn = rel.insert(&t1.snapshot(), b"k1", b"a").unwrap();
        assert_eq!(rel.router().index().lookup(b"k1", &*txns), Some(syn));
        // Same command: not yet visible to itself.
        assert_eq!(rel.fetch(&t1.snapshot(), &syn).unwrap(), None);
        t1.commit();

        let t2 = txns.begin().unwrap();
        assert_eq!(rel.fetch(&t2.snapshot(), &syn).unwrap(), Some(b"a".to_vec()));
    }

    #[test]
    fn own_update_then_update_again_in_same_command_is_self_modified() {
        let (txns, rel) = relation(RowDescriptor::Flat);
        let mut t1 = txns.begin().unwrap();
        let syn = rel.insert(&t1.snapshot(), b"k", b"v0").unwrap();
        t1.next_command();

        let out = rel.update(&t1.snapshot(), &syn, b"v1", WaitPolicy::Error).unwrap();
        assert!(out.is_ok());
        let again = rel.update(&t1.snapshot(), &syn, b"v2", WaitPolicy::Error).unwrap();
        assert_eq!(again.result, TmResult::SelfModified);

        t1.next_command();
        assert_eq!(rel.fetch(&t1.snapshot(), &syn).unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn delete_hides_row_from_later_snapshots() {
        let (txns, rel) = relation(RowDescriptor::Flat);
        let t1 = txns.begin().unwrap();
        let syn = rel.insert(&t1.snapshot(), b"k", b"v").unwrap();
        t1.commit();

        let reader = txns.begin().unwrap();
        let t2 = txns.begin().unwrap();
        assert!(rel.delete(&t2.snapshot(), &syn, WaitPolicy::Error).unwrap().is_ok());
        t2.commit();

        assert_eq!(rel.fetch(&reader.snapshot(), &syn).unwrap(), Some(b"v".to_vec()));
        let later = txns.begin().unwrap();
        assert_eq!(rel.fetch(&later.snapshot(), &syn).unwrap(), None);
        let out = rel.delete(&later.snapshot(), &syn, WaitPolicy::Error).unwrap();
        assert_eq!(out.result, TmResult::Deleted);
    }

    #[test]
    fn busy_row_follows_wait_policy() {
        let (txns, rel) = relation(RowDescriptor::Flat);
        let t1 = txns.begin().unwrap();
        let syn = rel.insert(&t1.snapshot(), b"k", b"v").unwrap();
        t1.commit();

        let holder = txns.begin().unwrap();
        let other = txns.begin().unwrap();
        assert!(rel.update(&holder.snapshot(), &syn, b"h", WaitPolicy::Error).unwrap().is_ok());

        let skipped = rel.update(&other.snapshot(), &syn, b"o", WaitPolicy::Skip).unwrap();
        assert_eq!(skipped.result, TmResult::WouldBlock);
        assert_eq!(skipped.conflict_xid, holder.id());

        let err = rel.update(&other.snapshot(), &syn, b"o", WaitPolicy::Error).unwrap_err();
        assert_eq!(
            AccessError::of(&err),
            Some(&AccessError::LockNotAvailable { xid: holder.id() })
        );
    }

    #[test]
    fn aborted_update_leaves_previous_version_current() {
        let (txns, rel) = relation(RowDescriptor::Flat);
        let t1 = txns.begin().unwrap();
        let syn = rel.insert(&t1.snapshot(), b"k", b"v1").unwrap();
        t1.commit();

        let t2 = txns.begin().unwrap();
        rel.update(&t2.snapshot(), &syn, b"bad", WaitPolicy::Error).unwrap();
        t2.rollback();

        let t3 = txns.begin().unwrap();
        assert!(rel.update(&t3.snapshot(), &syn, b"v2", WaitPolicy::Error).unwrap().is_ok());
        t3.commit();
        let t4 = txns.begin().unwrap();
        assert_eq!(rel.fetch(&t4.snapshot(), &syn).unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn oversized_row_is_rejected() {
        let (txns, rel) = relation(RowDescriptor::Flat);
        let t1 = txns.begin().unwrap();
        let err = rel
            .insert(&t1.snapshot(), b"k", &vec![0; MAX_ROW_PAYLOAD + 1])
            .unwrap_err();
        assert!(matches!(AccessError::of(&err), Some(AccessError::RowTooLarge { .. })));
    }

    #[test]
    fn split_groups_covers_every_column_once() {
        let layout = TierLayout::Columnar {
            groups: vec![vec![0], vec![2]],
        };
        let row = encode_row(&[Some(&b"a"[..]), Some(&b"b"[..]), Some(&b"c"[..]), None]);
        let parts = split_groups(&layout, &row).unwrap();
        assert_eq!(parts.len(), 2);
        let g0 = decode_row(&parts[0].1).unwrap();
        let g1 = decode_row(&parts[1].1).unwrap();
        assert_eq!(g0, vec![Some(b"a".to_vec()), None, None, None]);
        // Last group holds its own column plus every unnamed one.
        assert_eq!(g1, vec![None, Some(b"b".to_vec()), Some(b"c".to_vec()), None]);
        let merged = merge_rows(&[parts[0].1.clone(), parts[1].1.clone()]).unwrap();
        assert_eq!(merged, row);
    }
}
