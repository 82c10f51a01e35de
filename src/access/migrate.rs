//! # Tier Migration
//!
//! Moves every surviving row of one partition up one tier level and retires
//! the partition's current generation.
//!
//! ```text
//! migrate_partition(level, number)
//!   1. tier lock (exclusive): no reader or writer is inside the relation
//!   2. horizon = oldest active snapshot xmin
//!   3. classify each row of (level, number):
//!        creator committed below horizon, no committed deleter → move
//!        deleter committed below horizon                       → drop
//!        anything newer than the horizon                       → refuse
//!   4. place moved rows at (level + 1, number) with creator FROZEN_XID,
//!      split into column groups when the upper tier is columnar
//!   5. repoint the secondary index; drop index entries of dropped rows
//!   6. bump the source generation, evict its pages
//! ```
//!
//! Every row moved is visible to every live snapshot, so freezing it loses
//! nothing. Synopses that still carry the retired generation fail with
//! `RowMoved` and are re-derived through the index.

use eyre::{bail, ensure, Result};

use super::relation::{live_key, split_groups, HeapRelation};
use crate::config::MAX_TIER_LEVEL;
use crate::encoding::merge_rows;
use crate::error::AccessError;
use crate::router::{PartitionKey, PhysicalAddress, RouteSynopsis, TierLayout};
use crate::txn::{TransactionOracle, TxnState, FROZEN_XID, INVALID_XID};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub source: PartitionKey,
    pub target: PartitionKey,
    pub moved: usize,
    pub dropped: usize,
    pub retired_generation: u32,
    pub pages_dropped: usize,
}

enum Fate {
    Move(Vec<u8>, Vec<u8>),
    Drop(Vec<u8>),
}

impl HeapRelation {
    pub fn migrate_partition(&self, level: u8, number: u32) -> Result<MigrationReport> {
        if !self.descriptor().is_tiered() {
            bail!(AccessError::NotTiered);
        }
        ensure!(
            level < MAX_TIER_LEVEL,
            "partition {}/{} is already in the top tier",
            level,
            number
        );

        let _tier = self.tier_exclusive();
        let catalog = self.router().catalog();
        let Some(source) = catalog.partition(level, number) else {
            bail!("partition {}/{} does not exist", level, number);
        };
        let oracle = self.oracle();
        let horizon = oracle.oldest_active();
        let generation = source.generation();

        let mut rows = Vec::new();
        for seq in 0..source.high_water() {
            let synopsis = RouteSynopsis {
                level,
                partition: number,
                generation,
                seq,
            };
            if let Some(fate) = self.classify(oracle, source.layout(), &synopsis, horizon)? {
                rows.push((synopsis, fate));
            }
        }

        let target = catalog.ensure_partition(level + 1, number)?;
        let moving = rows
            .iter()
            .filter(|(_, fate)| matches!(fate, Fate::Move(..)))
            .count();
        if target.remaining() < moving as u64 {
            bail!(AccessError::PartitionFull {
                level: level + 1,
                number,
            });
        }

        let mut report = MigrationReport {
            source: partition_key(level, number, generation),
            target: partition_key(level + 1, number, target.generation()),
            moved: 0,
            dropped: 0,
            retired_generation: generation,
            pages_dropped: 0,
        };
        for (old, fate) in rows {
            match fate {
                Fate::Move(key, row) => {
                    let new = RouteSynopsis {
                        level: level + 1,
                        partition: number,
                        generation: target.generation(),
                        seq: target.claim_seq()?,
                    };
                    let groups = split_groups(target.layout(), &row)?;
                    self.place_row(&new, &key, FROZEN_XID, 0, &groups)?;
                    self.router().index().repoint(&key, old, new, oracle);
                    report.moved += 1;
                }
                Fate::Drop(key) => {
                    self.router().index().remove(&key, old, oracle);
                    report.dropped += 1;
                }
            }
        }

        report.retired_generation = catalog.bump_generation(level, number)?;
        report.pages_dropped =
            self.pool()
                .drop_partition(self.rel_id(), level, number, report.retired_generation);
        tracing::info!(
            target: "twinslot::access",
            rel_id = self.rel_id(),
            level,
            number,
            moved = report.moved,
            dropped = report.dropped,
            pages = report.pages_dropped,
            "partition migrated"
        );
        Ok(report)
    }

    /// Decides what migration does with the row at `synopsis`. `None` for
    /// cells never published.
    fn classify(
        &self,
        oracle: &dyn TransactionOracle,
        layout: &TierLayout,
        synopsis: &RouteSynopsis,
        horizon: u64,
    ) -> Result<Option<Fate>> {
        let addr = synopsis.address(self.rel_id());
        let Some(page) = self.pool().read_page(addr.page) else {
            return Ok(None);
        };
        let cell = page.cell(addr.item)?;
        if !cell.is_live() {
            return Ok(None);
        }
        let _latch = page.latch();
        let key = live_key(cell)?;
        let Some(current) = self.current_or_restored(&page, cell, oracle)? else {
            return Ok(Some(Fate::Drop(key)));
        };
        let stamp = current.stamp;

        let creator_settled = stamp.xmin == FROZEN_XID
            || (stamp.xmin < horizon && oracle.state(stamp.xmin) == TxnState::Committed);
        ensure!(
            creator_settled,
            "row {} was created by transaction {} at or above horizon {}",
            synopsis,
            stamp.xmin,
            horizon
        );

        if stamp.xmax != INVALID_XID && !stamp.lock_only {
            match oracle.state(stamp.xmax) {
                TxnState::Aborted => {}
                TxnState::Committed if stamp.xmax < horizon => return Ok(Some(Fate::Drop(key))),
                _ => bail!(
                    "row {} has deleter {} at or above horizon {}",
                    synopsis,
                    stamp.xmax,
                    horizon
                ),
            }
        } else if stamp.lock_only && oracle.state(stamp.xmax) == TxnState::Active {
            bail!("row {} is locked by running transaction {}", synopsis, stamp.xmax);
        }

        // SAFETY: the page latch excludes writers.
        let payload = unsafe { cell.slot(current.side).copy_payload() };
        let row = self.gather_groups(oracle, layout, addr, payload)?;
        Ok(Some(Fate::Move(key, row)))
    }

    /// Full row of a column-grouped cell. Only called under the exclusive
    /// tier lock.
    fn gather_groups(
        &self,
        oracle: &dyn TransactionOracle,
        layout: &TierLayout,
        addr: PhysicalAddress,
        group0: Vec<u8>,
    ) -> Result<Vec<u8>> {
        if !layout.is_columnar() {
            return Ok(group0);
        }
        let mut parts = vec![group0];
        for group in 1..layout.group_count() as u16 {
            let target = addr.in_group(group);
            let Some(page) = self.pool().read_page(target.page) else {
                bail!(AccessError::corruption(format!(
                    "column group {} page missing for {:?}",
                    group, addr.page
                )));
            };
            let cell = page.cell(target.item)?;
            let _latch = page.latch();
            let Some(current) = cell.current_version(oracle) else {
                bail!(AccessError::corruption(format!(
                    "column group {} has no version for item {}",
                    group, addr.item
                )));
            };
            // SAFETY: the page latch excludes writers.
            parts.push(unsafe { cell.slot(current.side).copy_payload() });
        }
        merge_rows(&parts)
    }
}

fn partition_key(level: u8, number: u32, generation: u32) -> PartitionKey {
    PartitionKey {
        level,
        number,
        generation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessMethod, RowDescriptor, TmResult, WaitPolicy};
    use crate::config::EngineConfig;
    use crate::encoding::{decode_row, encode_row};
    use crate::mvcc::VersionChain;
    use crate::storage::BufferPool;
    use crate::txn::TransactionManager;
    use std::sync::Arc;

    fn relation(descriptor: RowDescriptor) -> (Arc<TransactionManager>, HeapRelation) {
        let txns = Arc::new(TransactionManager::new());
        let config = EngineConfig::builder().level0_partitions(1).build().unwrap();
        let rel = HeapRelation::open(
            1,
            descriptor,
            txns.clone(),
            Arc::new(BufferPool::new()),
            Arc::new(VersionChain::new()),
            config,
        )
        .unwrap();
        (txns, rel)
    }

    fn row(cols: &[&str]) -> Vec<u8> {
        let cols: Vec<Option<&[u8]>> = cols.iter().map(|c| Some(c.as_bytes())).collect();
        encode_row(&cols)
    }

    #[test]
    fn flat_relation_refuses_migration() {
        let (_txns, rel) = relation(RowDescriptor::Flat);
        let err = rel.migrate_partition(0, 0).unwrap_err();
        assert_eq!(AccessError::of(&err), Some(&AccessError::NotTiered));
    }

    #[test]
    fn migration_moves_live_rows_and_drops_deleted_ones() {
        let (txns, rel) = relation(RowDescriptor::Tiered {
            columnar_groups: None,
        });
        let t0 = txns.begin().unwrap();
        let keep = rel.insert(&t0.snapshot(), b"keep", b"kept").unwrap();
        let gone = rel.insert(&t0.snapshot(), b"gone", b"bye").unwrap();
        t0.commit();
        let t1 = txns.begin().unwrap();
        rel.delete(&t1.snapshot(), &gone, WaitPolicy::Error).unwrap();
        t1.commit();

        let report = rel.migrate_partition(0, 0).unwrap();
        assert_eq!((report.moved, report.dropped), (1, 1));
        assert_eq!(report.target.level, 1);
        assert!(report.pages_dropped >= 1);

        let reader = txns.begin().unwrap();
        let err = rel.fetch(&reader.snapshot(), &keep).unwrap_err();
        assert!(AccessError::is_row_moved(&err));
        let fresh = rel.relocate(b"keep").unwrap();
        assert_eq!(fresh.level, 1);
        assert_eq!(rel.fetch(&reader.snapshot(), &fresh).unwrap(), Some(b"kept".to_vec()));

        let err = rel.relocate(b"gone").unwrap_err();
        assert_eq!(AccessError::of(&err), Some(&AccessError::RowAbsent));
    }

    #[test]
    fn running_writer_blocks_migration() {
        let (txns, rel) = relation(RowDescriptor::Tiered {
            columnar_groups: None,
        });
        let t0 = txns.begin().unwrap();
        rel.insert(&t0.snapshot(), b"k", b"v").unwrap();
        assert!(rel.migrate_partition(0, 0).is_err());
        t0.commit();
        assert_eq!(rel.migrate_partition(0, 0).unwrap().moved, 1);
    }

    #[test]
    fn columnar_tier_serves_projections_and_moves_updates_down() {
        let (txns, rel) = relation(RowDescriptor::Tiered {
            columnar_groups: Some(vec![vec![0], vec![1]]),
        });
        let t0 = txns.begin().unwrap();
        rel.insert(&t0.snapshot(), b"k", &row(&["id", "name", "extra"])).unwrap();
        t0.commit();
        rel.migrate_partition(0, 0).unwrap();

        let syn = rel.relocate(b"k").unwrap();
        let reader = txns.begin().unwrap();
        let full = rel.fetch(&reader.snapshot(), &syn).unwrap().unwrap();
        assert_eq!(full, row(&["id", "name", "extra"]));
        let name = rel
            .fetch_columns(&reader.snapshot(), &syn, Some(&[1][..]))
            .unwrap()
            .unwrap();
        assert_eq!(decode_row(&name).unwrap()[1], Some(b"name".to_vec()));
        assert_eq!(decode_row(&name).unwrap()[0], None);

        let writer = txns.begin().unwrap();
        let out = rel
            .update(&writer.snapshot(), &syn, &row(&["id", "renamed", "extra"]), WaitPolicy::Error)
            .unwrap();
        assert_eq!(out.result, TmResult::Ok);
        let moved = out.synopsis.unwrap();
        assert_eq!(moved.level, 0);
        assert_eq!(rel.router().index().entry(b"k").unwrap().synopsis, moved);
        assert_eq!(rel.relocate(b"k").unwrap(), syn);
        writer.commit();
        assert_eq!(rel.relocate(b"k").unwrap(), moved);

        // The old snapshot still reads the frozen columnar version.
        assert_eq!(rel.fetch(&reader.snapshot(), &syn).unwrap(), Some(full));
        let later = txns.begin().unwrap();
        assert_eq!(rel.fetch(&later.snapshot(), &syn).unwrap(), None);
        assert_eq!(
            rel.fetch(&later.snapshot(), &moved).unwrap(),
            Some(row(&["id", "renamed", "extra"]))
        );

        let err = rel
            .update(&reader.snapshot(), &syn, &row(&["x", "y", "z"]), WaitPolicy::Error)
            .unwrap_err();
        assert_eq!(AccessError::of(&err), Some(&AccessError::SerializationFailure));
    }

    #[test]
    fn delete_after_aborted_move_reports_deleted() {
        let (txns, rel) = relation(RowDescriptor::Tiered {
            columnar_groups: Some(vec![vec![0], vec![1]]),
        });
        let t0 = txns.begin().unwrap();
        rel.insert(&t0.snapshot(), b"k", &row(&["id", "name"])).unwrap();
        t0.commit();
        rel.migrate_partition(0, 0).unwrap();
        let syn = rel.relocate(b"k").unwrap();

        let mover = txns.begin().unwrap();
        let out = rel
            .update(&mover.snapshot(), &syn, &row(&["id", "moved"]), WaitPolicy::Error)
            .unwrap();
        assert!(out.is_ok());
        mover.rollback();

        let old = txns.begin().unwrap();
        let deleter = txns.begin().unwrap();
        assert!(rel.delete(&deleter.snapshot(), &syn, WaitPolicy::Error).unwrap().is_ok());
        let deleter_id = deleter.id();
        deleter.commit();

        let out = rel.delete(&old.snapshot(), &syn, WaitPolicy::Error).unwrap();
        assert_eq!(out.result, TmResult::Deleted);
        assert_eq!(out.conflict_xid, deleter_id);
        let report = rel.lock(&old.snapshot(), &syn, WaitPolicy::Error, true).unwrap();
        assert_eq!(report.result, TmResult::Deleted);
    }
}
