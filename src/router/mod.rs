//! # Tiered Partition Router
//!
//! Maps a logical row to its physical position.
//!
//! ## Addressing
//!
//! ```text
//! RouteSynopsis { level, partition, generation, seq }
//!        │
//!        │ locate: generation must match the partition's current one
//!        v
//! PhysicalAddress {
//!     page: (rel, level, partition, generation, group, seq / TUPLES_PER_BLOCK),
//!     item: seq % TUPLES_PER_BLOCK,
//! }
//! ```
//!
//! A synopsis travels with a row reference and is never stored on the page.
//! It is trusted only while its generation matches; otherwise `locate` fails
//! with `RowMoved` and the caller re-derives it through `relocate`, which
//! consults the secondary index.
//!
//! ## Outcomes
//!
//! | Situation                             | Result       |
//! |---------------------------------------|--------------|
//! | generation current, seq handed out    | address      |
//! | partition unknown or generation stale | `RowMoved`   |
//! | seq beyond the partition high water   | `RowAbsent`  |
//! | `relocate`: key not in the index      | `RowAbsent`  |
//! | `relocate`: index entry keeps moving  | `RowMoved`   |
//!
//! `relocate` resolves to the row's committed home: a move made by an
//! update is followed only once the updating transaction commits.

pub mod catalog;
pub mod index;

use eyre::{bail, Result};
use std::fmt;

pub use catalog::{GroupList, PartitionState, TierCatalog, TierLayout};
pub use index::{IndexEntry, PendingMove, SecondaryIndex};

use crate::config::TUPLES_PER_BLOCK;
use crate::error::AccessError;
use crate::storage::PageKey;
use crate::txn::TransactionOracle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub level: u8,
    pub number: u32,
    pub generation: u32,
}

/// Compact route to a row: tier, partition, generation and the row's
/// sequence number within the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteSynopsis {
    pub level: u8,
    pub partition: u32,
    pub generation: u32,
    pub seq: u64,
}

impl RouteSynopsis {
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey {
            level: self.level,
            number: self.partition,
            generation: self.generation,
        }
    }

    /// Physical address in column group 0 of relation `rel`.
    pub fn address(&self, rel: u32) -> PhysicalAddress {
        PhysicalAddress {
            page: PageKey {
                rel,
                level: self.level,
                partition: self.partition,
                generation: self.generation,
                group: 0,
                block: (self.seq / TUPLES_PER_BLOCK as u64) as u32,
            },
            item: (self.seq % TUPLES_PER_BLOCK as u64) as u16,
        }
    }
}

impl fmt::Display for RouteSynopsis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "L{}/P{}@g{}#{}",
            self.level, self.partition, self.generation, self.seq
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysicalAddress {
    pub page: PageKey,
    pub item: u16,
}

impl PhysicalAddress {
    pub fn in_group(self, group: u16) -> Self {
        Self {
            page: self.page.in_group(group),
            ..self
        }
    }
}

/// Catalog plus secondary index of one relation: everything needed to
/// resolve a synopsis.
pub struct PartitionRouter {
    rel: u32,
    catalog: TierCatalog,
    index: SecondaryIndex,
    relocate_retry_limit: u32,
}

impl PartitionRouter {
    pub fn new(rel: u32, catalog: TierCatalog, relocate_retry_limit: u32) -> Self {
        Self {
            rel,
            catalog,
            index: SecondaryIndex::new(),
            relocate_retry_limit,
        }
    }

    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    pub fn index(&self) -> &SecondaryIndex {
        &self.index
    }

    pub fn locate(&self, synopsis: &RouteSynopsis) -> Result<PhysicalAddress> {
        let Some(partition) = self.catalog.partition(synopsis.level, synopsis.partition) else {
            bail!(AccessError::RowMoved {
                synopsis: *synopsis
            });
        };
        if partition.generation() != synopsis.generation {
            tracing::debug!(
                target: "twinslot::router",
                %synopsis,
                current = partition.generation(),
                "stale synopsis"
            );
            bail!(AccessError::RowMoved {
                synopsis: *synopsis
            });
        }
        if synopsis.seq >= partition.high_water() {
            bail!(AccessError::RowAbsent);
        }
        Ok(synopsis.address(self.rel))
    }

    /// Fresh synopsis for `key` from the secondary index.
    pub fn relocate(&self, key: &[u8], oracle: &dyn TransactionOracle) -> Result<RouteSynopsis> {
        for attempt in 0..self.relocate_retry_limit {
            let Some(synopsis) = self.index.lookup(key, oracle) else {
                tracing::debug!(target: "twinslot::router", attempt, "relocate: key not indexed");
                bail!(AccessError::RowAbsent);
            };
            match self.locate(&synopsis) {
                Ok(_) => {
                    tracing::debug!(target: "twinslot::router", %synopsis, attempt, "relocated");
                    return Ok(synopsis);
                }
                Err(e) if AccessError::is_row_moved(&e) => std::thread::yield_now(),
                Err(e) => return Err(e),
            }
        }
        let Some(synopsis) = self.index.lookup(key, oracle) else {
            bail!(AccessError::RowAbsent);
        };
        bail!(AccessError::RowMoved { synopsis })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::snapshot::tests::ScriptedOracle;

    fn router() -> PartitionRouter {
        PartitionRouter::new(1, TierCatalog::new(4, TierLayout::Row), 3)
    }

    #[test]
    fn address_splits_seq_into_block_and_item() {
        let syn = RouteSynopsis {
            level: 1,
            partition: 2,
            generation: 3,
            seq: TUPLES_PER_BLOCK as u64 * 5 + 7,
        };
        let addr = syn.address(9);
        assert_eq!((addr.page.rel, addr.page.block, addr.item), (9, 5, 7));
        assert_eq!(addr.in_group(2).page.group, 2);
        assert_eq!(syn.partition_key().generation, 3);
    }

    #[test]
    fn locate_distinguishes_moved_from_absent() {
        let router = router();
        let part = router.catalog().ensure_partition(0, 0).unwrap();
        let seq = part.claim_seq().unwrap();
        let live = RouteSynopsis { level: 0, partition: 0, generation: 1, seq };

        assert!(router.locate(&live).is_ok());

        let beyond = RouteSynopsis { seq: seq + 1, ..live };
        let err = router.locate(&beyond).unwrap_err();
        assert_eq!(AccessError::of(&err), Some(&AccessError::RowAbsent));

        let stale = RouteSynopsis { generation: 0, ..live };
        assert!(AccessError::is_row_moved(&router.locate(&stale).unwrap_err()));

        let unknown = RouteSynopsis { partition: 9, ..live };
        assert!(AccessError::is_row_moved(&router.locate(&unknown).unwrap_err()));
    }

    #[test]
    fn relocate_follows_the_index() {
        let router = router();
        let part = router.catalog().ensure_partition(0, 0).unwrap();
        let seq = part.claim_seq().unwrap();
        let syn = RouteSynopsis { level: 0, partition: 0, generation: 1, seq };
        router.index().insert(b"k", syn);
        let oracle = ScriptedOracle::default();
        assert_eq!(router.relocate(b"k", &oracle).unwrap(), syn);

        let err = router.relocate(b"missing", &oracle).unwrap_err();
        assert_eq!(AccessError::of(&err), Some(&AccessError::RowAbsent));
    }

    #[test]
    fn relocate_gives_up_on_stale_index_entry() {
        let router = router();
        router.catalog().ensure_partition(0, 0).unwrap();
        let stale = RouteSynopsis { level: 0, partition: 0, generation: 7, seq: 0 };
        router.index().insert(b"k", stale);
        let err = router.relocate(b"k", &ScriptedOracle::default()).unwrap_err();
        assert!(AccessError::is_row_moved(&err));
    }
}
