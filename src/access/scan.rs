//! # Sequential Scans
//!
//! A scan walks every partition of a relation in `(level, number)` order,
//! block by block, and yields the version of each row its snapshot sees.
//!
//! ```text
//! Init ──> NextBlock(part, block) ──> InPage(page, item) ──┐
//!              ^   │ no more blocks: next partition          │ item ≥ high water
//!              │   └─ no more partitions: Done               │
//!              └─────────────────────────────────────────────┘
//! ```
//!
//! The scan holds the relation's tier lock in shared mode for its whole
//! lifetime, so partitions cannot migrate underneath it. The interrupt flag
//! is polled before each page; a set flag ends the scan with `Cancelled`.

use eyre::{eyre, Result};
use parking_lot::RwLockReadGuard;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::relation::HeapRelation;
use crate::config::TUPLES_PER_BLOCK;
use crate::error::AccessError;
use crate::mvcc::{read_visible, ReadMode};
use crate::router::{PartitionState, PhysicalAddress, RouteSynopsis};
use crate::storage::PageHandle;
use crate::txn::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanItem {
    pub synopsis: RouteSynopsis,
    pub row: Vec<u8>,
}

enum ScanState {
    Init,
    NextBlock {
        part: usize,
        block: u32,
    },
    InPage {
        part: usize,
        block: u32,
        page: PageHandle,
        item: u16,
    },
    Done,
}

pub struct Scan<'a> {
    relation: &'a HeapRelation,
    snapshot: &'a Snapshot<'a>,
    _tier: RwLockReadGuard<'a, ()>,
    scope: Vec<Arc<PartitionState>>,
    projection: Option<Vec<usize>>,
    interrupt: Option<&'a AtomicBool>,
    state: ScanState,
}

impl<'a> Scan<'a> {
    pub fn new(relation: &'a HeapRelation, snapshot: &'a Snapshot<'a>) -> Self {
        let tier = relation.tier_shared();
        let scope = relation.router().catalog().scan_scope();
        Self {
            relation,
            snapshot,
            _tier: tier,
            scope,
            projection: None,
            interrupt: None,
            state: ScanState::Init,
        }
    }

    /// Restricts every yielded row to `columns`; the rest read as NULL.
    pub fn with_projection(mut self, columns: &[usize]) -> Self {
        self.projection = Some(columns.to_vec());
        self
    }

    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    fn read_item(
        &self,
        partition: &PartitionState,
        page: &PageHandle,
        item: u16,
    ) -> Result<Option<Vec<u8>>> {
        let Some(version) = read_visible(
            page,
            item,
            self.snapshot,
            ReadMode::Read,
            self.relation.chain(),
            self.relation.config().read_retry_limit,
        )?
        else {
            return Ok(None);
        };
        let addr = PhysicalAddress {
            page: page.key(),
            item,
        };
        self.relation
            .complete_row(
                self.snapshot,
                partition.layout(),
                addr,
                version.payload,
                self.projection.as_deref(),
            )
            .map(Some)
    }
}

impl Iterator for Scan<'_> {
    type Item = Result<ScanItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, ScanState::Done) {
                ScanState::Init => self.state = ScanState::NextBlock { part: 0, block: 0 },
                ScanState::Done => return None,
                ScanState::NextBlock { part, block } => {
                    let Some(partition) = self.scope.get(part) else {
                        return None;
                    };
                    if block >= partition.block_count() {
                        self.state = ScanState::NextBlock {
                            part: part + 1,
                            block: 0,
                        };
                        continue;
                    }
                    if self.interrupted() {
                        tracing::debug!(target: "twinslot::access", part, block, "scan cancelled");
                        return Some(Err(eyre!(AccessError::Cancelled)));
                    }
                    let first = RouteSynopsis {
                        level: partition.level(),
                        partition: partition.number(),
                        generation: partition.generation(),
                        seq: block as u64 * TUPLES_PER_BLOCK as u64,
                    };
                    let key = first.address(self.relation.rel_id()).page;
                    self.state = match self.relation.pool().read_page(key) {
                        Some(page) => ScanState::InPage {
                            part,
                            block,
                            page,
                            item: 0,
                        },
                        None => ScanState::NextBlock {
                            part,
                            block: block + 1,
                        },
                    };
                }
                ScanState::InPage {
                    part,
                    block,
                    page,
                    item,
                } => {
                    if item >= page.high_water() {
                        self.state = ScanState::NextBlock {
                            part,
                            block: block + 1,
                        };
                        continue;
                    }
                    let partition = Arc::clone(&self.scope[part]);
                    let found = self.read_item(&partition, &page, item);
                    let synopsis = RouteSynopsis {
                        level: partition.level(),
                        partition: partition.number(),
                        generation: partition.generation(),
                        seq: block as u64 * TUPLES_PER_BLOCK as u64 + item as u64,
                    };
                    self.state = ScanState::InPage {
                        part,
                        block,
                        page,
                        item: item + 1,
                    };
                    match found {
                        Ok(Some(row)) => return Some(Ok(ScanItem { synopsis, row })),
                        Ok(None) => {}
                        Err(e) => {
                            self.state = ScanState::Done;
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}
