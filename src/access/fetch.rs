//! Index-driven fetches.
//!
//! An MVCC snapshot sees at most one version of a row, so a fetch returns
//! once. Dirty and Any snapshots may see both in-place versions; those are
//! returned newest first, one per call, with `call_again` set while more
//! remain for the same synopsis.

use eyre::Result;

use super::relation::HeapRelation;
use crate::mvcc::{resolve_all_in_place, VisibleVersion};
use crate::router::RouteSynopsis;
use crate::txn::Snapshot;

pub struct IndexFetch<'a> {
    relation: &'a HeapRelation,
    snapshot: &'a Snapshot<'a>,
    current: Option<RouteSynopsis>,
    pending: Vec<VisibleVersion>,
}

impl<'a> IndexFetch<'a> {
    pub fn new(relation: &'a HeapRelation, snapshot: &'a Snapshot<'a>) -> Self {
        Self {
            relation,
            snapshot,
            current: None,
            pending: Vec::new(),
        }
    }

    /// Next version of the row at `synopsis`. `call_again` tells the caller
    /// whether another call with the same synopsis yields more.
    pub fn next(&mut self, synopsis: &RouteSynopsis, call_again: &mut bool) -> Result<Option<Vec<u8>>> {
        *call_again = false;
        if self.snapshot.is_mvcc() {
            return self.relation.fetch_columns(self.snapshot, synopsis, None);
        }

        if self.current != Some(*synopsis) {
            self.current = Some(*synopsis);
            self.pending = self.collect(synopsis)?;
            // Popped from the back: oldest first in the vector.
            self.pending.reverse();
        }
        let Some(version) = self.pending.pop() else {
            self.current = None;
            return Ok(None);
        };
        *call_again = !self.pending.is_empty();
        if !*call_again {
            self.current = None;
        }
        Ok(Some(version.payload))
    }

    fn collect(&self, synopsis: &RouteSynopsis) -> Result<Vec<VisibleVersion>> {
        let _tier = self.relation.tier_shared();
        let Some(located) = self.relation.locate_row(synopsis)? else {
            return Ok(Vec::new());
        };
        let cell = located.page.cell(located.addr.item)?;
        if !cell.is_live() {
            return Ok(Vec::new());
        }
        let versions = located.page.read_stable(self.relation.config().read_retry_limit, || {
            resolve_all_in_place(cell, self.snapshot)
        });
        let layout = located.partition.layout();
        versions
            .into_iter()
            .map(|mut version| {
                version.payload = self.relation.complete_row(
                    self.snapshot,
                    layout,
                    located.addr,
                    std::mem::take(&mut version.payload),
                    None,
                )?;
                Ok(version)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessMethod, RowDescriptor, WaitPolicy};
    use crate::config::EngineConfig;
    use crate::mvcc::VersionChain;
    use crate::storage::BufferPool;
    use crate::txn::{SnapshotKind, TransactionManager};
    use std::sync::Arc;

    fn relation() -> (Arc<TransactionManager>, HeapRelation) {
        let txns = Arc::new(TransactionManager::new());
        let rel = HeapRelation::open(
            1,
            RowDescriptor::Flat,
            txns.clone(),
            Arc::new(BufferPool::new()),
            Arc::new(VersionChain::new()),
            EngineConfig::default(),
        )
        .unwrap();
        (txns, rel)
    }

    #[test]
    fn any_snapshot_returns_both_versions_newest_first() {
        let (txns, rel) = relation();
        let t0 = txns.begin().unwrap();
        let syn = rel.insert(&t0.snapshot(), b"k", b"old").unwrap();
        t0.commit();
        let t1 = txns.begin().unwrap();
        rel.update(&t1.snapshot(), &syn, b"new", WaitPolicy::Error).unwrap();
        t1.commit();

        let reader = txns.begin().unwrap();
        let snap = reader.snapshot_of_kind(SnapshotKind::Any);
        let mut fetch = IndexFetch::new(&rel, &snap);
        let mut again = false;

        assert_eq!(fetch.next(&syn, &mut again).unwrap(), Some(b"new".to_vec()));
        assert!(again);
        assert_eq!(fetch.next(&syn, &mut again).unwrap(), Some(b"old".to_vec()));
        assert!(!again);
    }

    #[test]
    fn mvcc_snapshot_returns_one_version() {
        let (txns, rel) = relation();
        let t0 = txns.begin().unwrap();
        let syn = rel.insert(&t0.snapshot(), b"k", b"v").unwrap();
        t0.commit();

        let reader = txns.begin().unwrap();
        let snap = reader.snapshot();
        let mut fetch = IndexFetch::new(&rel, &snap);
        let mut again = true;
        assert_eq!(fetch.next(&syn, &mut again).unwrap(), Some(b"v".to_vec()));
        assert!(!again);
    }
}
