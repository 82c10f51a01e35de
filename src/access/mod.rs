//! # Access Method Dispatcher
//!
//! The operation surface of a relation: insert, update, delete, lock, fetch
//! and scan, composed from the router, the buffer pool, the dual-reference
//! protocol and visibility resolution.
//!
//! ```text
//! operation + snapshot
//!        │
//!        v
//! PartitionRouter::locate ── RowMoved ──> caller relocates
//!        │
//!        v
//! BufferPool::read_page ── pinned PageHandle
//!        │
//!        ├── readers:  Page::read_stable → resolve_in_place → chain
//!        └── writers:  page latch → examine → overwrite_other_slot
//! ```
//!
//! ## Conflict Results
//!
//! Update, delete and lock report concurrent-update conflicts as values:
//!
//! | TmResult       | Meaning                                              |
//! |----------------|------------------------------------------------------|
//! | `Ok`           | the operation took effect                            |
//! | `Updated`      | a committed transaction replaced the version         |
//! | `Deleted`      | a committed transaction deleted the row              |
//! | `SelfModified` | this transaction already changed the row            |
//! | `WouldBlock`   | another transaction holds it, `WaitPolicy::Skip`     |
//!
//! `WaitPolicy::Block` waits for the holder to finish and re-examines;
//! `WaitPolicy::Error` fails with `AccessError::LockNotAvailable`.
//!
//! ## Relation Layouts
//!
//! A [`RowDescriptor`] is fixed when a relation is opened. `Flat` relations
//! keep every row in level 0. `Tiered` relations can migrate partitions to
//! higher levels, optionally column-grouped.

pub mod engine;
pub mod fetch;
pub mod lock;
pub mod migrate;
pub mod relation;
pub mod scan;

use eyre::Result;

pub use engine::Engine;
pub use fetch::IndexFetch;
pub use lock::LockReport;
pub use migrate::MigrationReport;
pub use relation::HeapRelation;
pub use scan::{Scan, ScanItem};

use crate::config::EngineConfig;
use crate::router::RouteSynopsis;
use crate::txn::{Snapshot, TxnId, INVALID_XID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TmResult {
    Ok,
    Updated,
    Deleted,
    SelfModified,
    WouldBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    #[default]
    Block,
    Skip,
    Error,
}

/// Result of an update or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TmOutcome {
    pub result: TmResult,
    /// Transaction behind a conflict, `INVALID_XID` on success.
    pub conflict_xid: TxnId,
    /// Where the row lives after a successful update.
    pub synopsis: Option<RouteSynopsis>,
}

impl TmOutcome {
    pub(crate) fn ok(synopsis: RouteSynopsis) -> Self {
        Self {
            result: TmResult::Ok,
            conflict_xid: INVALID_XID,
            synopsis: Some(synopsis),
        }
    }

    pub(crate) fn conflict(result: TmResult, conflict_xid: TxnId) -> Self {
        Self {
            result,
            conflict_xid,
            synopsis: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == TmResult::Ok
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowDescriptor {
    Flat,
    Tiered {
        /// Column groups for levels above 0; `None` keeps row layout.
        columnar_groups: Option<Vec<Vec<usize>>>,
    },
}

impl RowDescriptor {
    /// Tiered descriptor using the engine's configured column groups.
    pub fn tiered(config: &EngineConfig) -> Self {
        RowDescriptor::Tiered {
            columnar_groups: config.columnar_groups.clone(),
        }
    }

    pub fn is_tiered(&self) -> bool {
        matches!(self, RowDescriptor::Tiered { .. })
    }
}

/// Operations every relation access method provides.
pub trait AccessMethod {
    fn insert(&self, snapshot: &Snapshot<'_>, key: &[u8], row: &[u8]) -> Result<RouteSynopsis>;

    fn update(
        &self,
        snapshot: &Snapshot<'_>,
        synopsis: &RouteSynopsis,
        row: &[u8],
        wait: WaitPolicy,
    ) -> Result<TmOutcome>;

    fn delete(
        &self,
        snapshot: &Snapshot<'_>,
        synopsis: &RouteSynopsis,
        wait: WaitPolicy,
    ) -> Result<TmOutcome>;

    fn lock(
        &self,
        snapshot: &Snapshot<'_>,
        synopsis: &RouteSynopsis,
        wait: WaitPolicy,
        follow_updates: bool,
    ) -> Result<LockReport>;

    fn fetch(&self, snapshot: &Snapshot<'_>, synopsis: &RouteSynopsis) -> Result<Option<Vec<u8>>>;

    fn scan<'a>(&'a self, snapshot: &'a Snapshot<'a>) -> Scan<'a>;
}
