//! # Snapshots
//!
//! A snapshot is a transaction's fixed view of which other transactions'
//! effects it sees. Three kinds exist:
//!
//! | Kind   | Creator visible when            | Walks the chain |
//! |--------|---------------------------------|-----------------|
//! | Mvcc   | committed before the snapshot   | yes             |
//! | Dirty  | not aborted (in-progress too)   | no              |
//! | Any    | always                          | no              |
//!
//! An MVCC snapshot sees xid `x` when `x < xmax`, `x` was not running when
//! the snapshot was taken, and the oracle reports it committed. Its own
//! transaction's writes are seen by command id: a version created by
//! command `c` is visible from command `c + 1` on.

use smallvec::SmallVec;

use super::{CommandId, TransactionOracle, TxnId, TxnState, FROZEN_XID, INVALID_XID};
use crate::mvcc::VersionStamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Mvcc,
    Dirty,
    Any,
}

#[derive(Clone)]
pub struct Snapshot<'a> {
    kind: SnapshotKind,
    own_xid: TxnId,
    command_id: CommandId,
    xmin: TxnId,
    xmax: TxnId,
    in_progress: SmallVec<[TxnId; 16]>,
    oracle: &'a dyn TransactionOracle,
}

impl std::fmt::Debug for Snapshot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("kind", &self.kind)
            .field("own_xid", &self.own_xid)
            .field("command_id", &self.command_id)
            .field("xmin", &self.xmin)
            .field("xmax", &self.xmax)
            .field("in_progress", &self.in_progress)
            .finish()
    }
}

impl<'a> Snapshot<'a> {
    pub fn new(
        kind: SnapshotKind,
        own_xid: TxnId,
        command_id: CommandId,
        xmin: TxnId,
        xmax: TxnId,
        in_progress: SmallVec<[TxnId; 16]>,
        oracle: &'a dyn TransactionOracle,
    ) -> Self {
        Self {
            kind,
            own_xid,
            command_id,
            xmin,
            xmax,
            in_progress,
            oracle,
        }
    }

    pub fn kind(&self) -> SnapshotKind {
        self.kind
    }

    pub fn is_mvcc(&self) -> bool {
        self.kind == SnapshotKind::Mvcc
    }

    pub fn own_xid(&self) -> TxnId {
        self.own_xid
    }

    pub fn current_command_id(&self) -> CommandId {
        self.command_id
    }

    /// First xid this snapshot cannot see.
    pub fn horizon(&self) -> TxnId {
        self.xmax
    }

    pub fn xmin(&self) -> TxnId {
        self.xmin
    }

    pub fn oracle(&self) -> &'a dyn TransactionOracle {
        self.oracle
    }

    /// Whether the effects of `xid` as a whole are visible. Own writes count
    /// as visible here; command ids are only consulted per version.
    pub fn sees_xid(&self, xid: TxnId) -> bool {
        match xid {
            INVALID_XID => false,
            FROZEN_XID => true,
            x if x == self.own_xid => true,
            x => match self.kind {
                SnapshotKind::Mvcc => {
                    x < self.xmax
                        && !self.in_progress.contains(&x)
                        && self.oracle.state(x) == TxnState::Committed
                }
                SnapshotKind::Dirty | SnapshotKind::Any => {
                    self.oracle.state(x) != TxnState::Aborted
                }
            },
        }
    }

    /// True when `xid` belongs to another transaction that is still running.
    pub fn is_running_elsewhere(&self, xid: TxnId) -> bool {
        xid != self.own_xid
            && xid > FROZEN_XID
            && self.oracle.state(xid) == TxnState::Active
    }

    /// Visibility of a creator/deleter pair, treating own writes as made by
    /// earlier commands.
    pub fn is_visible(&self, creator: TxnId, deleter: TxnId) -> bool {
        self.is_version_visible(&VersionStamp {
            xmin: creator,
            xmax: deleter,
            lock_only: false,
            cmin: 0,
            cmax: 0,
        })
    }

    pub fn is_version_visible(&self, stamp: &VersionStamp) -> bool {
        match self.kind {
            SnapshotKind::Any => true,
            SnapshotKind::Mvcc => self.creator_visible(stamp) && !self.deleter_visible(stamp),
            SnapshotKind::Dirty => {
                let created = stamp.xmin == self.own_xid
                    || stamp.xmin == FROZEN_XID
                    || (stamp.xmin != INVALID_XID
                        && self.oracle.state(stamp.xmin) != TxnState::Aborted);
                let deleted = !stamp.lock_only
                    && stamp.xmax != INVALID_XID
                    && (stamp.xmax == self.own_xid
                        || self.oracle.state(stamp.xmax) == TxnState::Committed);
                created && !deleted
            }
        }
    }

    fn creator_visible(&self, stamp: &VersionStamp) -> bool {
        if stamp.xmin == self.own_xid {
            stamp.cmin < self.command_id
        } else {
            self.sees_xid(stamp.xmin)
        }
    }

    fn deleter_visible(&self, stamp: &VersionStamp) -> bool {
        if stamp.xmax == INVALID_XID || stamp.lock_only {
            false
        } else if stamp.xmax == self.own_xid {
            stamp.cmax < self.command_id
        } else {
            self.sees_xid(stamp.xmax)
        }
    }
}
