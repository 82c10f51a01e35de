//! # Transactions and Snapshots
//!
//! The storage layer consumes transactions through a narrow interface: a
//! [`Snapshot`] answers "is this version visible to me", and a
//! [`TransactionOracle`] answers "is this transaction still running, and
//! what is the oldest snapshot horizon still in use". Everything else
//! (commit bookkeeping, waiting for a holder to finish) sits behind the
//! oracle so tests can substitute a scripted one.
//!
//! ## Transaction Identifiers
//!
//! Transaction ids are 64-bit, allocated from a global counter and never
//! reused. Two values are reserved:
//!
//! ```text
//! INVALID_XID = 0   "no transaction" (empty xmax, unset bound)
//! FROZEN_XID  = 1   committed and visible to every snapshot
//! ```
//!
//! ## Transaction States
//!
//! ```text
//! ┌─────────┐     commit()     ┌───────────┐
//! │ Active  │ ───────────────> │ Committed │
//! └─────────┘                  └───────────┘
//!      │
//!      │ rollback() / drop
//!      v
//! ┌─────────┐
//! │ Aborted │
//! └─────────┘
//! ```
//!
//! ## Horizons
//!
//! - `Snapshot::horizon()` is the first xid the snapshot cannot see.
//! - `TransactionOracle::oldest_active()` is the minimum `xmin` over all
//!   live snapshots. A version whose deleter committed below it is dead for
//!   everyone, so updates stop pushing it to the chain and chain segments
//!   wholly below it can be reclaimed.

pub mod manager;
pub mod snapshot;

pub use manager::{Transaction, TransactionManager};
pub use snapshot::{Snapshot, SnapshotKind};

pub type TxnId = u64;
pub type CommandId = u32;

pub const INVALID_XID: TxnId = 0;
pub const FROZEN_XID: TxnId = 1;
pub const FIRST_NORMAL_XID: TxnId = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxnState {
    #[default]
    Active,
    Committed,
    Aborted,
}

/// Commit status and horizon source for visibility decisions.
pub trait TransactionOracle: Send + Sync {
    fn state(&self, xid: TxnId) -> TxnState;

    /// Minimum `xmin` of every live snapshot.
    fn oldest_active(&self) -> TxnId;

    /// Blocks until `xid` is no longer active.
    fn wait_for(&self, xid: TxnId);
}
