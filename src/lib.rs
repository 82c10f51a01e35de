//! # twinslot - MVCC Row Storage with Dual In-Place Versions
//!
//! twinslot stores each row in a record cell that holds its two most recent
//! versions side by side. Older versions move to an append-only version
//! chain. Readers never block writers: a dual-reference controller per page
//! lets a writer wait only for the readers that could observe the slot it
//! is about to overwrite.
//!
//! ## Quick Start
//!
//! ```
//! use twinslot::{AccessMethod, Engine, EngineConfig, RowDescriptor, WaitPolicy};
//!
//! let engine = Engine::open(EngineConfig::default()).unwrap();
//! let users = engine.create_relation(RowDescriptor::Flat).unwrap();
//!
//! let txn = engine.begin().unwrap();
//! let row = users.insert(&txn.snapshot(), b"alice", b"v1").unwrap();
//! txn.commit();
//!
//! let txn = engine.begin().unwrap();
//! let out = users.update(&txn.snapshot(), &row, b"v2", WaitPolicy::Block).unwrap();
//! assert!(out.is_ok());
//! txn.commit();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  access: Engine, HeapRelation, Scan      │  insert/update/delete/lock/fetch
//! ├──────────────────────┬───────────────────┤
//! │  router: tiers,      │  txn: snapshots,  │
//! │  generations, index  │  commit status    │
//! ├──────────────────────┴───────────────────┤
//! │  mvcc: record cells, version slots,      │
//! │  locator, branch choice, version chain   │
//! ├──────────────────────────────────────────┤
//! │  storage: pages, dual-reference control, │
//! │  sharded buffer pool                     │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Row Addressing
//!
//! A row is named by a [`RouteSynopsis`]: tier level, partition, partition
//! generation and sequence number. Migrating a partition to a higher tier
//! bumps its generation; stale synopses fail with
//! [`AccessError::RowMoved`] and are re-derived with
//! [`HeapRelation::relocate`].
//!
//! ## Module Overview
//!
//! - [`storage`]: pages, dual-reference controller, buffer pool
//! - [`mvcc`]: version slots, locator, visibility, version chain
//! - [`txn`]: transaction manager and snapshots
//! - [`router`]: tier catalog, synopsis resolution, secondary index
//! - [`access`]: the access-method surface
//! - [`encoding`]: row codec and varints
//! - [`config`]: constants and engine configuration

#[macro_use]
mod macros;

pub mod access;
pub mod config;
pub mod encoding;
pub mod error;
pub mod mvcc;
pub mod router;
pub mod storage;
pub mod txn;

pub use access::{
    AccessMethod, Engine, HeapRelation, IndexFetch, LockReport, MigrationReport, RowDescriptor,
    Scan, ScanItem, TmOutcome, TmResult, WaitPolicy,
};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use error::AccessError;
pub use router::RouteSynopsis;
pub use txn::{Snapshot, SnapshotKind, Transaction, TransactionManager, TransactionOracle};
