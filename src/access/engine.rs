//! # Engine
//!
//! The entry point: owns the transaction manager, the buffer pool and the
//! version chain, and opens relations over them.
//!
//! ```text
//! Engine
//! ├── config: EngineConfig
//! ├── txns: Arc<TransactionManager>  xids, snapshots, commit status
//! ├── pool: Arc<BufferPool>          pages of every relation
//! ├── chain: Arc<VersionChain>       evicted versions of every relation
//! └── next_rel: AtomicU32
//! ```
//!
//! ## Usage
//!
//! ```
//! use twinslot::{AccessMethod, Engine, EngineConfig, RowDescriptor};
//!
//! let engine = Engine::open(EngineConfig::default()).unwrap();
//! let rel = engine.create_relation(RowDescriptor::Flat).unwrap();
//!
//! let txn = engine.begin().unwrap();
//! let syn = rel.insert(&txn.snapshot(), b"key", b"row").unwrap();
//! txn.commit();
//!
//! let reader = engine.begin().unwrap();
//! assert_eq!(rel.fetch(&reader.snapshot(), &syn).unwrap(), Some(b"row".to_vec()));
//! ```

use eyre::Result;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::migrate::MigrationReport;
use super::relation::HeapRelation;
use super::RowDescriptor;
use crate::config::EngineConfig;
use crate::mvcc::VersionChain;
use crate::storage::BufferPool;
use crate::txn::{Transaction, TransactionManager, TransactionOracle};

pub struct Engine {
    config: EngineConfig,
    txns: Arc<TransactionManager>,
    pool: Arc<BufferPool>,
    chain: Arc<VersionChain>,
    next_rel: AtomicU32,
}

impl Engine {
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            target: "twinslot::access",
            level0_partitions = config.level0_partitions,
            blocks_per_partition = config.blocks_per_partition,
            columnar = config.columnar_groups.is_some(),
            "engine opened"
        );
        Ok(Self {
            config,
            txns: Arc::new(TransactionManager::new()),
            pool: Arc::new(BufferPool::new()),
            chain: Arc::new(VersionChain::new()),
            next_rel: AtomicU32::new(1),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn begin(&self) -> Result<Transaction<'_>> {
        self.txns.begin()
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.txns
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn chain(&self) -> &VersionChain {
        &self.chain
    }

    pub fn create_relation(&self, descriptor: RowDescriptor) -> Result<HeapRelation> {
        let rel_id = self.next_rel.fetch_add(1, Ordering::Relaxed);
        HeapRelation::open(
            rel_id,
            descriptor,
            self.txns.clone(),
            Arc::clone(&self.pool),
            Arc::clone(&self.chain),
            self.config.clone(),
        )
    }

    /// Moves partition `(level, number)` of `relation` up one tier.
    pub fn migrate(&self, relation: &HeapRelation, level: u8, number: u32) -> Result<MigrationReport> {
        relation.migrate_partition(level, number)
    }

    /// Drops chain segments no live snapshot can reach. Returns the number
    /// of segments reclaimed.
    pub fn reclaim_versions(&self) -> Result<usize> {
        let horizon = self.txns.oldest_active();
        let reclaimed = self.chain.reclaim_below(horizon, &*self.txns)?;
        tracing::info!(target: "twinslot::access", horizon, reclaimed, "version chain reclaimed");
        Ok(reclaimed)
    }
}
