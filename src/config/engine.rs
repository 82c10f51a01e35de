//! # Engine Configuration
//!
//! `EngineConfig` carries the runtime knobs of one storage engine instance.
//! Defaults come from [`crate::config::constants`]; the builder validates
//! the combination before anything is opened.
//!
//! | Option                 | Default                         |
//! |------------------------|---------------------------------|
//! | writer_spin_limit      | `WRITER_SPIN_LIMIT`             |
//! | read_retry_limit       | `READ_RETRY_LIMIT`              |
//! | max_lock_hops          | `MAX_LOCK_HOPS`                 |
//! | relocate_retry_limit   | `RELOCATE_RETRY_LIMIT`          |
//! | level0_partitions      | `DEFAULT_LEVEL0_PARTITIONS`     |
//! | blocks_per_partition   | `DEFAULT_BLOCKS_PER_PARTITION`  |
//! | columnar_groups        | none (upper tiers stay row)     |
//!
//! ```ignore
//! let config = EngineConfig::builder()
//!     .level0_partitions(2)
//!     .columnar_groups(vec![vec![0], vec![1, 2]])
//!     .build()?;
//! ```

use eyre::{ensure, Result};

use super::constants::{
    DEFAULT_BLOCKS_PER_PARTITION, DEFAULT_LEVEL0_PARTITIONS, MAX_LOCK_HOPS, READ_RETRY_LIMIT,
    RELOCATE_RETRY_LIMIT, WRITER_SPIN_LIMIT,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub writer_spin_limit: u32,
    pub read_retry_limit: u32,
    pub max_lock_hops: u32,
    pub relocate_retry_limit: u32,
    pub level0_partitions: u32,
    pub blocks_per_partition: u32,
    /// Column groups used by tiers above level 0. `None` keeps every tier
    /// in row layout.
    pub columnar_groups: Option<Vec<Vec<usize>>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            writer_spin_limit: WRITER_SPIN_LIMIT,
            read_retry_limit: READ_RETRY_LIMIT,
            max_lock_hops: MAX_LOCK_HOPS,
            relocate_retry_limit: RELOCATE_RETRY_LIMIT,
            level0_partitions: DEFAULT_LEVEL0_PARTITIONS,
            blocks_per_partition: DEFAULT_BLOCKS_PER_PARTITION,
            columnar_groups: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.level0_partitions > 0, "level0_partitions must be > 0");
        ensure!(
            self.blocks_per_partition > 0,
            "blocks_per_partition must be > 0"
        );
        ensure!(self.max_lock_hops > 0, "max_lock_hops must be > 0");
        ensure!(
            self.relocate_retry_limit > 0,
            "relocate_retry_limit must be > 0"
        );
        if let Some(groups) = &self.columnar_groups {
            ensure!(!groups.is_empty(), "columnar layout needs at least one group");
            let mut seen = hashbrown::HashSet::new();
            for group in groups {
                ensure!(!group.is_empty(), "column groups must not be empty");
                for &column in group {
                    ensure!(
                        seen.insert(column),
                        "column {} appears in more than one group",
                        column
                    );
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`]. Unset options keep their defaults.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn writer_spin_limit(mut self, spins: u32) -> Self {
        self.config.writer_spin_limit = spins;
        self
    }

    pub fn read_retry_limit(mut self, retries: u32) -> Self {
        self.config.read_retry_limit = retries;
        self
    }

    pub fn max_lock_hops(mut self, hops: u32) -> Self {
        self.config.max_lock_hops = hops;
        self
    }

    pub fn relocate_retry_limit(mut self, retries: u32) -> Self {
        self.config.relocate_retry_limit = retries;
        self
    }

    pub fn level0_partitions(mut self, partitions: u32) -> Self {
        self.config.level0_partitions = partitions;
        self
    }

    pub fn blocks_per_partition(mut self, blocks: u32) -> Self {
        self.config.blocks_per_partition = blocks;
        self
    }

    /// Stores rows of upper tiers column-grouped. Each inner vector lists
    /// the column ordinals of one group; group 0 carries visibility.
    pub fn columnar_groups(mut self, groups: Vec<Vec<usize>>) -> Self {
        self.config.columnar_groups = Some(groups);
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = EngineConfig::builder().build().unwrap();
        assert_eq!(config.writer_spin_limit, WRITER_SPIN_LIMIT);
        assert_eq!(config.level0_partitions, DEFAULT_LEVEL0_PARTITIONS);
        assert!(config.columnar_groups.is_none());
    }

    #[test]
    fn rejects_zero_partitions() {
        assert!(EngineConfig::builder().level0_partitions(0).build().is_err());
    }

    #[test]
    fn rejects_overlapping_column_groups() {
        let result = EngineConfig::builder()
            .columnar_groups(vec![vec![0, 1], vec![1, 2]])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn accepts_disjoint_column_groups() {
        let config = EngineConfig::builder()
            .columnar_groups(vec![vec![0], vec![1, 2]])
            .build()
            .unwrap();
        assert_eq!(config.columnar_groups.unwrap().len(), 2);
    }
}
