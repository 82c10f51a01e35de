//! # Tier Catalog
//!
//! Registry of partitions keyed by `(level, number)`. Each entry carries the
//! partition's current generation, its layout and the next free tuple
//! sequence number.
//!
//! ```text
//! TierCatalog
//! ├── (0, 0) → PartitionState { generation: 1, Row, next_seq: 130 }
//! ├── (0, 1) → PartitionState { generation: 1, Row, next_seq: 97 }
//! └── (1, 0) → PartitionState { generation: 2, Columnar [[0], [1, 2]], .. }
//! ```
//!
//! Level 0 is always row layout. Higher levels use the configured column
//! groups when there are any.
//!
//! ## Generations
//!
//! A generation names one incarnation of a partition's pages. Migration
//! empties a partition and bumps its generation; every synopsis carrying
//! the old number is then stale and must be relocated.

use eyre::{bail, Result};
use hashbrown::HashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{MAX_TIER_LEVEL, TUPLES_PER_BLOCK};
use crate::error::AccessError;

pub type GroupList = SmallVec<[u16; 4]>;

static ROW_LAYOUT: TierLayout = TierLayout::Row;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierLayout {
    Row,
    /// Column groups by ordinal. Group 0 carries visibility.
    Columnar { groups: Vec<Vec<usize>> },
}

impl TierLayout {
    pub fn is_columnar(&self) -> bool {
        matches!(self, TierLayout::Columnar { .. })
    }

    pub fn group_count(&self) -> usize {
        match self {
            TierLayout::Row => 1,
            TierLayout::Columnar { groups } => groups.len(),
        }
    }

    /// Group storing `column`. Columns named by no group belong to the last
    /// group.
    pub fn group_of(&self, column: usize) -> u16 {
        match self {
            TierLayout::Row => 0,
            TierLayout::Columnar { groups } => groups
                .iter()
                .position(|g| g.contains(&column))
                .unwrap_or(groups.len() - 1) as u16,
        }
    }

    /// Groups needed to materialize `projection`, ascending, always
    /// starting with group 0.
    pub fn groups_for(&self, projection: &[usize]) -> GroupList {
        let mut groups: GroupList = SmallVec::new();
        groups.push(0);
        for &column in projection {
            let group = self.group_of(column);
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        groups.sort_unstable();
        groups
    }

    pub fn all_groups(&self) -> GroupList {
        (0..self.group_count() as u16).collect()
    }

    /// Explicit column list of `group`; `None` for the catch-all last group
    /// and for row layout.
    pub fn group_columns(&self, group: u16) -> Result<Option<&[usize]>> {
        match self {
            TierLayout::Row if group == 0 => Ok(None),
            TierLayout::Columnar { groups } if (group as usize) < groups.len() => {
                if group as usize == groups.len() - 1 {
                    Ok(None)
                } else {
                    Ok(Some(&groups[group as usize]))
                }
            }
            _ => bail!(AccessError::UnknownColumnGroup {
                group: group as usize
            }),
        }
    }
}

#[derive(Debug)]
pub struct PartitionState {
    level: u8,
    number: u32,
    generation: AtomicU32,
    next_seq: AtomicU64,
    capacity: u64,
    layout: TierLayout,
}

impl PartitionState {
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn layout(&self) -> &TierLayout {
        &self.layout
    }

    /// Tuple sequence numbers below this were handed out.
    pub fn high_water(&self) -> u64 {
        self.next_seq.load(Ordering::Acquire)
    }

    pub fn block_count(&self) -> u32 {
        self.high_water().div_ceil(TUPLES_PER_BLOCK as u64) as u32
    }

    /// Sequence numbers still free.
    pub fn remaining(&self) -> u64 {
        self.capacity.saturating_sub(self.high_water())
    }

    pub fn claim_seq(&self) -> Result<u64> {
        match self
            .next_seq
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |seq| {
                (seq < self.capacity).then_some(seq + 1)
            }) {
            Ok(seq) => Ok(seq),
            Err(_) => bail!(AccessError::PartitionFull {
                level: self.level,
                number: self.number,
            }),
        }
    }
}

pub struct TierCatalog {
    partitions: RwLock<HashMap<(u8, u32), Arc<PartitionState>>>,
    capacity: u64,
    upper_layout: TierLayout,
}

impl TierCatalog {
    pub fn new(blocks_per_partition: u32, upper_layout: TierLayout) -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            capacity: blocks_per_partition as u64 * TUPLES_PER_BLOCK as u64,
            upper_layout,
        }
    }

    pub fn layout_for(&self, level: u8) -> &TierLayout {
        if level == 0 {
            &ROW_LAYOUT
        } else {
            &self.upper_layout
        }
    }

    pub fn partition(&self, level: u8, number: u32) -> Option<Arc<PartitionState>> {
        self.partitions.read().get(&(level, number)).cloned()
    }

    pub fn ensure_partition(&self, level: u8, number: u32) -> Result<Arc<PartitionState>> {
        if level > MAX_TIER_LEVEL {
            bail!(
                "tier level {} exceeds maximum {}",
                level,
                MAX_TIER_LEVEL
            );
        }
        if let Some(existing) = self.partition(level, number) {
            return Ok(existing);
        }
        let mut partitions = self.partitions.write();
        let state = partitions.entry((level, number)).or_insert_with(|| {
            tracing::debug!(target: "twinslot::router", level, number, "partition created");
            Arc::new(PartitionState {
                level,
                number,
                generation: AtomicU32::new(1),
                next_seq: AtomicU64::new(0),
                capacity: self.capacity,
                layout: self.layout_for(level).clone(),
            })
        });
        Ok(Arc::clone(state))
    }

    /// Retires the partition's current pages: the generation moves on and
    /// sequence numbers restart. Returns the retired generation.
    pub fn bump_generation(&self, level: u8, number: u32) -> Result<u32> {
        let Some(state) = self.partition(level, number) else {
            bail!("partition {}/{} does not exist", level, number);
        };
        let retired = state.generation.fetch_add(1, Ordering::AcqRel);
        state.next_seq.store(0, Ordering::Release);
        tracing::info!(
            target: "twinslot::router",
            level,
            number,
            retired,
            current = retired + 1,
            "partition generation bumped"
        );
        Ok(retired)
    }

    pub fn partitions_at(&self, level: u8) -> Vec<Arc<PartitionState>> {
        let mut found: Vec<_> = self
            .partitions
            .read()
            .values()
            .filter(|p| p.level == level)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.number);
        found
    }

    /// Every partition in `(level, number)` order.
    pub fn scan_scope(&self) -> Vec<Arc<PartitionState>> {
        let mut found: Vec<_> = self.partitions.read().values().cloned().collect();
        found.sort_by_key(|p| (p.level, p.number));
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columnar() -> TierLayout {
        TierLayout::Columnar {
            groups: vec![vec![0], vec![1, 2], vec![3]],
        }
    }

    #[test]
    fn unnamed_columns_fall_into_last_group() {
        let layout = columnar();
        assert_eq!(layout.group_of(2), 1);
        assert_eq!(layout.group_of(9), 2);
        assert_eq!(TierLayout::Row.group_of(9), 0);
    }

    #[test]
    fn groups_for_always_includes_visibility_group() {
        let layout = columnar();
        assert_eq!(layout.groups_for(&[2]).as_slice(), &[0, 1]);
        assert_eq!(layout.groups_for(&[7, 1, 2]).as_slice(), &[0, 1, 2]);
        assert_eq!(layout.groups_for(&[]).as_slice(), &[0]);
    }

    #[test]
    fn group_columns_rejects_unknown_group() {
        let layout = columnar();
        assert_eq!(layout.group_columns(1).unwrap(), Some(&[1usize, 2][..]));
        assert_eq!(layout.group_columns(2).unwrap(), None);
        let err = layout.group_columns(3).unwrap_err();
        assert!(matches!(
            AccessError::of(&err),
            Some(AccessError::UnknownColumnGroup { group: 3 })
        ));
    }

    #[test]
    fn claim_seq_stops_at_capacity() {
        let catalog = TierCatalog::new(1, TierLayout::Row);
        let part = catalog.ensure_partition(0, 0).unwrap();
        for expected in 0..TUPLES_PER_BLOCK as u64 {
            assert_eq!(part.claim_seq().unwrap(), expected);
        }
        let err = part.claim_seq().unwrap_err();
        assert!(matches!(
            AccessError::of(&err),
            Some(AccessError::PartitionFull { level: 0, number: 0 })
        ));
        assert_eq!(part.block_count(), 1);
    }

    #[test]
    fn bump_generation_resets_sequence() {
        let catalog = TierCatalog::new(4, columnar());
        let part = catalog.ensure_partition(1, 3).unwrap();
        part.claim_seq().unwrap();
        assert_eq!(catalog.bump_generation(1, 3).unwrap(), 1);
        assert_eq!(part.generation(), 2);
        assert_eq!(part.high_water(), 0);
        assert!(part.layout().is_columnar());
        assert!(catalog.bump_generation(2, 0).is_err());
    }

    #[test]
    fn scan_scope_orders_by_level_then_number() {
        let catalog = TierCatalog::new(4, TierLayout::Row);
        catalog.ensure_partition(1, 0).unwrap();
        catalog.ensure_partition(0, 2).unwrap();
        catalog.ensure_partition(0, 1).unwrap();
        let order: Vec<_> = catalog
            .scan_scope()
            .iter()
            .map(|p| (p.level(), p.number()))
            .collect();
        assert_eq!(order, vec![(0, 1), (0, 2), (1, 0)]);
        assert_eq!(catalog.partitions_at(0).len(), 2);
        assert!(catalog.ensure_partition(MAX_TIER_LEVEL + 1, 0).is_err());
    }
}
