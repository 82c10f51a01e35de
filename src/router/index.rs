//! Secondary index from logical key to route synopsis.
//!
//! Sharded the same way as the buffer pool: a key's hash picks one of
//! `INDEX_SHARD_COUNT` maps, each behind its own lock. A key maps to the
//! synopsis of the row most recently inserted under it.
//!
//! ## Pending Moves
//!
//! An update that moves a row to another partition points the key at the
//! new copy before the mover commits. The entry keeps the row's previous
//! home until the mover's fate is known:
//!
//! | Mover     | `lookup` returns | Entry afterwards        |
//! |-----------|------------------|-------------------------|
//! | running   | previous home    | unchanged               |
//! | committed | new copy         | settled on the new copy |
//! | aborted   | previous home    | settled on the home     |

use hashbrown::DefaultHashBuilder;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::hash::BuildHasher;

use super::RouteSynopsis;
use crate::config::INDEX_SHARD_COUNT;
use crate::txn::{TransactionOracle, TxnId, TxnState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMove {
    pub mover: TxnId,
    /// Where the row lives while the move is not committed.
    pub home: RouteSynopsis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub synopsis: RouteSynopsis,
    pub pending: Option<PendingMove>,
}

impl IndexEntry {
    fn settled(synopsis: RouteSynopsis) -> Self {
        Self {
            synopsis,
            pending: None,
        }
    }

    /// The entry with its pending move resolved, if the mover finished.
    fn resolve(self, oracle: &dyn TransactionOracle) -> Self {
        match self.pending {
            None => self,
            Some(pending) => match oracle.state(pending.mover) {
                TxnState::Active => self,
                TxnState::Committed => Self::settled(self.synopsis),
                TxnState::Aborted => Self::settled(pending.home),
            },
        }
    }

    /// Synopsis of the row's committed home.
    fn home(&self) -> RouteSynopsis {
        match self.pending {
            Some(pending) => pending.home,
            None => self.synopsis,
        }
    }
}

type Shard = RwLock<HashMap<Vec<u8>, IndexEntry>>;

pub struct SecondaryIndex {
    shards: Box<[Shard]>,
    hasher: DefaultHashBuilder,
}

impl SecondaryIndex {
    pub fn new() -> Self {
        Self {
            shards: (0..INDEX_SHARD_COUNT)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
            hasher: DefaultHashBuilder::default(),
        }
    }

    pub fn key_hash(&self, key: &[u8]) -> u64 {
        self.hasher.hash_one(key)
    }

    fn shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.key_hash(key) as usize & (INDEX_SHARD_COUNT - 1)]
    }

    /// Raw entry for `key`, pending move included.
    pub fn entry(&self, key: &[u8]) -> Option<IndexEntry> {
        self.shard(key).read().get(key).copied()
    }

    /// Committed home of `key`. Settles a pending move whose mover finished.
    pub fn lookup(&self, key: &[u8], oracle: &dyn TransactionOracle) -> Option<RouteSynopsis> {
        let entry = self.entry(key)?;
        let resolved = entry.resolve(oracle);
        if resolved != entry {
            let mut shard = self.shard(key).write();
            if let Some(current) = shard.get_mut(key) {
                if *current == entry {
                    *current = resolved;
                }
            }
        }
        Some(resolved.home())
    }

    pub fn insert(&self, key: &[u8], synopsis: RouteSynopsis) -> Option<IndexEntry> {
        self.shard(key)
            .write()
            .insert(key.to_vec(), IndexEntry::settled(synopsis))
    }

    /// Points `key` at `to` on behalf of `mover`, keeping `from` as the
    /// row's home until the mover commits. Fails unless `from` is the
    /// current home.
    pub fn begin_move(
        &self,
        key: &[u8],
        from: RouteSynopsis,
        to: RouteSynopsis,
        mover: TxnId,
        oracle: &dyn TransactionOracle,
    ) -> bool {
        let mut shard = self.shard(key).write();
        match shard.get_mut(key) {
            Some(current) if current.resolve(oracle) == IndexEntry::settled(from) => {
                *current = IndexEntry {
                    synopsis: to,
                    pending: Some(PendingMove { mover, home: from }),
                };
                true
            }
            _ => false,
        }
    }

    /// Points `key` at `to` wherever it pointed at `from`, either as the
    /// settled synopsis or as the home of a pending move.
    pub fn repoint(
        &self,
        key: &[u8],
        from: RouteSynopsis,
        to: RouteSynopsis,
        oracle: &dyn TransactionOracle,
    ) -> bool {
        let mut shard = self.shard(key).write();
        let Some(current) = shard.get_mut(key) else {
            return false;
        };
        let mut entry = current.resolve(oracle);
        match entry.pending.as_mut() {
            None if entry.synopsis == from => entry.synopsis = to,
            Some(pending) if pending.home == from => pending.home = to,
            _ => return false,
        }
        *current = entry;
        true
    }

    /// Removes `key` if its settled synopsis is `expected`.
    pub fn remove(&self, key: &[u8], expected: RouteSynopsis, oracle: &dyn TransactionOracle) -> bool {
        let mut shard = self.shard(key).write();
        match shard.get(key).map(|entry| entry.resolve(oracle)) {
            Some(entry) if entry == IndexEntry::settled(expected) => {
                shard.remove(key);
                true
            }
            Some(entry) => {
                // Keep whatever the finished mover left behind.
                shard.insert(key.to_vec(), entry);
                false
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SecondaryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::snapshot::tests::ScriptedOracle;

    fn syn(partition: u32, seq: u64) -> RouteSynopsis {
        RouteSynopsis {
            level: 0,
            partition,
            generation: 1,
            seq,
        }
    }

    #[test]
    fn latest_insert_wins() {
        let oracle = ScriptedOracle::default();
        let index = SecondaryIndex::new();
        assert_eq!(index.insert(b"k", syn(0, 1)), None);
        assert_eq!(
            index.insert(b"k", syn(0, 2)).map(|e| e.synopsis),
            Some(syn(0, 1))
        );
        assert_eq!(index.lookup(b"k", &oracle), Some(syn(0, 2)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn repoint_requires_expected_source() {
        let oracle = ScriptedOracle::default();
        let index = SecondaryIndex::new();
        index.insert(b"k", syn(0, 1));
        assert!(!index.repoint(b"k", syn(0, 9), syn(1, 0), &oracle));
        assert!(index.repoint(b"k", syn(0, 1), syn(1, 0), &oracle));
        assert_eq!(index.lookup(b"k", &oracle), Some(syn(1, 0)));
        assert!(!index.repoint(b"missing", syn(0, 1), syn(1, 0), &oracle));
    }

    #[test]
    fn remove_requires_expected_target() {
        let oracle = ScriptedOracle::default();
        let index = SecondaryIndex::new();
        index.insert(b"k", syn(0, 1));
        assert!(!index.remove(b"k", syn(0, 2), &oracle));
        assert!(index.remove(b"k", syn(0, 1), &oracle));
        assert!(index.is_empty());
    }

    #[test]
    fn pending_move_follows_mover_outcome() {
        let oracle = ScriptedOracle::with(&[(7, TxnState::Active), (8, TxnState::Active)]);
        let index = SecondaryIndex::new();
        index.insert(b"a", syn(1, 0));
        index.insert(b"b", syn(1, 1));
        assert!(index.begin_move(b"a", syn(1, 0), syn(0, 0), 7, &oracle));
        assert!(index.begin_move(b"b", syn(1, 1), syn(0, 1), 8, &oracle));
        assert!(!index.begin_move(b"a", syn(1, 9), syn(0, 2), 7, &oracle));

        assert_eq!(index.lookup(b"a", &oracle), Some(syn(1, 0)));
        assert_eq!(index.entry(b"a").unwrap().synopsis, syn(0, 0));

        oracle.states.write().insert(7, TxnState::Committed);
        oracle.states.write().insert(8, TxnState::Aborted);
        assert_eq!(index.lookup(b"a", &oracle), Some(syn(0, 0)));
        assert_eq!(index.lookup(b"b", &oracle), Some(syn(1, 1)));
        assert_eq!(index.entry(b"a").unwrap().pending, None);
        assert_eq!(index.entry(b"b").unwrap(), IndexEntry::settled(syn(1, 1)));
    }

    #[test]
    fn aborted_move_target_is_never_removed_in_place_of_home() {
        let oracle = ScriptedOracle::with(&[(7, TxnState::Aborted)]);
        let index = SecondaryIndex::new();
        index.insert(b"k", syn(1, 0));
        assert!(index.begin_move(b"k", syn(1, 0), syn(0, 0), 7, &oracle));

        assert!(!index.remove(b"k", syn(0, 0), &oracle));
        assert_eq!(index.lookup(b"k", &oracle), Some(syn(1, 0)));
        assert!(index.repoint(b"k", syn(1, 0), syn(2, 0), &oracle));
        assert_eq!(index.lookup(b"k", &oracle), Some(syn(2, 0)));
    }

    #[test]
    fn keys_spread_across_shards() {
        let index = SecondaryIndex::new();
        for i in 0..256u32 {
            index.insert(&i.to_be_bytes(), syn(0, i as u64));
        }
        let used = index.shards.iter().filter(|s| !s.read().is_empty()).count();
        assert!(used > INDEX_SHARD_COUNT / 2);
    }
}
