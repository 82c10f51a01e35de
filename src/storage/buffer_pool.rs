//! # Sharded Buffer Pool
//!
//! Hands out pinned [`PageHandle`]s for heap pages keyed by
//! `(rel, level, partition, generation, group, block)`.
//!
//! ## Lock Sharding
//!
//! ```text
//! BufferPool
//! ├── Shard 0:  RwLock<HashMap<PageKey, Arc<Page>>>
//! ├── Shard 1:  RwLock<HashMap<PageKey, Arc<Page>>>
//! ├── ...
//! └── Shard 63
//! ```
//!
//! Pages are assigned to shards by `(partition * 31 + block) & (N - 1)`,
//! so the blocks of one partition spread across shards.
//!
//! ## Pin Protocol
//!
//! 1. `read_page`/`read_or_create` return a pinned handle
//! 2. the handle derefs to the [`Page`]
//! 3. dropping the handle unpins
//!
//! Pages are memory resident. `drop_partition` removes a retired
//! generation's pages from the map; handles still held by in-flight
//! operations keep their page alive until released.

use hashbrown::HashMap;
use parking_lot::RwLock;
use std::ops::Deref;
use std::sync::Arc;

use super::page::{Page, PageKey};
use crate::config::BUFFER_POOL_SHARD_COUNT;

/// A pinned page. Unpins on drop.
pub struct PageHandle {
    page: Arc<Page>,
}

impl PageHandle {
    fn new(page: Arc<Page>) -> Self {
        page.pin();
        Self { page }
    }
}

impl Deref for PageHandle {
    type Target = Page;

    fn deref(&self) -> &Page {
        &self.page
    }
}

impl Clone for PageHandle {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.page))
    }
}

impl Drop for PageHandle {
    fn drop(&mut self) {
        self.page.unpin();
    }
}

struct PoolShard {
    pages: RwLock<HashMap<PageKey, Arc<Page>>>,
}

pub struct BufferPool {
    shards: Box<[PoolShard]>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            shards: (0..BUFFER_POOL_SHARD_COUNT)
                .map(|_| PoolShard {
                    pages: RwLock::new(HashMap::new()),
                })
                .collect(),
        }
    }

    fn shard(&self, key: &PageKey) -> &PoolShard {
        let hash = (key.partition as usize)
            .wrapping_mul(31)
            .wrapping_add((key.rel as usize).wrapping_mul(131))
            .wrapping_add(key.block as usize)
            .wrapping_add(key.group as usize);
        &self.shards[hash & (BUFFER_POOL_SHARD_COUNT - 1)]
    }

    pub fn read_page(&self, key: PageKey) -> Option<PageHandle> {
        let shard = self.shard(&key);
        let pages = shard.pages.read();
        pages.get(&key).map(|page| PageHandle::new(Arc::clone(page)))
    }

    pub fn read_or_create(&self, key: PageKey) -> PageHandle {
        if let Some(handle) = self.read_page(key) {
            return handle;
        }
        let shard = self.shard(&key);
        let mut pages = shard.pages.write();
        let page = pages
            .entry(key)
            .or_insert_with(|| Arc::new(Page::new(key)));
        PageHandle::new(Arc::clone(page))
    }

    pub fn release(&self, handle: PageHandle) {
        drop(handle);
    }

    /// Removes every page of one partition generation, across all column
    /// groups. Returns the number of pages removed.
    pub fn drop_partition(&self, rel: u32, level: u8, partition: u32, generation: u32) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut pages = shard.pages.write();
            let before = pages.len();
            pages.retain(|key, _| {
                !(key.rel == rel
                    && key.level == level
                    && key.partition == partition
                    && key.generation == generation)
            });
            removed += before - pages.len();
        }
        removed
    }

    pub fn page_count(&self) -> usize {
        self.shards.iter().map(|s| s.pages.read().len()).sum()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(partition: u32, generation: u32, block: u32) -> PageKey {
        PageKey {
            rel: 1,
            level: 0,
            partition,
            generation,
            group: 0,
            block,
        }
    }

    #[test]
    fn read_missing_page_returns_none() {
        let pool = BufferPool::new();
        assert!(pool.read_page(key(0, 1, 0)).is_none());
    }

    #[test]
    fn handles_pin_and_unpin() {
        let pool = BufferPool::new();
        let h1 = pool.read_or_create(key(0, 1, 3));
        assert_eq!(h1.pin_count(), 1);
        let h2 = pool.read_page(key(0, 1, 3)).unwrap();
        assert_eq!(h1.pin_count(), 2);
        pool.release(h2);
        assert_eq!(h1.pin_count(), 1);
    }

    #[test]
    fn read_or_create_is_idempotent() {
        let pool = BufferPool::new();
        let a = pool.read_or_create(key(2, 1, 0));
        let b = pool.read_or_create(key(2, 1, 0));
        assert!(std::ptr::eq(&*a, &*b));
        assert_eq!(pool.page_count(), 1);
    }

    #[test]
    fn drop_partition_only_removes_that_generation() {
        let pool = BufferPool::new();
        for block in 0..4 {
            drop(pool.read_or_create(key(1, 1, block)));
            drop(pool.read_or_create(key(1, 2, block)));
        }
        drop(pool.read_or_create(key(1, 1, 0).in_group(1)));
        assert_eq!(pool.drop_partition(1, 0, 1, 1), 5);
        assert_eq!(pool.page_count(), 4);
    }

    #[test]
    fn dropped_page_stays_valid_for_holders() {
        let pool = BufferPool::new();
        let handle = pool.read_or_create(key(0, 1, 0));
        pool.drop_partition(1, 0, 0, 1);
        assert!(pool.read_page(key(0, 1, 0)).is_none());
        assert_eq!(handle.key().block, 0);
    }
}
