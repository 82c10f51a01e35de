//! # Heap Pages
//!
//! A page is a fixed array of [`TUPLES_PER_BLOCK`] record cells plus the
//! synchronization every access to those cells goes through.
//!
//! ```text
//! Page
//! ├── key: PageKey          (rel, level, partition, generation, group, block)
//! ├── dual_ref: DualRef     lock-free reader/writer arbitration
//! ├── latch: Mutex<()>      serializes writers on this page
//! ├── content: RwLock<()>   exclusive only in writer lock-fallback
//! ├── pins: AtomicU32
//! ├── high_water: AtomicU32 cells [0, high_water) may be live
//! └── cells: [RecordCell; TUPLES_PER_BLOCK]
//! ```
//!
//! ## Lock Order
//!
//! ```text
//! relation tier lock (shared) → page latch → content lock (fallback only)
//! ```
//!
//! A thread never waits for another transaction while holding a latch, and
//! never holds a read token while acquiring the latch of the same page.

use eyre::{ensure, Result};
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicU32, Ordering};

use super::dual_ref::{self, DualRef, ReadToken};
use crate::config::TUPLES_PER_BLOCK;
use crate::mvcc::RecordCell;

/// Physical page identity as the buffer pool knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    pub rel: u32,
    pub level: u8,
    pub partition: u32,
    pub generation: u32,
    pub group: u16,
    pub block: u32,
}

impl PageKey {
    pub fn in_group(self, group: u16) -> Self {
        Self { group, ..self }
    }
}

pub struct Page {
    key: PageKey,
    dual_ref: DualRef,
    latch: Mutex<()>,
    content: RwLock<()>,
    pins: AtomicU32,
    high_water: AtomicU32,
    cells: Box<[RecordCell]>,
}

/// Writer proof returned by [`Page::acquire_write`]. Pass it to
/// [`Page::commit_write`] once the slot is written.
#[must_use]
pub struct WriteProof<'a> {
    fallback: Option<RwLockWriteGuard<'a, ()>>,
}

impl WriteProof<'_> {
    pub fn used_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

impl Page {
    pub fn new(key: PageKey) -> Self {
        Self {
            key,
            dual_ref: DualRef::new(),
            latch: Mutex::new(()),
            content: RwLock::new(()),
            pins: AtomicU32::new(0),
            high_water: AtomicU32::new(0),
            cells: (0..TUPLES_PER_BLOCK).map(|_| RecordCell::new()).collect(),
        }
    }

    pub fn key(&self) -> PageKey {
        self.key
    }

    pub fn dual_ref(&self) -> &DualRef {
        &self.dual_ref
    }

    pub fn cell(&self, item: u16) -> Result<&RecordCell> {
        ensure!(
            (item as usize) < self.cells.len(),
            "item {} out of range for page with {} cells",
            item,
            self.cells.len()
        );
        Ok(&self.cells[item as usize])
    }

    pub fn high_water(&self) -> u16 {
        self.high_water.load(Ordering::Acquire) as u16
    }

    pub(crate) fn raise_high_water(&self, item: u16) {
        self.high_water.fetch_max(item as u32 + 1, Ordering::AcqRel);
    }

    pub(crate) fn pin(&self) {
        self.pins.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unpin(&self) {
        let prev = self.pins.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unpin of unpinned page {:?}", self.key);
    }

    pub fn pin_count(&self) -> u32 {
        self.pins.load(Ordering::Acquire)
    }

    pub fn latch(&self) -> MutexGuard<'_, ()> {
        self.latch.lock()
    }

    pub fn lock_shared(&self) -> RwLockReadGuard<'_, ()> {
        self.content.read()
    }

    pub fn lock_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.content.write()
    }

    /// Registers a lock-free reader, queueing on the content lock while a
    /// writer is in fallback mode.
    pub fn acquire_read(&self) -> ReadToken<'_> {
        loop {
            if let Some(token) = self.dual_ref.try_enter() {
                return token;
            }
            dual_ref::record_reader_lock_wait();
            drop(self.content.read());
            std::hint::spin_loop();
        }
    }

    pub fn release_read(&self, token: ReadToken<'_>) {
        drop(token);
    }

    /// Runs `read` under a validated read token and returns its result.
    ///
    /// A result produced while a writer flipped the unit is discarded and
    /// `read` runs again. After `retry_limit` failed validations the read
    /// runs under the page latch, which excludes writers.
    pub fn read_stable<T>(&self, retry_limit: u32, mut read: impl FnMut() -> T) -> T {
        let mut retries = 0u32;
        loop {
            if retries >= retry_limit {
                let _latch = self.latch.lock();
                return read();
            }
            let token = self.acquire_read();
            let out = read();
            if self.dual_ref.validate(&token) {
                drop(token);
                return out;
            }
            drop(token);
            retries += 1;
            dual_ref::record_torn_retry(retries);
            if retries % 8 == 0 {
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
    }

    /// Flips the active unit and spins for the outgoing unit to drain.
    /// Requires the page latch.
    pub fn try_acquire_write(&self, spin_limit: u32) -> bool {
        let outgoing = self.dual_ref.flip();
        self.dual_ref.spin_until_drained(outgoing, spin_limit)
    }

    /// Write proof for the page, falling back to the content lock when
    /// readers do not drain within `spin_limit` spins. Requires the page
    /// latch.
    pub fn acquire_write(&self, spin_limit: u32) -> WriteProof<'_> {
        if self.try_acquire_write(spin_limit) {
            return WriteProof { fallback: None };
        }
        dual_ref::record_writer_fallback(spin_limit);
        let outgoing = 1 - self.dual_ref.active_unit();
        self.dual_ref.set_locked();
        let guard = self.content.write();
        self.dual_ref.wait_drained(outgoing);
        WriteProof {
            fallback: Some(guard),
        }
    }

    pub fn commit_write(&self, proof: WriteProof<'_>) {
        if let Some(guard) = proof.fallback {
            self.dual_ref.clear_locked();
            drop(guard);
        }
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("key", &self.key)
            .field("pins", &self.pin_count())
            .field("high_water", &self.high_water())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    fn key() -> PageKey {
        PageKey {
            rel: 1,
            level: 0,
            partition: 0,
            generation: 1,
            group: 0,
            block: 0,
        }
    }

    #[test]
    fn new_page_has_fixed_cell_count() {
        let page = Page::new(key());
        assert!(page.cell(TUPLES_PER_BLOCK as u16 - 1).is_ok());
        assert!(page.cell(TUPLES_PER_BLOCK as u16).is_err());
        assert_eq!(page.high_water(), 0);
    }

    #[test]
    fn uncontended_write_does_not_fall_back() {
        let page = Page::new(key());
        let _latch = page.latch();
        let proof = page.acquire_write(4);
        assert!(!proof.used_fallback());
        page.commit_write(proof);
    }

    #[test]
    fn held_token_forces_fallback_until_released() {
        let page = Arc::new(Page::new(key()));
        let released = Arc::new(AtomicBool::new(false));

        let token_holder = {
            let page = Arc::clone(&page);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                let token = page.acquire_read();
                thread::sleep(std::time::Duration::from_millis(30));
                released.store(true, Ordering::SeqCst);
                drop(token);
            })
        };

        while page.dual_ref().tally(0) == 0 {
            std::hint::spin_loop();
        }
        let _latch = page.latch();
        let proof = page.acquire_write(1);
        assert!(proof.used_fallback());
        assert!(released.load(Ordering::SeqCst));
        assert!(page.dual_ref().is_locked());
        page.commit_write(proof);
        assert!(!page.dual_ref().is_locked());
        token_holder.join().unwrap();
    }

    #[test]
    fn read_stable_retries_across_flip() {
        let page = Page::new(key());
        let mut calls = 0;
        let out = page.read_stable(16, || {
            calls += 1;
            if calls == 1 {
                page.dual_ref().flip();
            }
            calls
        });
        assert_eq!(out, 2);
    }
}
