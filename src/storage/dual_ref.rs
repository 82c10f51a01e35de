//! # Dual-Reference Controller
//!
//! Per-page arbitration that lets readers copy a row version out of its
//! in-place slot without taking the page content lock, while a single
//! writer overwrites the *other* slot of the same record.
//!
//! ## Word Layout
//!
//! The whole controller is one `AtomicU64`:
//!
//! ```text
//! 63      62       61 ............ 31   30 ............. 0
//! ┌──────┬────────┬───────────────────┬───────────────────┐
//! │ unit │ LOCKED │   unit-1 tally    │   unit-0 tally    │
//! └──────┴────────┴───────────────────┴───────────────────┘
//! ```
//!
//! - `unit` is the active unit readers register against.
//! - each tally counts readers currently holding a token on that unit.
//! - `LOCKED` is set while a writer runs in lock-fallback mode; new readers
//!   queue on the page content lock instead of registering.
//!
//! ## Reader Protocol
//!
//! ```text
//! 1. load word; if LOCKED, wait on the content lock and retry
//! 2. fetch_add(1 << shift(unit)) on the observed unit
//! 3. if the returned word still has that unit and no LOCKED: token held
//!    otherwise undo the increment and retry
//! 4. copy the version
//! 5. validate: unit unchanged since registration, else drop and retry
//! 6. drop token (fetch_sub)
//! ```
//!
//! ## Writer Protocol
//!
//! Writers are serialized by the page latch and never hold a read token on
//! the page they write.
//!
//! ```text
//! 1. flip `unit`
//! 2. spin until the outgoing unit's tally reaches zero
//!    (bounded; on timeout fall back: set LOCKED, take the content lock
//!    exclusively and yield until drained)
//! 3. overwrite the slot
//! 4. commit: clear LOCKED, release the content lock
//! ```
//!
//! Only one flip can happen while a reader holds a token: the writer that
//! flipped cannot finish before the reader's unit drains, and the next
//! writer cannot start before it finishes. A unit comparison is therefore
//! enough to validate; there is no ABA on the unit bit.
//!
//! ## Tracing & Metrics
//!
//! - **Target**: `twinslot::dual_ref`
//!   - `TRACE`: clean registrations
//!   - `DEBUG`: torn-read retries and writer lock fallback
//! - **Metrics** (global relaxed atomics): reads, torn retries, flips,
//!   writer fallbacks, reader waits on a locked page.

use std::sync::atomic::{AtomicU64, Ordering};

static DUALREF_READS_TOTAL: AtomicU64 = AtomicU64::new(0);
static DUALREF_TORN_RETRIES_TOTAL: AtomicU64 = AtomicU64::new(0);
static DUALREF_FLIPS_TOTAL: AtomicU64 = AtomicU64::new(0);
static DUALREF_WRITER_FALLBACKS_TOTAL: AtomicU64 = AtomicU64::new(0);
static DUALREF_READER_LOCK_WAITS_TOTAL: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DualRefStats {
    pub reads: u64,
    pub torn_retries: u64,
    pub flips: u64,
    pub writer_fallbacks: u64,
    pub reader_lock_waits: u64,
}

pub fn dual_ref_stats() -> DualRefStats {
    DualRefStats {
        reads: DUALREF_READS_TOTAL.load(Ordering::Relaxed),
        torn_retries: DUALREF_TORN_RETRIES_TOTAL.load(Ordering::Relaxed),
        flips: DUALREF_FLIPS_TOTAL.load(Ordering::Relaxed),
        writer_fallbacks: DUALREF_WRITER_FALLBACKS_TOTAL.load(Ordering::Relaxed),
        reader_lock_waits: DUALREF_READER_LOCK_WAITS_TOTAL.load(Ordering::Relaxed),
    }
}

/// Reset metrics (for tests).
pub fn reset_dual_ref_stats() {
    DUALREF_READS_TOTAL.store(0, Ordering::Relaxed);
    DUALREF_TORN_RETRIES_TOTAL.store(0, Ordering::Relaxed);
    DUALREF_FLIPS_TOTAL.store(0, Ordering::Relaxed);
    DUALREF_WRITER_FALLBACKS_TOTAL.store(0, Ordering::Relaxed);
    DUALREF_READER_LOCK_WAITS_TOTAL.store(0, Ordering::Relaxed);
}

pub(crate) fn record_torn_retry(retries: u32) {
    DUALREF_TORN_RETRIES_TOTAL.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(target: "twinslot::dual_ref", retries, "read validation failed, retrying");
}

pub(crate) fn record_reader_lock_wait() {
    DUALREF_READER_LOCK_WAITS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_writer_fallback(spins: u32) {
    DUALREF_WRITER_FALLBACKS_TOTAL.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(target: "twinslot::dual_ref", spins, "writer falling back to content lock");
}

const UNIT_BIT: u64 = 1 << 63;
const LOCKED_BIT: u64 = 1 << 62;
const TALLY_BITS: u32 = 31;
const TALLY_MASK: u64 = (1 << TALLY_BITS) - 1;

#[inline]
fn unit_of(word: u64) -> u8 {
    (word >> 63) as u8
}

#[inline]
fn tally_of(word: u64, unit: u8) -> u64 {
    (word >> (unit as u32 * TALLY_BITS)) & TALLY_MASK
}

#[inline]
fn one_reader(unit: u8) -> u64 {
    1 << (unit as u32 * TALLY_BITS)
}

pub struct DualRef {
    word: AtomicU64,
}

/// Proof that a reader is registered on a unit. Dropping it releases the
/// registration.
#[must_use]
pub struct ReadToken<'a> {
    dual_ref: &'a DualRef,
    unit: u8,
}

impl ReadToken<'_> {
    pub fn unit(&self) -> u8 {
        self.unit
    }
}

impl Drop for ReadToken<'_> {
    fn drop(&mut self) {
        self.dual_ref
            .word
            .fetch_sub(one_reader(self.unit), Ordering::SeqCst);
    }
}

impl DualRef {
    pub const fn new() -> Self {
        Self {
            word: AtomicU64::new(0),
        }
    }

    pub fn active_unit(&self) -> u8 {
        unit_of(self.word.load(Ordering::SeqCst))
    }

    pub fn tally(&self, unit: u8) -> u64 {
        tally_of(self.word.load(Ordering::SeqCst), unit)
    }

    pub fn is_locked(&self) -> bool {
        self.word.load(Ordering::SeqCst) & LOCKED_BIT != 0
    }

    /// Registers a reader on the active unit. Returns `None` while a writer
    /// holds the page in lock-fallback mode.
    pub fn try_enter(&self) -> Option<ReadToken<'_>> {
        let mut retries = 0u32;
        loop {
            let current = self.word.load(Ordering::SeqCst);
            if current & LOCKED_BIT != 0 {
                return None;
            }
            let unit = unit_of(current);
            let previous = self.word.fetch_add(one_reader(unit), Ordering::SeqCst);
            if unit_of(previous) == unit && previous & LOCKED_BIT == 0 {
                DUALREF_READS_TOTAL.fetch_add(1, Ordering::Relaxed);
                if retries == 0 {
                    tracing::trace!(target: "twinslot::dual_ref", unit, "reader registered");
                }
                return Some(ReadToken {
                    dual_ref: self,
                    unit,
                });
            }
            self.word.fetch_sub(one_reader(unit), Ordering::SeqCst);
            retries += 1;
            std::hint::spin_loop();
        }
    }

    /// True when no writer flipped the unit since `token` registered.
    pub fn validate(&self, token: &ReadToken<'_>) -> bool {
        debug_assert!(std::ptr::eq(token.dual_ref, self));
        unit_of(self.word.load(Ordering::SeqCst)) == token.unit
    }

    /// Flips the active unit and returns the outgoing one.
    pub(crate) fn flip(&self) -> u8 {
        let previous = self.word.fetch_xor(UNIT_BIT, Ordering::SeqCst);
        DUALREF_FLIPS_TOTAL.fetch_add(1, Ordering::Relaxed);
        unit_of(previous)
    }

    /// Spins up to `spin_limit` times for `unit` to drain.
    pub(crate) fn spin_until_drained(&self, unit: u8, spin_limit: u32) -> bool {
        for _ in 0..spin_limit {
            if self.tally(unit) == 0 {
                return true;
            }
            std::hint::spin_loop();
        }
        self.tally(unit) == 0
    }

    /// Yields until `unit` drains. Only called with LOCKED set, so no new
    /// reader can register and the wait is bounded by in-flight copies.
    pub(crate) fn wait_drained(&self, unit: u8) {
        while self.tally(unit) != 0 {
            std::thread::yield_now();
        }
    }

    pub(crate) fn set_locked(&self) {
        self.word.fetch_or(LOCKED_BIT, Ordering::SeqCst);
    }

    pub(crate) fn clear_locked(&self) {
        self.word.fetch_and(!LOCKED_BIT, Ordering::SeqCst);
    }
}

impl Default for DualRef {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_registers_and_releases_on_active_unit() {
        let dr = DualRef::new();
        let token = dr.try_enter().unwrap();
        assert_eq!(token.unit(), 0);
        assert_eq!(dr.tally(0), 1);
        drop(token);
        assert_eq!(dr.tally(0), 0);
    }

    #[test]
    fn flip_invalidates_outstanding_token() {
        let dr = DualRef::new();
        let token = dr.try_enter().unwrap();
        assert!(dr.validate(&token));
        let outgoing = dr.flip();
        assert_eq!(outgoing, 0);
        assert!(!dr.validate(&token));
        assert!(!dr.spin_until_drained(outgoing, 8));
        drop(token);
        assert!(dr.spin_until_drained(outgoing, 8));
    }

    #[test]
    fn readers_after_flip_use_new_unit() {
        let dr = DualRef::new();
        dr.flip();
        let token = dr.try_enter().unwrap();
        assert_eq!(token.unit(), 1);
        assert_eq!(dr.tally(1), 1);
        assert_eq!(dr.tally(0), 0);
    }

    #[test]
    fn locked_word_refuses_registration() {
        let dr = DualRef::new();
        dr.set_locked();
        assert!(dr.try_enter().is_none());
        dr.clear_locked();
        assert!(dr.try_enter().is_some());
    }

    #[test]
    fn tallies_are_independent() {
        let dr = DualRef::new();
        let a = dr.try_enter().unwrap();
        dr.flip();
        let b = dr.try_enter().unwrap();
        let c = dr.try_enter().unwrap();
        assert_eq!(dr.tally(0), 1);
        assert_eq!(dr.tally(1), 2);
        drop((a, b, c));
        assert_eq!(dr.tally(0), 0);
        assert_eq!(dr.tally(1), 0);
    }
}
