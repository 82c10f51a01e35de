//! # External Version Chain
//!
//! Append-only store for row versions evicted from the in-place slots. An
//! update that overwrites the older slot first pushes its content here if
//! some snapshot might still need it.
//!
//! ## Segment Layout
//!
//! ```text
//! +------------------------------------+
//! | Segment Header (16 bytes)          |
//! |   entry_count: u32                 |
//! |   free_offset: u32                 |
//! |   newest_xmax: u64                 |
//! +------------------------------------+
//! | Chain Entries (append-only)        |
//! | +--------------------------------+ |
//! | | entry_size: u32                | |
//! | | rel_id:     u32                | |
//! | | xmin:       u64                | |
//! | | xmax:       u64                | |
//! | | back:       u64  prior version | |
//! | | cmin:       u32                | |
//! | | cmax:       u32                | |
//! | | payload:    [u8]               | |
//! | +--------------------------------+ |
//! +------------------------------------+
//! | Free Space                         |
//! +------------------------------------+
//! ```
//!
//! ## Offsets
//!
//! `offset = segment_no << 16 | offset_in_segment`. Segment numbers start
//! at 1 and entries start after the segment header, so 0 is never a valid
//! offset and means "none". Offsets grow monotonically: a larger offset is
//! a newer entry.
//!
//! ## Chain Shape
//!
//! Every entry's `back` points at the row's previous newest entry, so the
//! chain is one newest-to-oldest list per row regardless of which slot the
//! version was evicted from.
//!
//! ## Reclamation
//!
//! Whole sealed segments are dropped once every entry's deleter committed
//! below the oldest-active horizon. A lookup that races reclamation either
//! still holds the segment (`Arc`) or gets `None`; `None` is an expected
//! outcome and callers report the row invisible.

use eyre::{bail, ensure, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use super::slot::VersionStamp;
use crate::config::{
    CHAIN_ENTRY_HEADER_SIZE, CHAIN_OFFSET_SHIFT, CHAIN_SEGMENT_HEADER_SIZE, CHAIN_SEGMENT_SIZE,
    MAX_ROW_PAYLOAD,
};
use crate::error::AccessError;
use crate::txn::{Snapshot, TransactionOracle, TxnId, TxnState};

static CHAIN_APPENDS_TOTAL: AtomicU64 = AtomicU64::new(0);
static CHAIN_LOOKUPS_TOTAL: AtomicU64 = AtomicU64::new(0);
static CHAIN_NOT_FOUND_TOTAL: AtomicU64 = AtomicU64::new(0);
static CHAIN_SEGMENTS_RECLAIMED_TOTAL: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainStats {
    pub appends: u64,
    pub lookups: u64,
    pub not_found: u64,
    pub segments_reclaimed: u64,
}

pub fn chain_stats() -> ChainStats {
    ChainStats {
        appends: CHAIN_APPENDS_TOTAL.load(Ordering::Relaxed),
        lookups: CHAIN_LOOKUPS_TOTAL.load(Ordering::Relaxed),
        not_found: CHAIN_NOT_FOUND_TOTAL.load(Ordering::Relaxed),
        segments_reclaimed: CHAIN_SEGMENTS_RECLAIMED_TOTAL.load(Ordering::Relaxed),
    }
}

pub fn reset_chain_stats() {
    CHAIN_APPENDS_TOTAL.store(0, Ordering::Relaxed);
    CHAIN_LOOKUPS_TOTAL.store(0, Ordering::Relaxed);
    CHAIN_NOT_FOUND_TOTAL.store(0, Ordering::Relaxed);
    CHAIN_SEGMENTS_RECLAIMED_TOTAL.store(0, Ordering::Relaxed);
}

pub fn encode_offset(segment_no: u64, offset: u16) -> u64 {
    (segment_no << CHAIN_OFFSET_SHIFT) | offset as u64
}

pub fn decode_offset(chain_offset: u64) -> (u64, u16) {
    (
        chain_offset >> CHAIN_OFFSET_SHIFT,
        (chain_offset & ((1 << CHAIN_OFFSET_SHIFT) - 1)) as u16,
    )
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct SegmentHeader {
    entry_count: U32,
    free_offset: U32,
    newest_xmax: U64,
}

impl SegmentHeader {
    zerocopy_accessors! {
        entry_count: u32,
        free_offset: u32,
        newest_xmax: u64,
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct EntryHeader {
    entry_size: U32,
    rel_id: U32,
    xmin: U64,
    xmax: U64,
    back: U64,
    cmin: U32,
    cmax: U32,
}

impl EntryHeader {
    zerocopy_accessors! {
        entry_size: u32,
        rel_id: u32,
        xmin: u64,
        xmax: u64,
        back: u64,
        cmin: u32,
        cmax: u32,
    }
}

const _: () = assert!(size_of::<SegmentHeader>() == CHAIN_SEGMENT_HEADER_SIZE);
const _: () = assert!(size_of::<EntryHeader>() == CHAIN_ENTRY_HEADER_SIZE);

/// Owned copy of one chain entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    pub offset: u64,
    pub rel_id: u32,
    pub stamp: VersionStamp,
    pub back: u64,
    pub payload: Vec<u8>,
}

struct Segment {
    number: u64,
    buf: RwLock<Box<[u8]>>,
}

impl Segment {
    fn new(number: u64) -> Self {
        let mut buf = vec![0u8; CHAIN_SEGMENT_SIZE].into_boxed_slice();
        let mut header = SegmentHeader::new_zeroed();
        header.set_free_offset(CHAIN_SEGMENT_HEADER_SIZE as u32);
        buf[..CHAIN_SEGMENT_HEADER_SIZE].copy_from_slice(header.as_bytes());
        Self {
            number,
            buf: RwLock::new(buf),
        }
    }
}

fn read_segment_header(buf: &[u8]) -> Result<SegmentHeader> {
    SegmentHeader::read_from_bytes(&buf[..CHAIN_SEGMENT_HEADER_SIZE])
        .map_err(|e| eyre::eyre!("failed to read chain segment header: {:?}", e))
}

fn read_entry(buf: &[u8], chain_offset: u64, offset: usize) -> Result<ChainEntry> {
    let header = read_segment_header(buf)?;
    let free = header.free_offset() as usize;
    if offset < CHAIN_SEGMENT_HEADER_SIZE || offset + CHAIN_ENTRY_HEADER_SIZE > free {
        bail!(AccessError::corruption(format!(
            "chain offset {:#x} outside written region (free offset {})",
            chain_offset, free
        )));
    }
    let entry = EntryHeader::read_from_bytes(&buf[offset..offset + CHAIN_ENTRY_HEADER_SIZE])
        .map_err(|e| eyre::eyre!("failed to read chain entry header: {:?}", e))?;
    let size = entry.entry_size() as usize;
    if size < CHAIN_ENTRY_HEADER_SIZE || offset + size > free {
        bail!(AccessError::corruption(format!(
            "chain entry at {:#x} has invalid size {}",
            chain_offset, size
        )));
    }
    Ok(ChainEntry {
        offset: chain_offset,
        rel_id: entry.rel_id(),
        stamp: VersionStamp {
            xmin: entry.xmin(),
            xmax: entry.xmax(),
            lock_only: false,
            cmin: entry.cmin(),
            cmax: entry.cmax(),
        },
        back: entry.back(),
        payload: buf[offset + CHAIN_ENTRY_HEADER_SIZE..offset + size].to_vec(),
    })
}

pub struct VersionChain {
    segments: RwLock<Vec<Option<Arc<Segment>>>>,
    append_lock: Mutex<()>,
}

impl VersionChain {
    pub fn new() -> Self {
        Self {
            segments: RwLock::new(Vec::new()),
            append_lock: Mutex::new(()),
        }
    }

    /// Appends one superseded version and returns its chain offset.
    pub fn append(
        &self,
        rel_id: u32,
        stamp: &VersionStamp,
        back: u64,
        payload: &[u8],
    ) -> Result<u64> {
        if payload.len() > MAX_ROW_PAYLOAD {
            bail!(AccessError::RowTooLarge {
                size: payload.len(),
                max: MAX_ROW_PAYLOAD,
            });
        }
        let size = CHAIN_ENTRY_HEADER_SIZE + payload.len();

        let _append = self.append_lock.lock();
        let segment = self.segment_with_room(size)?;
        let mut buf = segment.buf.write();
        let mut header = read_segment_header(&buf)?;
        let offset = header.free_offset() as usize;
        // INVARIANT: segment_with_room checked the entry fits.
        debug_assert!(offset + size <= CHAIN_SEGMENT_SIZE);

        let chain_offset = encode_offset(segment.number, offset as u16);
        ensure!(
            back < chain_offset,
            "chain back-link {:#x} is not older than new entry {:#x}",
            back,
            chain_offset
        );

        let mut entry = EntryHeader::new_zeroed();
        entry.set_entry_size(size as u32);
        entry.set_rel_id(rel_id);
        entry.set_xmin(stamp.xmin);
        entry.set_xmax(stamp.xmax);
        entry.set_back(back);
        entry.set_cmin(stamp.cmin);
        entry.set_cmax(stamp.cmax);
        buf[offset..offset + CHAIN_ENTRY_HEADER_SIZE].copy_from_slice(entry.as_bytes());
        buf[offset + CHAIN_ENTRY_HEADER_SIZE..offset + size].copy_from_slice(payload);

        header.set_entry_count(header.entry_count() + 1);
        header.set_free_offset((offset + size) as u32);
        header.set_newest_xmax(header.newest_xmax().max(stamp.xmax));
        buf[..CHAIN_SEGMENT_HEADER_SIZE].copy_from_slice(header.as_bytes());

        CHAIN_APPENDS_TOTAL.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            target: "twinslot::chain",
            offset = chain_offset,
            back,
            xmin = stamp.xmin,
            xmax = stamp.xmax,
            len = payload.len(),
            "version pushed to chain"
        );
        Ok(chain_offset)
    }

    fn segment_with_room(&self, size: usize) -> Result<Arc<Segment>> {
        let mut segments = self.segments.write();
        if let Some(Some(last)) = segments.last() {
            let free = read_segment_header(&last.buf.read())?.free_offset() as usize;
            if free + size <= CHAIN_SEGMENT_SIZE {
                return Ok(Arc::clone(last));
            }
        }
        let number = segments.len() as u64 + 1;
        ensure!(
            number < (1 << (64 - CHAIN_OFFSET_SHIFT)),
            "version chain exhausted its segment space"
        );
        let segment = Arc::new(Segment::new(number));
        segments.push(Some(Arc::clone(&segment)));
        Ok(segment)
    }

    /// Owned copy of the entry at `chain_offset`, or `None` when its segment
    /// was reclaimed.
    pub fn lookup(&self, chain_offset: u64) -> Result<Option<ChainEntry>> {
        CHAIN_LOOKUPS_TOTAL.fetch_add(1, Ordering::Relaxed);
        let (segment_no, offset) = decode_offset(chain_offset);
        let segment = {
            let segments = self.segments.read();
            if segment_no == 0 || segment_no as usize > segments.len() {
                bail!(AccessError::corruption(format!(
                    "chain offset {:#x} names unknown segment {}",
                    chain_offset, segment_no
                )));
            }
            segments[segment_no as usize - 1].clone()
        };
        let Some(segment) = segment else {
            CHAIN_NOT_FOUND_TOTAL.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target: "twinslot::chain", offset = chain_offset, "chain entry reclaimed");
            return Ok(None);
        };
        let buf = segment.buf.read();
        read_entry(&buf, chain_offset, offset as usize).map(Some)
    }

    fn walk(&self, head: u64, mut accept: impl FnMut(&ChainEntry) -> bool) -> Result<Option<ChainEntry>> {
        let mut offset = head;
        while offset != 0 {
            let Some(entry) = self.lookup(offset)? else {
                return Ok(None);
            };
            if accept(&entry) {
                return Ok(Some(entry));
            }
            if entry.back >= offset {
                bail!(AccessError::corruption(format!(
                    "chain entry {:#x} links forward to {:#x}",
                    offset, entry.back
                )));
            }
            offset = entry.back;
        }
        Ok(None)
    }

    /// Newest entry reachable from `head` that `snapshot` sees.
    pub fn find_visible(&self, head: u64, snapshot: &Snapshot<'_>) -> Result<Option<ChainEntry>> {
        let found = self.walk(head, |entry| snapshot.is_version_visible(&entry.stamp))?;
        tracing::trace!(target: "twinslot::chain", head, hit = found.is_some(), "chain lookup");
        Ok(found)
    }

    /// Entry created by `xmin`, used to follow update links forward.
    pub fn find_created_by(&self, head: u64, xmin: TxnId) -> Result<Option<ChainEntry>> {
        self.walk(head, |entry| entry.stamp.xmin == xmin)
    }

    /// Newest entry whose creator did not abort.
    pub fn find_live(&self, head: u64, oracle: &dyn TransactionOracle) -> Result<Option<ChainEntry>> {
        self.walk(head, |entry| oracle.state(entry.stamp.xmin) != TxnState::Aborted)
    }

    /// Drops sealed segments whose every entry was superseded by a commit
    /// below `horizon`. Returns the number of segments dropped.
    pub fn reclaim_below(&self, horizon: TxnId, oracle: &dyn TransactionOracle) -> Result<usize> {
        let _append = self.append_lock.lock();
        let mut segments = self.segments.write();
        let sealed = segments.len().saturating_sub(1);
        let mut reclaimed = 0;

        for slot in segments.iter_mut().take(sealed) {
            let Some(segment) = slot else { continue };
            let reclaimable = {
                let buf = segment.buf.read();
                let header = read_segment_header(&buf)?;
                header.newest_xmax() < horizon
                    && entries_all_superseded(&buf, &header, segment.number, oracle)?
            };
            if reclaimable {
                *slot = None;
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            CHAIN_SEGMENTS_RECLAIMED_TOTAL.fetch_add(reclaimed as u64, Ordering::Relaxed);
            tracing::info!(target: "twinslot::chain", reclaimed, horizon, "chain segments reclaimed");
        }
        Ok(reclaimed)
    }

    pub fn live_segments(&self) -> usize {
        self.segments.read().iter().filter(|s| s.is_some()).count()
    }
}

fn entries_all_superseded(
    buf: &[u8],
    header: &SegmentHeader,
    segment_no: u64,
    oracle: &dyn TransactionOracle,
) -> Result<bool> {
    let mut offset = CHAIN_SEGMENT_HEADER_SIZE;
    for _ in 0..header.entry_count() {
        let entry = read_entry(buf, encode_offset(segment_no, offset as u16), offset)?;
        if oracle.state(entry.stamp.xmax) != TxnState::Committed {
            return Ok(false);
        }
        offset += CHAIN_ENTRY_HEADER_SIZE + entry.payload.len();
    }
    Ok(true)
}

impl Default for VersionChain {
    fn default() -> Self {
        Self::new()
    }
}
