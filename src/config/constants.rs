//! # Storage Layer Constants
//!
//! This module centralizes the numeric configuration of the storage layer.
//! Constants that depend on each other are co-located and their
//! relationships are enforced with compile-time assertions.
//!
//! ## Dependency Graph
//!
//! ```text
//! TUPLES_PER_BLOCK (64)
//!       │
//!       ├─> block number = seq / TUPLES_PER_BLOCK
//!       │   item number  = seq % TUPLES_PER_BLOCK
//!       │
//!       └─> DEFAULT_BLOCKS_PER_PARTITION (1024)
//!             partition capacity = TUPLES_PER_BLOCK * blocks
//!
//! CHAIN_SEGMENT_SIZE (16384 bytes)
//!       │
//!       ├─> CHAIN_SEGMENT_HEADER_SIZE (16 bytes)
//!       │
//!       ├─> CHAIN_ENTRY_HEADER_SIZE (40 bytes)
//!       │
//!       └─> MAX_ROW_PAYLOAD (derived)
//!             Every row version must fit in one chain entry, otherwise an
//!             update could not push the superseded version out of place.
//!
//! CHAIN_OFFSET_SHIFT (16)
//!       │
//!       └─> chain offset = segment_no << 16 | offset_in_segment
//!             CHAIN_SEGMENT_SIZE must be addressable with 16 bits.
//!
//! WRITER_SPIN_LIMIT ──> after this many spins the writer falls back to
//!                       the page content lock and yields while draining
//!
//! READ_RETRY_LIMIT  ──> after this many failed validations a reader
//!                       serializes against writers through the page latch
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `CHAIN_SEGMENT_SIZE <= 1 << CHAIN_OFFSET_SHIFT` (offsets fit)
//! 2. `MAX_ROW_PAYLOAD > 0` (a row always fits in a chain entry)
//! 3. `TUPLES_PER_BLOCK <= u16::MAX` (item numbers are u16)

// ============================================================================
// PAGE DENSITY
// Physical block = sequential tuple number / TUPLES_PER_BLOCK
// ============================================================================

/// Number of record cells on one page. This is the per-partition density
/// constant used to turn a sequential tuple number into a block number.
pub const TUPLES_PER_BLOCK: usize = 64;

/// Default number of blocks a partition may grow to before inserts move on
/// to the next level-0 partition.
pub const DEFAULT_BLOCKS_PER_PARTITION: u32 = 1024;

/// Default number of level-0 partitions a relation hashes inserts across.
pub const DEFAULT_LEVEL0_PARTITIONS: u32 = 4;

/// Highest tier level. Migration out of this level is rejected.
pub const MAX_TIER_LEVEL: u8 = 3;

const _: () = assert!(
    TUPLES_PER_BLOCK <= u16::MAX as usize,
    "item numbers are stored as u16"
);

const _: () = assert!(TUPLES_PER_BLOCK > 0, "a page must hold at least one record");

// ============================================================================
// EXTERNAL VERSION CHAIN
// Append-only segments holding versions evicted from the in-place slots
// ============================================================================

/// Size of one chain segment in bytes.
pub const CHAIN_SEGMENT_SIZE: usize = 16384;

/// Size of the segment header (entry count, free offset, newest superseding xid).
pub const CHAIN_SEGMENT_HEADER_SIZE: usize = 16;

/// Size of the fixed part of a chain entry.
pub const CHAIN_ENTRY_HEADER_SIZE: usize = 40;

/// Bits reserved for the in-segment offset inside a chain offset.
pub const CHAIN_OFFSET_SHIFT: u32 = 16;

/// Largest row payload accepted by insert and update.
pub const MAX_ROW_PAYLOAD: usize =
    CHAIN_SEGMENT_SIZE - CHAIN_SEGMENT_HEADER_SIZE - CHAIN_ENTRY_HEADER_SIZE;

const _: () = assert!(
    CHAIN_SEGMENT_SIZE <= 1 << CHAIN_OFFSET_SHIFT,
    "in-segment offsets must fit in CHAIN_OFFSET_SHIFT bits"
);

const _: () = assert!(
    MAX_ROW_PAYLOAD == CHAIN_SEGMENT_SIZE - CHAIN_SEGMENT_HEADER_SIZE - CHAIN_ENTRY_HEADER_SIZE,
    "MAX_ROW_PAYLOAD derivation mismatch"
);

// ============================================================================
// CONCURRENCY LIMITS
// Bounded spinning before falling back to blocking primitives
// ============================================================================

/// Maximum number of concurrently active transactions.
pub const MAX_CONCURRENT_TXNS: usize = 64;

/// Spins a writer performs waiting for the outgoing unit to drain before
/// falling back to the page content lock.
pub const WRITER_SPIN_LIMIT: u32 = 256;

/// Failed read validations before a reader takes the page latch.
pub const READ_RETRY_LIMIT: u32 = 64;

/// Upper bound on forward hops in the lock state machine. A row can only
/// reach this with a cycle in its version links, which is corruption.
pub const MAX_LOCK_HOPS: u32 = 1 << 16;

/// Attempts `relocate` makes before reporting a row as moved.
pub const RELOCATE_RETRY_LIMIT: u32 = 4;

// ============================================================================
// SHARDING
// ============================================================================

/// Number of shards for the buffer pool page map.
pub const BUFFER_POOL_SHARD_COUNT: usize = 64;

/// Number of shards for the secondary index.
pub const INDEX_SHARD_COUNT: usize = 16;

const _: () = assert!(
    BUFFER_POOL_SHARD_COUNT.is_power_of_two() && INDEX_SHARD_COUNT.is_power_of_two(),
    "shard counts are used as masks"
);
