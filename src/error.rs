//! # Access Errors
//!
//! Typed failures a caller of the access layer is expected to tell apart.
//! They travel inside `eyre::Report` like every other error in the crate
//! and are recovered with `downcast_ref`:
//!
//! ```
//! use twinslot::{AccessError, AccessMethod, Engine, EngineConfig, RowDescriptor};
//!
//! let config = EngineConfig::builder().level0_partitions(1).build().unwrap();
//! let engine = Engine::open(config).unwrap();
//! let rel = engine
//!     .create_relation(RowDescriptor::Tiered { columnar_groups: None })
//!     .unwrap();
//! let txn = engine.begin().unwrap();
//! let mut synopsis = rel.insert(&txn.snapshot(), b"k", b"v").unwrap();
//! txn.commit();
//! engine.migrate(&rel, 0, 0).unwrap();
//!
//! let reader = engine.begin().unwrap();
//! let snapshot = reader.snapshot();
//! let row = match rel.fetch(&snapshot, &synopsis) {
//!     Err(e) if AccessError::is_row_moved(&e) => {
//!         synopsis = rel.relocate(b"k").unwrap();
//!         rel.fetch(&snapshot, &synopsis).unwrap()
//!     }
//!     other => other.unwrap(),
//! };
//! assert_eq!(row, Some(b"v".to_vec()));
//! ```
//!
//! ## Taxonomy
//!
//! | Condition            | Surface                                        |
//! |----------------------|------------------------------------------------|
//! | torn read            | transparent retry, counted in `DualRefStats`   |
//! | writer lock fallback | transparent, may block, counted                |
//! | chain entry gone     | `None` from `VersionChain::lookup`, row invisible |
//! | stale synopsis       | `RowMoved`, caller relocates                   |
//! | row in no tier       | `RowAbsent`                                    |
//! | update conflict      | `TmResult` value, not an error                 |
//! | contradictory state  | `CorruptionDetected`, never swallowed          |

use std::fmt;

use crate::router::RouteSynopsis;
use crate::txn::TxnId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The synopsis generation no longer matches its partition.
    RowMoved { synopsis: RouteSynopsis },
    /// The row exists in no tier.
    RowAbsent,
    /// Unresolvable structural state such as contradictory boundary ids.
    CorruptionDetected { detail: String },
    /// `WaitPolicy::Error` met a row held by another transaction.
    LockNotAvailable { xid: TxnId },
    /// A scan observed its interrupt flag.
    Cancelled,
    /// The row version was moved to another partition by a concurrent update.
    SerializationFailure,
    RowTooLarge { size: usize, max: usize },
    PartitionFull { level: u8, number: u32 },
    /// Tier migration requested on a flat relation.
    NotTiered,
    UnknownColumnGroup { group: usize },
}

impl AccessError {
    pub fn corruption(detail: impl Into<String>) -> Self {
        AccessError::CorruptionDetected {
            detail: detail.into(),
        }
    }

    pub fn of(report: &eyre::Report) -> Option<&AccessError> {
        report.downcast_ref::<AccessError>()
    }

    pub fn is_row_moved(report: &eyre::Report) -> bool {
        matches!(Self::of(report), Some(AccessError::RowMoved { .. }))
    }

    pub fn is_corruption(report: &eyre::Report) -> bool {
        matches!(Self::of(report), Some(AccessError::CorruptionDetected { .. }))
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::RowMoved { synopsis } => write!(
                f,
                "row moved: synopsis generation {} is stale for partition {}/{}",
                synopsis.generation, synopsis.level, synopsis.partition
            ),
            AccessError::RowAbsent => write!(f, "row not found in any tier"),
            AccessError::CorruptionDetected { detail } => {
                write!(f, "storage corruption detected: {}", detail)
            }
            AccessError::LockNotAvailable { xid } => {
                write!(f, "could not obtain lock on row held by transaction {}", xid)
            }
            AccessError::Cancelled => write!(f, "scan cancelled by interrupt"),
            AccessError::SerializationFailure => write!(
                f,
                "could not serialize access: tuple was already moved to another partition"
            ),
            AccessError::RowTooLarge { size, max } => {
                write!(f, "row payload of {} bytes exceeds maximum {}", size, max)
            }
            AccessError::PartitionFull { level, number } => {
                write!(f, "partition {}/{} is full", level, number)
            }
            AccessError::NotTiered => write!(f, "relation is not tiered"),
            AccessError::UnknownColumnGroup { group } => {
                write!(f, "column group {} does not exist", group)
            }
        }
    }
}

impl std::error::Error for AccessError {}
