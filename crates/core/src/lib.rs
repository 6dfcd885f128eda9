//! `depot-core` — pure depot domain types.
//!
//! Movements, tags, ledger records and partition keys, plus the auto-removal
//! policy. No I/O here; storage lives in `depot-store`, transport concerns in
//! `depot-realtime` and `depot-status`.

pub mod error;
pub mod movement;
pub mod partition;
pub mod record;
pub mod tag;

pub use error::{BackendError, DepotError, DepotResult};
pub use movement::{MovementKind, StockMovement};
pub use partition::PartitionKey;
pub use record::{LedgerRecord, RecordId};
pub use tag::{ItemTag, should_auto_remove};
