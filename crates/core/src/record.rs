//! Ledger records: committed movements, write-once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::movement::{MovementKind, StockMovement};

/// Identifier of a committed ledger record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered), so ids sort with append order inside a
    /// partition.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for RecordId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<RecordId> for Uuid {
    fn from(value: RecordId) -> Self {
        value.0
    }
}

/// A committed movement, as stored in one day's ledger partition.
///
/// Records are facts: once appended they are never modified or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: RecordId,
    pub kind: MovementKind,
    pub item: String,
    pub quantity: i64,
    pub recorded_at: DateTime<Utc>,
    pub source: String,
}

impl LedgerRecord {
    /// Capture a validated movement as an immutable record.
    ///
    /// For `Set` the quantity is the literal stored value, not a delta.
    pub fn from_movement(movement: &StockMovement) -> Self {
        Self {
            id: RecordId::new(),
            kind: movement.kind(),
            item: movement.item().to_string(),
            quantity: movement.quantity(),
            recorded_at: movement.requested_at(),
            source: movement.source().to_string(),
        }
    }
}
