//! Stock movement model.

use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{DepotError, DepotResult};

/// Kind of stock change.
///
/// `Auto` never survives construction: [`StockMovement::new`] normalizes it
/// into `In` or `Out` based on the sign of the quantity, so stores and
/// ledgers only ever see `In`, `Out` and `Set`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    In,
    Out,
    Auto,
    Set,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::In => "in",
            MovementKind::Out => "out",
            MovementKind::Auto => "auto",
            MovementKind::Set => "set",
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = DepotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementKind::In),
            "out" => Ok(MovementKind::Out),
            "auto" => Ok(MovementKind::Auto),
            "set" => Ok(MovementKind::Set),
            other => Err(DepotError::validation(format!(
                "unknown movement kind '{other}'"
            ))),
        }
    }
}

/// A requested stock change, validated on construction.
///
/// Construction is the only validation point: once a `StockMovement` exists
/// its kind/quantity combination is legal, so the store layer only has to
/// check stock arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    kind: MovementKind,
    item: String,
    quantity: i64,
    source: String,
    requested_at: DateTime<Utc>,
}

impl StockMovement {
    /// Build a validated movement.
    ///
    /// Rules:
    /// - item name must be non-empty after trimming
    /// - `In` / `Out` require a strictly positive quantity
    /// - `Auto` is normalized first: quantity < 0 becomes `Out` of the
    ///   negated amount, quantity > 0 becomes `In`; zero fails validation
    /// - `Set` stores the literal quantity, any value allowed
    pub fn new(
        kind: MovementKind,
        item: impl Into<String>,
        quantity: i64,
        source: impl Into<String>,
    ) -> DepotResult<Self> {
        let item = item.into();
        if item.trim().is_empty() {
            return Err(DepotError::validation("item name cannot be empty"));
        }

        let (kind, quantity) = match kind {
            MovementKind::Auto if quantity <= 0 => (MovementKind::Out, -quantity),
            MovementKind::Auto => (MovementKind::In, quantity),
            other => (other, quantity),
        };

        match kind {
            MovementKind::In | MovementKind::Out if quantity <= 0 => {
                return Err(DepotError::validation(format!(
                    "{kind} movement requires a positive quantity, got {quantity}"
                )));
            }
            _ => {}
        }

        Ok(Self {
            kind,
            item,
            quantity,
            source: source.into(),
            requested_at: Utc::now(),
        })
    }

    pub fn kind(&self) -> MovementKind {
        self.kind
    }

    pub fn item(&self) -> &str {
        &self.item
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }
}
