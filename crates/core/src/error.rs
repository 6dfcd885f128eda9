//! Depot error model.

use thiserror::Error;

/// Result type used across the depot layers.
pub type DepotResult<T> = Result<T, DepotError>;

/// Depot-level error.
///
/// The first three variants are deterministic, caller-facing outcomes
/// (rejected input, business rule, missing row). `Backend` wraps
/// infrastructure faults and is the only class the store layer retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DepotError {
    /// A movement failed validation (bad kind / non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An Out movement would drive the amount negative.
    #[error("insufficient stock for '{item}': have {current}, requested {requested}")]
    InsufficientStock {
        item: String,
        current: i64,
        requested: i64,
    },

    /// A requested item or ledger partition does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An infrastructure fault from the storage backend.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl DepotError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient_stock(item: impl Into<String>, current: i64, requested: i64) -> Self {
        Self::InsufficientStock {
            item: item.into(),
            current,
            requested,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Whether retrying the operation could succeed.
    ///
    /// Validation, insufficient stock and not-found are final; only backend
    /// unavailability is worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(BackendError::Unavailable(_)))
    }
}

/// Storage backend error.
///
/// Backends map their native failures (pool exhaustion, I/O, closed
/// connections) into these variants at the boundary so the rest of the
/// system never sees driver types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached or refused the operation; transient.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Stored data failed to decode (e.g. a corrupt tag blob); not transient.
    #[error("backend data corrupted: {0}")]
    Corrupted(String),
}

impl BackendError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }
}
