//! Ledger partition keys.
//!
//! A partition is one calendar day of ledger history. The key is resolved at
//! append time from the wall clock, shifted by a configured UTC offset, so a
//! write queued before midnight but committed after lands in the new day.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DepotError;

/// Calendar-date key naming one ledger partition.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PartitionKey(NaiveDate);

impl PartitionKey {
    pub const FORMAT: &'static str = "%Y-%m-%d";

    /// Key for the given instant under the configured UTC offset.
    pub fn for_instant(at: DateTime<Utc>, utc_offset_minutes: i32) -> Self {
        let shifted = at + Duration::minutes(i64::from(utc_offset_minutes));
        Self(shifted.date_naive())
    }

    /// Key for the current wall clock.
    pub fn today(utc_offset_minutes: i32) -> Self {
        Self::for_instant(Utc::now(), utc_offset_minutes)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl core::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl FromStr for PartitionKey {
    type Err = DepotError;

    /// Exact-match parse: only the canonical zero-padded `YYYY-MM-DD` form
    /// is accepted, since that is the only form partitions are named in.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(s, Self::FORMAT)
            .map_err(|e| DepotError::validation(format!("malformed partition key '{s}': {e}")))?;
        let key = Self(date);
        if key.to_string() != s {
            return Err(DepotError::validation(format!(
                "non-canonical partition key '{s}'"
            )));
        }
        Ok(key)
    }
}
