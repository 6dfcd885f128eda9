//! Per-item tags and the auto-removal policy.

use serde::{Deserialize, Serialize};

/// Per-item metadata controlling thresholds and auto-removal opt-out.
///
/// All fields are defaulted so the empty JSON object (the tag a row is
/// created with) decodes cleanly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemTag {
    /// Keep the row at amount 0 instead of deleting it.
    pub no_auto_remove: bool,
    /// Weight of a single unit, for shelf-weight displays.
    pub unit_weight: Option<f64>,
    /// Warn when the shelf weight falls below this value.
    pub min_weight_warning: Option<f64>,
}

impl ItemTag {
    /// Total shelf weight of `amount` units, when a unit weight is set.
    pub fn shelf_weight(&self, amount: i64) -> Option<f64> {
        self.unit_weight.map(|w| w * amount as f64)
    }

    /// Whether `amount` units weigh less than the configured warning level.
    pub fn below_min_weight(&self, amount: i64) -> bool {
        match (self.shelf_weight(amount), self.min_weight_warning) {
            (Some(weight), Some(min)) => weight < min,
            _ => false,
        }
    }
}

/// Decide whether a row that just reached `resulting_amount` should be
/// deleted.
///
/// Fires only when the global remove-on-zero flag is set, the amount is
/// exactly zero, and the tag has not opted out.
pub fn should_auto_remove(tag: &ItemTag, resulting_amount: i64, remove_on_zero: bool) -> bool {
    remove_on_zero && resulting_amount == 0 && !tag.no_auto_remove
}
