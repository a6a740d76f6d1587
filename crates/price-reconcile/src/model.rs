use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cartwatch_core_types::ListingId;

/// Outcome counts of one reconciliation pass over an account's listings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub updated: u32,
    pub failed: u32,
    /// Monitored listings with no matching cart entry; these need operator
    /// attention (the item fell out of the cart), not a retry.
    pub missing: Vec<ListingId>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.missing.is_empty()
    }
}

/// Emitted once per detected drop; the notifier fans it out per subscriber.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriceDropEvent {
    pub listing_id: ListingId,
    pub title: String,
    pub old_price: f64,
    pub new_price: f64,
    pub drop_amount: f64,
    /// Percent of the old price, in `0.0..=100.0`.
    pub drop_percent: f64,
}

/// Lightweight push for live UI refresh, independent of drop detection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListingUpdate {
    pub listing_id: ListingId,
    pub title: String,
    pub current_price: f64,
    pub last_checked_at: DateTime<Utc>,
}

/// Per-subscriber drop threshold. The reconciler emits one event with both
/// magnitudes; this is the rule a notifier applies for each subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "UPPERCASE")]
pub enum DropRule {
    Amount(f64),
    Percent(f64),
}

impl DropRule {
    pub fn matches(&self, event: &PriceDropEvent) -> bool {
        match *self {
            DropRule::Amount(threshold) => event.drop_amount >= threshold,
            DropRule::Percent(threshold) => event.drop_percent >= threshold,
        }
    }
}
