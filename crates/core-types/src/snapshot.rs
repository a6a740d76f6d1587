use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{key::VariantKey, sku::PropertySelection, AccountId, ListingId};

/// One variant entry inside a snapshot's raw payload.
///
/// Invariant: within one snapshot, keys are unique after normalization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Variant {
    pub key: VariantKey,
    /// Property-to-value-id path, only known from catalog metadata; the cart
    /// DOM does not expose it, so it is carried forward across snapshots.
    pub vid_path: Option<String>,
    pub selections: Vec<PropertySelection>,
    pub final_price: f64,
    pub original_price: Option<f64>,
    pub thumbnail: Option<String>,
}

/// Immutable, append-only price observation for one listing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub listing_id: ListingId,
    /// Minimum final price across variants with `final_price > 0` at capture.
    pub min_final_price: f64,
    pub min_original_price: Option<f64>,
    pub captured_at: DateTime<Utc>,
    pub variants: Vec<Variant>,
    pub account_id: AccountId,
}

impl PriceSnapshot {
    pub fn variant(&self, key: &VariantKey) -> Option<&Variant> {
        self.variants.iter().find(|v| &v.key == key)
    }
}
