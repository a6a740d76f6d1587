use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{key::VariantKey, ListingId};

/// Listing fields the engine reads and updates through the store port.
///
/// A listing is represented by an aggregate "base" record (sentinel variant
/// key) tracking the cheapest available variant. Legacy per-variant records
/// may still exist; they are matched into the same key space but never
/// written back.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: ListingId,
    pub title: String,
    pub variant_key: VariantKey,
    pub active: bool,
    pub current_price: Option<f64>,
    pub current_original_price: Option<f64>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ListingRecord {
    pub fn is_base(&self) -> bool {
        self.variant_key.is_base()
    }
}
