use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cartwatch_core_types::{AccountId, ListingId, ListingRecord, PriceSnapshot, WatchError};

use crate::model::{ListingUpdate, PriceDropEvent};

/// Listing persistence as the reconciler needs it.
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn active_listings(&self, account: &AccountId) -> Result<Vec<ListingRecord>, WatchError>;
    async fn update_price_fields(
        &self,
        listing: &ListingId,
        price: f64,
        original_price: Option<f64>,
        checked_at: DateTime<Utc>,
    ) -> Result<(), WatchError>;
    /// Record a user-visible error and stamp the check time, leaving the
    /// price fields untouched.
    async fn record_error(
        &self,
        listing: &ListingId,
        message: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), WatchError>;
}

/// Append-only snapshot history.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn latest(&self, listing: &ListingId) -> Result<Option<PriceSnapshot>, WatchError>;
    async fn append(&self, snapshot: PriceSnapshot) -> Result<(), WatchError>;
}

/// Drop event fan-out; the implementation applies per-subscriber rules.
#[async_trait]
pub trait PriceDropNotifier: Send + Sync {
    async fn price_drop(&self, event: &PriceDropEvent);
}

/// Fire-and-forget live UI refresh. Failures are the implementation's
/// problem; the reconciler never checks.
#[async_trait]
pub trait LiveUpdateSink: Send + Sync {
    async fn listing_updated(&self, update: &ListingUpdate);
}
