use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use cartwatch_core_types::{
    AccountId, CartProduct, ListingId, ListingRecord, PriceSnapshot, Variant, VariantKey,
    WatchError,
};

use crate::model::{ListingUpdate, PriceDropEvent, ReconcileReport};
use crate::ports::{ListingStore, LiveUpdateSink, PriceDropNotifier, SnapshotStore};

pub struct Reconciler {
    listings: Arc<dyn ListingStore>,
    snapshots: Arc<dyn SnapshotStore>,
    notifier: Arc<dyn PriceDropNotifier>,
    live: Arc<dyn LiveUpdateSink>,
}

impl Reconciler {
    pub fn new(
        listings: Arc<dyn ListingStore>,
        snapshots: Arc<dyn SnapshotStore>,
        notifier: Arc<dyn PriceDropNotifier>,
        live: Arc<dyn LiveUpdateSink>,
    ) -> Self {
        Self {
            listings,
            snapshots,
            notifier,
            live,
        }
    }

    /// Reconcile one extraction pass against every active base listing the
    /// account owns. Individual listing failures are counted, never fatal to
    /// the batch.
    #[instrument(skip_all, fields(account = %account.0, cart_items = cart.len()))]
    pub async fn reconcile(
        &self,
        account: &AccountId,
        cart: &[CartProduct],
    ) -> Result<ReconcileReport, WatchError> {
        let mut by_listing: HashMap<&str, Vec<&CartProduct>> = HashMap::new();
        for product in cart {
            by_listing
                .entry(product.listing_id.0.as_str())
                .or_default()
                .push(product);
        }

        let mut report = ReconcileReport::default();
        for listing in self.listings.active_listings(account).await? {
            if !listing.is_base() {
                debug!(target: "price-reconcile", listing = %listing.id, "skipping legacy per-variant record");
                continue;
            }

            let matches = by_listing.get(listing.id.0.as_str()).map(Vec::as_slice);
            match matches {
                None | Some([]) => {
                    self.mark_missing(&listing.id).await;
                    report.missing.push(listing.id.clone());
                }
                Some(entries) => {
                    match self.update_listing(account, &listing, entries).await {
                        Ok(()) => report.updated += 1,
                        Err(err) => {
                            warn!(
                                target: "price-reconcile",
                                listing = %listing.id,
                                error = %err,
                                "listing update failed"
                            );
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    async fn mark_missing(&self, listing: &ListingId) {
        let message = "listing not found in cart; re-add it to resume monitoring";
        if let Err(err) = self
            .listings
            .record_error(listing, message, Utc::now())
            .await
        {
            warn!(target: "price-reconcile", listing = %listing, error = %err, "failed to record missing state");
        }
    }

    async fn update_listing(
        &self,
        account: &AccountId,
        listing: &ListingRecord,
        entries: &[&CartProduct],
    ) -> Result<(), WatchError> {
        let previous = self.snapshots.latest(&listing.id).await?;
        let variants = merge_variants(entries, previous.as_ref());

        let min_final = min_price(variants.iter().map(|v| v.final_price));
        let min_original = min_price(variants.iter().filter_map(|v| v.original_price));
        let Some(new_price) = min_final else {
            return Err(WatchError::new(format!(
                "no variant of listing {} carries a positive price",
                listing.id
            )));
        };

        let now = Utc::now();
        self.listings
            .update_price_fields(&listing.id, new_price, min_original, now)
            .await?;
        self.snapshots
            .append(PriceSnapshot {
                listing_id: listing.id.clone(),
                min_final_price: new_price,
                min_original_price: min_original,
                captured_at: now,
                variants,
                account_id: account.clone(),
            })
            .await?;

        let old_price = previous
            .as_ref()
            .map(|snap| snap.min_final_price)
            .or(listing.current_price);
        if let Some(old_price) = old_price {
            if old_price.is_finite() && old_price > new_price {
                let drop_amount = old_price - new_price;
                let event = PriceDropEvent {
                    listing_id: listing.id.clone(),
                    title: listing.title.clone(),
                    old_price,
                    new_price,
                    drop_amount,
                    drop_percent: drop_amount / old_price * 100.0,
                };
                self.notifier.price_drop(&event).await;
            }
        }

        self.live
            .listing_updated(&ListingUpdate {
                listing_id: listing.id.clone(),
                title: listing.title.clone(),
                current_price: new_price,
                last_checked_at: now,
            })
            .await;

        Ok(())
    }
}

/// Build the new variant payload: each cart entry merged with the previous
/// snapshot's variant of the same key, so selection metadata the cart DOM
/// cannot express (vid path, structured selections) survives across passes.
fn merge_variants(entries: &[&CartProduct], previous: Option<&PriceSnapshot>) -> Vec<Variant> {
    let mut seen: Vec<VariantKey> = Vec::new();
    let mut variants = Vec::with_capacity(entries.len());

    for entry in entries {
        let key = entry.variant_key();
        if seen.contains(&key) {
            debug!(target: "price-reconcile", key = %key, "duplicate cart line for variant; keeping first");
            continue;
        }

        let prior = previous.and_then(|snap| snap.variant(&key));
        variants.push(Variant {
            key: key.clone(),
            vid_path: prior.and_then(|v| v.vid_path.clone()),
            selections: prior.map(|v| v.selections.clone()).unwrap_or_default(),
            final_price: entry.final_price,
            original_price: entry.original_price,
            thumbnail: entry
                .image_url
                .clone()
                .or_else(|| prior.and_then(|v| v.thumbnail.clone())),
        });
        seen.push(key);
    }

    variants
}

fn min_price(prices: impl Iterator<Item = f64>) -> Option<f64> {
    prices
        .filter(|price| *price > 0.0)
        .fold(None, |acc, price| match acc {
            Some(current) if current <= price => Some(current),
            _ => Some(price),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cartwatch_core_types::PropertySelection;
    use std::sync::Mutex;

    fn product(listing: &str, vid: Option<&str>, props: &str, price: f64, orig: Option<f64>) -> CartProduct {
        CartProduct {
            listing_id: ListingId::new(listing),
            variant_id: vid.map(Into::into),
            props_text: props.into(),
            title: format!("listing {listing}"),
            image_url: None,
            final_price: price,
            original_price: orig,
            quantity: 1,
        }
    }

    #[test]
    fn min_price_ignores_non_positive_entries() {
        assert_eq!(min_price([0.0, -1.0, 12.5, 9.9].into_iter()), Some(9.9));
        assert_eq!(min_price([0.0, 0.0].into_iter()), None);
    }

    #[test]
    fn merge_preserves_prior_selection_metadata() {
        let prior = PriceSnapshot {
            listing_id: ListingId::new("1"),
            min_final_price: 10.0,
            min_original_price: None,
            captured_at: Utc::now(),
            variants: vec![Variant {
                key: VariantKey::from_props("color:red;size:m"),
                vid_path: Some("12:34;56:78".into()),
                selections: vec![PropertySelection {
                    prop_id: "12".into(),
                    prop_name: "color".into(),
                    value_id: "34".into(),
                    value_name: "red".into(),
                }],
                final_price: 10.0,
                original_price: None,
                thumbnail: Some("https://img.example.com/old.jpg".into()),
            }],
            account_id: AccountId::new("a"),
        };

        let entry = product("1", None, "size:m;color:red", 8.0, Some(12.0));
        let merged = merge_variants(&[&entry], Some(&prior));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].vid_path.as_deref(), Some("12:34;56:78"));
        assert_eq!(merged[0].selections.len(), 1);
        assert_eq!(merged[0].final_price, 8.0);
        assert_eq!(
            merged[0].thumbnail.as_deref(),
            Some("https://img.example.com/old.jpg")
        );
    }

    #[derive(Default)]
    struct FakeStores {
        listings: Vec<ListingRecord>,
        latest: Mutex<HashMap<String, PriceSnapshot>>,
        appended: Mutex<Vec<PriceSnapshot>>,
        price_updates: Mutex<Vec<(String, f64)>>,
        errors: Mutex<Vec<(String, String)>>,
        drops: Mutex<Vec<PriceDropEvent>>,
        updates: Mutex<Vec<ListingUpdate>>,
    }

    #[async_trait]
    impl ListingStore for Arc<FakeStores> {
        async fn active_listings(&self, _: &AccountId) -> Result<Vec<ListingRecord>, WatchError> {
            Ok(self.listings.clone())
        }

        async fn update_price_fields(
            &self,
            listing: &ListingId,
            price: f64,
            _original_price: Option<f64>,
            _checked_at: chrono::DateTime<Utc>,
        ) -> Result<(), WatchError> {
            self.price_updates
                .lock()
                .unwrap()
                .push((listing.0.clone(), price));
            Ok(())
        }

        async fn record_error(
            &self,
            listing: &ListingId,
            message: &str,
            _checked_at: chrono::DateTime<Utc>,
        ) -> Result<(), WatchError> {
            self.errors
                .lock()
                .unwrap()
                .push((listing.0.clone(), message.to_string()));
            Ok(())
        }
    }

    #[async_trait]
    impl SnapshotStore for Arc<FakeStores> {
        async fn latest(&self, listing: &ListingId) -> Result<Option<PriceSnapshot>, WatchError> {
            Ok(self.latest.lock().unwrap().get(&listing.0).cloned())
        }

        async fn append(&self, snapshot: PriceSnapshot) -> Result<(), WatchError> {
            self.appended.lock().unwrap().push(snapshot);
            Ok(())
        }
    }

    #[async_trait]
    impl PriceDropNotifier for Arc<FakeStores> {
        async fn price_drop(&self, event: &PriceDropEvent) {
            self.drops.lock().unwrap().push(event.clone());
        }
    }

    #[async_trait]
    impl LiveUpdateSink for Arc<FakeStores> {
        async fn listing_updated(&self, update: &ListingUpdate) {
            self.updates.lock().unwrap().push(update.clone());
        }
    }

    fn base_listing(id: &str, price: Option<f64>) -> ListingRecord {
        ListingRecord {
            id: ListingId::new(id),
            title: format!("listing {id}"),
            variant_key: VariantKey::base(),
            active: true,
            current_price: price,
            current_original_price: None,
            last_checked_at: None,
            last_error: None,
        }
    }

    fn reconciler(stores: &Arc<FakeStores>) -> Reconciler {
        Reconciler::new(
            Arc::new(stores.clone()),
            Arc::new(stores.clone()),
            Arc::new(stores.clone()),
            Arc::new(stores.clone()),
        )
    }

    #[tokio::test]
    async fn computes_min_over_positive_prices_and_null_original() {
        let stores = Arc::new(FakeStores {
            listings: vec![base_listing("1", None)],
            ..Default::default()
        });
        let cart = vec![
            product("1", Some("11"), "size:s", 0.0, None),
            product("1", Some("12"), "size:m", 14.0, None),
            product("1", Some("13"), "size:l", 11.5, None),
        ];

        let report = reconciler(&stores).reconcile(&AccountId::new("a"), &cart).await.unwrap();
        assert_eq!(report.updated, 1);
        assert!(report.is_clean());

        let appended = stores.appended.lock().unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].min_final_price, 11.5);
        assert_eq!(appended[0].min_original_price, None);
        assert_eq!(appended[0].variants.len(), 3);
    }

    #[tokio::test]
    async fn missing_listing_gets_error_not_price_update() {
        let stores = Arc::new(FakeStores {
            listings: vec![base_listing("7", Some(20.0))],
            ..Default::default()
        });

        let report = reconciler(&stores).reconcile(&AccountId::new("a"), &[]).await.unwrap();
        assert_eq!(report.missing, vec![ListingId::new("7")]);
        assert_eq!(report.updated, 0);
        assert_eq!(report.failed, 0);
        assert!(stores.price_updates.lock().unwrap().is_empty());
        assert_eq!(stores.errors.lock().unwrap().len(), 1);
        assert!(stores.appended.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn drop_event_carries_amount_and_percent() {
        let stores = Arc::new(FakeStores {
            listings: vec![base_listing("1", Some(100.0))],
            ..Default::default()
        });

        let cart = vec![product("1", Some("11"), "size:m", 90.0, None)];
        reconciler(&stores).reconcile(&AccountId::new("a"), &cart).await.unwrap();

        let drops = stores.drops.lock().unwrap();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].old_price, 100.0);
        assert_eq!(drops[0].new_price, 90.0);
        assert_eq!(drops[0].drop_amount, 10.0);
        assert!((drops[0].drop_percent - 10.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn price_rise_emits_live_update_but_no_drop() {
        let stores = Arc::new(FakeStores {
            listings: vec![base_listing("1", Some(50.0))],
            ..Default::default()
        });

        let cart = vec![product("1", Some("11"), "size:m", 60.0, None)];
        reconciler(&stores).reconcile(&AccountId::new("a"), &cart).await.unwrap();

        assert!(stores.drops.lock().unwrap().is_empty());
        assert_eq!(stores.updates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn previous_snapshot_min_takes_precedence_over_listing_field() {
        let mut latest = HashMap::new();
        latest.insert(
            "1".to_string(),
            PriceSnapshot {
                listing_id: ListingId::new("1"),
                min_final_price: 95.0,
                min_original_price: None,
                captured_at: Utc::now(),
                variants: vec![],
                account_id: AccountId::new("a"),
            },
        );
        let stores = Arc::new(FakeStores {
            listings: vec![base_listing("1", Some(100.0))],
            latest: Mutex::new(latest),
            ..Default::default()
        });

        let cart = vec![product("1", Some("11"), "size:m", 90.0, None)];
        reconciler(&stores).reconcile(&AccountId::new("a"), &cart).await.unwrap();

        let drops = stores.drops.lock().unwrap();
        assert_eq!(drops[0].old_price, 95.0);
        assert_eq!(drops[0].drop_amount, 5.0);
    }
}
