//! End-to-end scrape cycle over a scripted DevTools transport: session
//! creation, cart extraction, reconciliation and error bookkeeping, without
//! a real browser.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use browser_session::{CdpTransport, PassthroughCodec, SessionConfig, SessionError, SessionManager};
use cartwatch::{AccountStore, CartScraper, PauseHub, WatchConfig};
use cartwatch_core_types::{
    AccountId, AccountRecord, AccountStatus, ListingId, ListingRecord, PriceSnapshot, VariantKey,
    WatchError,
};
use price_reconcile::{
    ListingStore, ListingUpdate, LiveUpdateSink, PriceDropEvent, PriceDropNotifier, Reconciler,
    SnapshotStore,
};

/// DevTools endpoint scripted by expression content.
#[derive(Default)]
struct ScriptedTransport {
    counter: Mutex<u32>,
    challenge: AtomicBool,
    cart_items: Mutex<Value>,
    log: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn evaluate(&self, expression: &str) -> Value {
        if expression.contains("document.readyState") {
            return json!("complete");
        }
        if expression.contains("1 + 1") {
            return json!(2);
        }
        if expression.contains("verification widget") {
            return if self.challenge.load(Ordering::SeqCst) {
                json!("redirected to login.example.com/login")
            } else {
                Value::Null
            };
        }
        if expression.contains("propLabels") {
            return self.cart_items.lock().unwrap().clone();
        }
        Value::Null
    }
}

#[async_trait]
impl CdpTransport for ScriptedTransport {
    async fn command(
        &self,
        _session: Option<String>,
        method: &str,
        params: Value,
    ) -> Result<Value, SessionError> {
        self.log.lock().unwrap().push(method.to_string());
        let n = {
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            *counter
        };
        Ok(match method {
            "Target.createBrowserContext" => json!({ "browserContextId": format!("ctx-{n}") }),
            "Target.createTarget" => json!({ "targetId": format!("t-{n}") }),
            "Target.attachToTarget" => json!({ "sessionId": format!("s-{n}") }),
            "Runtime.evaluate" => {
                let expression = params
                    .get("expression")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                json!({ "result": { "value": self.evaluate(expression) } })
            }
            _ => json!({}),
        })
    }
}

#[derive(Default)]
struct MemStores {
    listings: Mutex<Vec<ListingRecord>>,
    price_updates: Mutex<Vec<(String, f64)>>,
    listing_errors: Mutex<Vec<(String, String)>>,
    snapshots: Mutex<Vec<PriceSnapshot>>,
    drops: Mutex<Vec<PriceDropEvent>>,
    accounts: Mutex<HashMap<String, AccountRecord>>,
    account_errors: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ListingStore for Arc<MemStores> {
    async fn active_listings(&self, _: &AccountId) -> Result<Vec<ListingRecord>, WatchError> {
        Ok(self.listings.lock().unwrap().clone())
    }

    async fn update_price_fields(
        &self,
        listing: &ListingId,
        price: f64,
        _original_price: Option<f64>,
        _checked_at: DateTime<Utc>,
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
        _checked_at: DateTime<Utc>,
    ) -> Result<(), WatchError> {
        self.listing_errors
            .lock()
            .unwrap()
            .push((listing.0.clone(), message.to_string()));
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for Arc<MemStores> {
    async fn latest(&self, listing: &ListingId) -> Result<Option<PriceSnapshot>, WatchError> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|snap| snap.listing_id == *listing)
            .cloned())
    }

    async fn append(&self, snapshot: PriceSnapshot) -> Result<(), WatchError> {
        self.snapshots.lock().unwrap().push(snapshot);
        Ok(())
    }
}

#[async_trait]
impl PriceDropNotifier for Arc<MemStores> {
    async fn price_drop(&self, event: &PriceDropEvent) {
        self.drops.lock().unwrap().push(event.clone());
    }
}

#[async_trait]
impl LiveUpdateSink for Arc<MemStores> {
    async fn listing_updated(&self, _update: &ListingUpdate) {}
}

#[async_trait]
impl AccountStore for Arc<MemStores> {
    async fn load(&self, account: &AccountId) -> Result<AccountRecord, WatchError> {
        self.accounts
            .lock()
            .unwrap()
            .get(&account.0)
            .cloned()
            .ok_or_else(|| WatchError::new(format!("unknown account {account}")))
    }

    async fn record_error(&self, account: &AccountId, message: &str) -> Result<(), WatchError> {
        self.account_errors
            .lock()
            .unwrap()
            .push((account.0.clone(), message.to_string()));
        Ok(())
    }

    async fn clear_error(&self, _: &AccountId) -> Result<(), WatchError> {
        Ok(())
    }
}

fn account(id: &str, status: AccountStatus) -> AccountRecord {
    AccountRecord {
        id: AccountId::new(id),
        cookie_blob: Some(r#"[{"name":"sid","value":"abc"}]"#.to_string()),
        status,
        error_count: 0,
        last_error: None,
        last_login_at: None,
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

fn cart_item(listing: &str, sku: &str, int_part: &str, dec_part: &str) -> Value {
    json!({
        "title": format!("listing {listing}"),
        "imageHref": "//img.example.com/p.jpg",
        "price": { "int_part": int_part, "dec_part": dec_part },
        "originalPrice": null,
        "propLabels": ["color:red", "size:m"],
        "detailHref": format!("https://item.example.com/item.htm?id={listing}&skuId={sku}"),
        "quantity": 1
    })
}

fn harness(
    transport: Arc<ScriptedTransport>,
    stores: Arc<MemStores>,
) -> CartScraper {
    let cfg = WatchConfig::default();
    let sessions = Arc::new(SessionManager::with_transport(
        transport,
        SessionConfig::default(),
        Arc::new(PassthroughCodec),
    ));
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(stores.clone()),
        Arc::new(stores.clone()),
        Arc::new(stores.clone()),
        Arc::new(stores.clone()),
    ));
    CartScraper::new(cfg, sessions, Arc::new(stores), reconciler, Arc::new(PauseHub::new()))
}

#[tokio::test]
async fn full_cycle_updates_prices_and_appends_a_snapshot() {
    let transport = Arc::new(ScriptedTransport::default());
    *transport.cart_items.lock().unwrap() = json!([cart_item("42", "7", "12", "50")]);

    let stores = Arc::new(MemStores::default());
    stores
        .accounts
        .lock()
        .unwrap()
        .insert("a1".into(), account("a1", AccountStatus::Idle));
    stores.listings.lock().unwrap().push(base_listing("42", Some(20.0)));

    let scraper = harness(transport.clone(), stores.clone());
    let report = scraper
        .update_prices_from_cart(&AccountId::new("a1"))
        .await
        .unwrap();

    assert_eq!(report.extracted, 1);
    assert_eq!(report.outcome.updated, 1);
    assert!(report.outcome.is_clean());

    let snapshots = stores.snapshots.lock().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].min_final_price, 12.50);
    assert_eq!(snapshots[0].account_id, AccountId::new("a1"));

    // 20.0 -> 12.5 is a drop; one event with both magnitudes.
    let drops = stores.drops.lock().unwrap();
    assert_eq!(drops.len(), 1);
    assert_eq!(drops[0].drop_amount, 7.5);
}

#[tokio::test]
async fn monitored_listing_missing_from_cart_is_flagged() {
    let transport = Arc::new(ScriptedTransport::default());
    *transport.cart_items.lock().unwrap() = json!([]);

    let stores = Arc::new(MemStores::default());
    stores
        .accounts
        .lock()
        .unwrap()
        .insert("a1".into(), account("a1", AccountStatus::Idle));
    stores.listings.lock().unwrap().push(base_listing("42", Some(20.0)));

    let scraper = harness(transport, stores.clone());
    let report = scraper
        .update_prices_from_cart(&AccountId::new("a1"))
        .await
        .unwrap();

    assert_eq!(report.outcome.missing, vec![ListingId::new("42")]);
    assert!(stores.price_updates.lock().unwrap().is_empty());
    assert_eq!(stores.listing_errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn locked_account_is_refused_before_any_browser_work() {
    let transport = Arc::new(ScriptedTransport::default());
    let stores = Arc::new(MemStores::default());
    stores
        .accounts
        .lock()
        .unwrap()
        .insert("a1".into(), account("a1", AccountStatus::Locked));

    let scraper = harness(transport.clone(), stores);
    let err = scraper
        .update_prices_from_cart(&AccountId::new("a1"))
        .await
        .unwrap_err();

    assert!(matches!(err, WatchError::AccountLocked(_)));
    assert!(transport.log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn challenge_surface_aborts_distinctly_and_is_recorded() {
    let transport = Arc::new(ScriptedTransport::default());
    transport.challenge.store(true, Ordering::SeqCst);

    let stores = Arc::new(MemStores::default());
    stores
        .accounts
        .lock()
        .unwrap()
        .insert("a1".into(), account("a1", AccountStatus::Idle));

    let scraper = harness(transport, stores.clone());
    let err = scraper
        .update_prices_from_cart(&AccountId::new("a1"))
        .await
        .unwrap_err();

    assert!(err.is_challenge());
    let errors = stores.account_errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].1.contains("challenge"));
}
