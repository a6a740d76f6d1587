//! Cartwatch: cart-based e-commerce price monitoring.
//!
//! True per-variant prices on the target site are only visible once an item
//! is in the cart, so the engine keeps every monitored variant in a real
//! shopping cart behind a per-account Chromium session and re-reads that
//! cart on a schedule. This root crate is the composition layer: it wires
//! the session manager, the cart extractor, the price reconciler and the
//! SKU acquisition engine together, and owns the site DOM heuristics plus
//! the pause/resume coordination between the two workloads.

pub mod acquisition;
pub mod bridge;
pub mod config;
pub mod pause;
pub mod ports;
pub mod scraper;
pub mod site;

pub use acquisition::AcquisitionService;
pub use config::{init_tracing, WatchConfig};
pub use pause::PauseHub;
pub use ports::AccountStore;
pub use scraper::{CartScraper, ScrapeReport};

pub use browser_session::{SessionConfig, SessionManager};
pub use cartwatch_core_types::{
    AccountId, AccountStatus, CartProduct, ListingId, PriceSnapshot, Variant, VariantKey,
    WatchError,
};
pub use price_reconcile::{DropRule, PriceDropEvent, Reconciler};
pub use sku_acquire::{AcquireOptions, AcquirePolicy, AcquireReport, AcquireRequest};
