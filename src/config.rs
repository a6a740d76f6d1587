use serde::{Deserialize, Serialize};

use browser_session::{ChromeConfig, SessionConfig};
use sku_acquire::AcquirePolicy;

use crate::site::SiteMap;

/// Top-level configuration for the engine. Defaults are production-shaped;
/// every leaf honors its own `CARTWATCH_*` environment overrides.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchConfig {
    pub chrome: ChromeConfig,
    pub session: SessionConfig,
    pub acquire: AcquirePolicy,
    pub site: SiteMap,
    /// How long a scrape waits for an in-flight acquisition to reach its
    /// next SKU boundary before reading the cart anyway.
    pub pause_wait_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        let site = SiteMap::default();
        let session = SessionConfig {
            cart_url: site.cart_url.clone(),
            ..SessionConfig::default()
        };
        Self {
            chrome: ChromeConfig::default(),
            session,
            acquire: AcquirePolicy::default(),
            site,
            pause_wait_ms: 60_000,
        }
    }
}

/// Install the tracing subscriber. `RUST_LOG` filters as usual; calling it
/// twice is harmless.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .try_init();
}
