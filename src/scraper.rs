use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use browser_session::{PageRole, SessionManager};
use cartwatch_core_types::{AccountId, AccountRecord, WatchError};
use price_reconcile::{ReconcileReport, Reconciler};

use crate::bridge::CdpCartView;
use crate::config::WatchConfig;
use crate::pause::PauseHub;
use crate::ports::AccountStore;
use crate::site::SiteMap;

/// Outcome of one scrape cycle for one account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrapeReport {
    /// Cart line items extracted this pass.
    pub extracted: usize,
    pub outcome: ReconcileReport,
    /// Whether a fatal session error forced a second attempt.
    pub retried: bool,
}

/// Periodic cart reader: session, extraction, reconciliation, in that
/// order, serialized per account against the acquisition workload.
pub struct CartScraper {
    cfg: WatchConfig,
    sessions: Arc<SessionManager>,
    accounts: Arc<dyn AccountStore>,
    reconciler: Arc<Reconciler>,
    pause: Arc<PauseHub>,
    site: Arc<SiteMap>,
}

impl CartScraper {
    pub fn new(
        cfg: WatchConfig,
        sessions: Arc<SessionManager>,
        accounts: Arc<dyn AccountStore>,
        reconciler: Arc<Reconciler>,
        pause: Arc<PauseHub>,
    ) -> Self {
        let site = Arc::new(cfg.site.clone());
        Self {
            cfg,
            sessions,
            accounts,
            reconciler,
            pause,
            site,
        }
    }

    /// Read the account's cart and reconcile prices for every listing it
    /// monitors.
    #[instrument(skip_all, fields(account = %account_id.0))]
    pub async fn update_prices_from_cart(
        &self,
        account_id: &AccountId,
    ) -> Result<ScrapeReport, WatchError> {
        let record = self.accounts.load(account_id).await?;
        if !record.status.allows_session() {
            return Err(WatchError::AccountLocked(account_id.0.clone()));
        }

        // An in-flight acquisition must park at a SKU boundary before the
        // cart is read from under it.
        let must_resume = self.pause.request_pause(account_id);
        if must_resume {
            let reached = self
                .pause
                .wait_for_safe_point(account_id, Duration::from_millis(self.cfg.pause_wait_ms))
                .await;
            if !reached {
                warn!(target: "cartwatch", "acquisition never reached a safe point; scraping anyway");
            }
        }

        let mut retried = false;
        let mut result = self.scrape_once(&record).await;
        if let Err(err) = &result {
            if err.is_fatal() {
                warn!(target: "cartwatch", error = %err, "fatal session error; disposing session");
                self.sessions.dispose(account_id).await;
                if self.cfg.session.keep_open {
                    retried = true;
                    result = self.scrape_once(&record).await;
                }
            }
        }

        if must_resume {
            self.pause.resume(account_id);
        }

        match result {
            Ok(mut report) => {
                report.retried = retried;
                if report.outcome.is_clean() {
                    let _ = self.accounts.clear_error(account_id).await;
                }
                info!(
                    target: "cartwatch",
                    extracted = report.extracted,
                    updated = report.outcome.updated,
                    failed = report.outcome.failed,
                    missing = report.outcome.missing.len(),
                    retried,
                    "scrape cycle finished"
                );
                Ok(report)
            }
            Err(err) => {
                if let Err(store_err) = self.accounts.record_error(account_id, &err.to_string()).await {
                    warn!(target: "cartwatch", error = %store_err, "failed to persist account error");
                }
                Err(err)
            }
        }
    }

    async fn scrape_once(&self, record: &AccountRecord) -> Result<ScrapeReport, WatchError> {
        let _guard = self.sessions.lock(&record.id).await;
        let session = self
            .sessions
            .get_or_create(&record.id, record.cookie_blob.as_deref())
            .await?;

        // Each cycle doubles as the idle sweep for everyone else's sessions.
        self.sessions.sweep_idle().await;

        session.switch_to(PageRole::Cart).await?;
        session.navigate(&self.site.cart_url).await?;

        let view = CdpCartView::new(session.clone(), self.site.clone());
        if let Some(detail) = view.detect_challenge().await? {
            return Err(WatchError::challenge(detail));
        }

        let products = cart_extract::extract(&view).await?;
        let outcome = self.reconciler.reconcile(&record.id, &products).await?;
        Ok(ScrapeReport {
            extracted: products.len(),
            outcome,
            retried: false,
        })
    }
}
