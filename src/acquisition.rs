use std::sync::Arc;

use tracing::{instrument, warn};

use browser_session::SessionManager;
use cartwatch_core_types::{AccountId, ListingId, WatchError};
use sku_acquire::ports::{ProgressSink, SkuTreeParser};
use sku_acquire::{AcquireOptions, AcquireReport, AcquireRequest, AcquirerBuilder};

use crate::bridge::{CdpCartProbe, CdpProductPage};
use crate::config::WatchConfig;
use crate::pause::PauseHub;
use crate::ports::AccountStore;
use crate::site::SiteMap;

/// User/batch entry point for adding a listing's variants to the cart.
/// Shares the account lock (and therefore the session) with the scraper.
pub struct AcquisitionService {
    cfg: WatchConfig,
    sessions: Arc<SessionManager>,
    accounts: Arc<dyn AccountStore>,
    tree: Arc<dyn SkuTreeParser>,
    pause: Arc<PauseHub>,
    site: Arc<SiteMap>,
}

impl AcquisitionService {
    pub fn new(
        cfg: WatchConfig,
        sessions: Arc<SessionManager>,
        accounts: Arc<dyn AccountStore>,
        tree: Arc<dyn SkuTreeParser>,
        pause: Arc<PauseHub>,
    ) -> Self {
        let site = Arc::new(cfg.site.clone());
        Self {
            cfg,
            sessions,
            accounts,
            tree,
            pause,
            site,
        }
    }

    #[instrument(skip_all, fields(account = %account_id.0, listing = %listing_id))]
    pub async fn add_all_skus(
        &self,
        account_id: &AccountId,
        listing_id: &ListingId,
        options: AcquireOptions,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<AcquireReport, WatchError> {
        let record = self.accounts.load(account_id).await?;
        if !record.status.allows_session() {
            return Err(WatchError::AccountLocked(account_id.0.clone()));
        }

        let _guard = self.sessions.lock(account_id).await;
        let session = self
            .sessions
            .get_or_create(account_id, record.cookie_blob.as_deref())
            .await?;

        let mut builder = AcquirerBuilder::new(self.cfg.acquire.clone())
            .with_page(Arc::new(CdpProductPage::new(session.clone(), self.site.clone())))
            .with_probe(Arc::new(CdpCartProbe::new(session.clone(), self.site.clone())))
            .with_tree(self.tree.clone())
            .with_pause(self.pause.clone());
        if let Some(progress) = progress {
            builder = builder.with_progress(progress);
        }
        let acquirer = builder.build();

        let request = AcquireRequest::new(account_id.clone(), listing_id.clone(), options);
        let result = acquirer.add_all_skus(request).await;

        if let Err(err) = &result {
            if err.is_fatal() {
                self.sessions.dispose(account_id).await;
            }
            if let Err(store_err) = self.accounts.record_error(account_id, &err.to_string()).await {
                warn!(target: "cartwatch", error = %store_err, "failed to persist account error");
            }
        }
        result
    }
}
