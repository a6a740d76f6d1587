use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use cartwatch_core_types::AccountId;

use crate::chrome::{CdpTransport, ChromeEventObserver, ChromeTransport};
use crate::config::{ChromeConfig, SessionConfig};
use crate::cookies::{self, CookieCodec};
use crate::errors::SessionError;
use crate::session::Session;

/// Owns every account's session and the per-account exclusivity locks.
///
/// At most one live session exists per account; callers are expected to hold
/// [`SessionManager::lock`] for the account around any operation that touches
/// its session, which also serializes disposal against recreation.
pub struct SessionManager {
    cfg: SessionConfig,
    transport: Arc<dyn CdpTransport>,
    codec: Arc<dyn CookieCodec>,
    sessions: Arc<DashMap<AccountId, Arc<Session>>>,
    locks: DashMap<AccountId, Arc<AsyncMutex<()>>>,
}

impl SessionManager {
    /// Production constructor: a lazily-launched Chromium whose target
    /// lifecycle events reactively flip sessions to closed, so the next
    /// `get_or_create` rebuilds them without waiting for a probe failure.
    pub fn new(chrome: ChromeConfig, cfg: SessionConfig, codec: Arc<dyn CookieCodec>) -> Self {
        let sessions: Arc<DashMap<AccountId, Arc<Session>>> = Arc::new(DashMap::new());
        let reactive = sessions.clone();
        let observer: ChromeEventObserver = Arc::new(move |method, params| {
            if method != "Target.targetDestroyed" {
                return;
            }
            let Some(target_id) = params.get("targetId").and_then(|v| v.as_str()) else {
                return;
            };
            for entry in reactive.iter() {
                if entry.value().owns_target(target_id) {
                    debug!(target: "browser-session", account = %entry.key(), target_id, "target destroyed under session");
                    entry.value().mark_closed();
                }
            }
        });
        let transport = Arc::new(ChromeTransport::with_observer(chrome, observer));
        Self {
            cfg,
            transport,
            codec,
            sessions,
            locks: DashMap::new(),
        }
    }

    pub fn with_transport(
        transport: Arc<dyn CdpTransport>,
        cfg: SessionConfig,
        codec: Arc<dyn CookieCodec>,
    ) -> Self {
        Self {
            cfg,
            transport,
            codec,
            sessions: Arc::new(DashMap::new()),
            locks: DashMap::new(),
        }
    }

    /// Acquire the account's exclusive lock. FIFO; release happens on guard
    /// drop, so a panic mid-critical-section cannot leak it.
    pub async fn lock(&self, account: &AccountId) -> OwnedMutexGuard<()> {
        let handle = self
            .locks
            .entry(account.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        handle.lock_owned().await
    }

    /// Get the account's session, recreating it when the page handle is
    /// closed or the supplied cookie blob no longer matches the one the
    /// session was built with. Call under [`SessionManager::lock`].
    #[instrument(skip_all, fields(account = %account.0))]
    pub async fn get_or_create(
        &self,
        account: &AccountId,
        cookie_blob: Option<&str>,
    ) -> Result<Arc<Session>, SessionError> {
        let fingerprint = cookies::fingerprint(cookie_blob);

        if let Some(existing) = self.sessions.get(account).map(|entry| entry.value().clone()) {
            if existing.cookie_fingerprint() != fingerprint {
                info!(target: "browser-session", "cookie fingerprint changed; recreating session");
                existing.dispose().await;
                self.sessions.remove(account);
            } else if !existing.probe_alive().await {
                info!(target: "browser-session", "session page is closed; recreating session");
                existing.dispose().await;
                self.sessions.remove(account);
            } else {
                existing.touch();
                return Ok(existing);
            }
        }

        let cookies = match cookie_blob {
            Some(blob) => Some(cookies::parse_cookie_blob(blob, self.codec.as_ref())?),
            None => None,
        };

        let session = Arc::new(
            Session::create(
                self.transport.clone(),
                self.cfg.clone(),
                account.clone(),
                cookies,
                fingerprint,
            )
            .await?,
        );
        self.sessions.insert(account.clone(), session.clone());
        Ok(session)
    }

    /// Dispose an account's session now, e.g. after a fatal session error.
    pub async fn dispose(&self, account: &AccountId) {
        if let Some((_, session)) = self.sessions.remove(account) {
            session.dispose().await;
        }
    }

    /// Dispose sessions idle past the TTL. Driven by each scrape cycle; a
    /// no-op in keep-open mode. Accounts whose lock is currently held are
    /// skipped rather than raced.
    pub async fn sweep_idle(&self) {
        if self.cfg.keep_open {
            return;
        }

        let ttl = self.cfg.idle_ttl();
        let idle: Vec<AccountId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() > ttl)
            .map(|entry| entry.key().clone())
            .collect();

        for account in idle {
            let Some(handle) = self.locks.get(&account).map(|entry| entry.value().clone()) else {
                // Never locked means never in use; safe to drop directly.
                self.dispose(&account).await;
                continue;
            };
            match handle.try_lock() {
                Ok(_guard) => {
                    debug!(target: "browser-session", account = %account, "evicting idle session");
                    self.dispose(&account).await;
                }
                Err(_) => {
                    warn!(target: "browser-session", account = %account, "idle session busy; skipping eviction");
                }
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
