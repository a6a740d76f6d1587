use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use cartwatch_core_types::AccountId;

use crate::chrome::CdpTransport;
use crate::config::SessionConfig;
use crate::cookies::CookieParam;
use crate::errors::SessionError;

/// The engine owns exactly one active page handle at a time; switching is an
/// explicit operation so the single-page invariant stays enforceable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PageRole {
    Cart,
    Product,
}

#[derive(Clone, Debug)]
struct PageHandle {
    target_id: String,
    cdp_session: String,
}

/// One account's live browser context plus its pages.
pub struct Session {
    account: AccountId,
    transport: Arc<dyn CdpTransport>,
    cfg: SessionConfig,
    context_id: String,
    pages: Mutex<HashMap<PageRole, PageHandle>>,
    active: Mutex<PageRole>,
    cookie_fingerprint: u64,
    last_used: Mutex<Instant>,
    closed: AtomicBool,
    disposed: AtomicBool,
}

impl Session {
    /// Build a fresh session: isolated browser context, one page, realistic
    /// emulation, stored cookies injected, pre-navigated to the cart page as
    /// a warm baseline.
    pub(crate) async fn create(
        transport: Arc<dyn CdpTransport>,
        cfg: SessionConfig,
        account: AccountId,
        cookies: Option<Vec<CookieParam>>,
        cookie_fingerprint: u64,
    ) -> Result<Self, SessionError> {
        let context = transport
            .command(None, "Target.createBrowserContext", json!({ "disposeOnDetach": true }))
            .await?;
        let context_id = string_field(&context, "browserContextId")?;

        let session = Self {
            account,
            transport,
            cfg,
            context_id,
            pages: Mutex::new(HashMap::new()),
            active: Mutex::new(PageRole::Cart),
            cookie_fingerprint,
            last_used: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        };

        let cart = session.open_page().await?;
        session.apply_emulation(&cart).await?;
        if let Some(cookies) = cookies {
            session
                .command_on(&cart, "Network.setCookies", json!({ "cookies": cookies }))
                .await?;
        }
        session.pages.lock().insert(PageRole::Cart, cart);

        let cart_url = session.cfg.cart_url.clone();
        session.navigate(&cart_url).await?;
        Ok(session)
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn cookie_fingerprint(&self) -> u64 {
        self.cookie_fingerprint
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    pub fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }

    /// Make `role` the active page, creating it in this context on first use.
    pub async fn switch_to(&self, role: PageRole) -> Result<(), SessionError> {
        let existing = self.pages.lock().get(&role).cloned();
        let handle = match existing {
            Some(handle) => handle,
            None => {
                let handle = self.open_page().await?;
                self.apply_emulation(&handle).await?;
                self.pages.lock().insert(role, handle.clone());
                handle
            }
        };
        self.track(
            self.transport
                .command(
                    None,
                    "Target.activateTarget",
                    json!({ "targetId": handle.target_id }),
                )
                .await,
        )?;
        *self.active.lock() = role;
        self.touch();
        Ok(())
    }

    pub async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        let handle = self.active_handle()?;
        self.command_on(&handle, "Page.navigate", json!({ "url": url }))
            .await?;
        self.wait_dom_ready(self.cfg.navigation_deadline()).await?;
        self.touch();
        Ok(())
    }

    /// Evaluate an expression on the active page and return its value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, SessionError> {
        let handle = self.active_handle()?;
        let response = self
            .command_on(
                &handle,
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(Value::as_str)
                .or_else(|| details.get("text").and_then(Value::as_str))
                .unwrap_or("script exception");
            return Err(SessionError::CdpIo(format!("evaluate failed: {text}")));
        }

        Ok(response
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    pub async fn dispatch_mouse(&self, payload: Value) -> Result<(), SessionError> {
        let handle = self.active_handle()?;
        self.command_on(&handle, "Input.dispatchMouseEvent", payload)
            .await
            .map(|_| ())
    }

    /// Poll the document ready state until it is at least interactive.
    pub async fn wait_dom_ready(&self, deadline: Duration) -> Result<(), SessionError> {
        let until = Instant::now() + deadline;
        loop {
            match self.evaluate("document.readyState").await {
                Ok(Value::String(state)) if state == "complete" || state == "interactive" => {
                    return Ok(());
                }
                Ok(_) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(target: "browser-session", account = %self.account, error = %err, "ready-state poll failed");
                }
            }
            if Instant::now() >= until {
                return Err(SessionError::Timeout("page did not become ready".into()));
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    pub async fn current_url(&self) -> Result<String, SessionError> {
        match self.evaluate("location.href").await? {
            Value::String(url) => Ok(url),
            other => Err(SessionError::CdpIo(format!(
                "location.href returned {other}"
            ))),
        }
    }

    /// Cheap liveness probe of the active page.
    pub async fn probe_alive(&self) -> bool {
        !self.is_closed() && self.evaluate("1 + 1").await.is_ok()
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    /// Whether this session owns the given DevTools target.
    pub(crate) fn owns_target(&self, target_id: &str) -> bool {
        self.pages
            .lock()
            .values()
            .any(|page| page.target_id == target_id)
    }

    /// Tear the context down. Idempotent and best-effort: close failures are
    /// logged and swallowed, never escalated. Cleanup still runs for a
    /// session whose page handle already died; only a second dispose is a
    /// no-op.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.mark_closed();
        let pages: Vec<PageHandle> = self.pages.lock().values().cloned().collect();
        for page in pages {
            if let Err(err) = self
                .transport
                .command(None, "Target.closeTarget", json!({ "targetId": page.target_id }))
                .await
            {
                debug!(target: "browser-session", account = %self.account, error = %err, "close target failed");
            }
        }
        if let Err(err) = self
            .transport
            .command(
                None,
                "Target.disposeBrowserContext",
                json!({ "browserContextId": self.context_id }),
            )
            .await
        {
            debug!(target: "browser-session", account = %self.account, error = %err, "dispose context failed");
        }
    }

    async fn open_page(&self) -> Result<PageHandle, SessionError> {
        let created = self
            .transport
            .command(
                None,
                "Target.createTarget",
                json!({ "url": "about:blank", "browserContextId": self.context_id }),
            )
            .await?;
        let target_id = string_field(&created, "targetId")?;

        let attached = self
            .transport
            .command(
                None,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let cdp_session = string_field(&attached, "sessionId")?;

        let handle = PageHandle {
            target_id,
            cdp_session,
        };
        self.command_on(&handle, "Page.enable", json!({})).await?;
        self.command_on(&handle, "Runtime.enable", json!({})).await?;
        Ok(handle)
    }

    async fn apply_emulation(&self, handle: &PageHandle) -> Result<(), SessionError> {
        self.command_on(
            handle,
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": self.cfg.viewport_width,
                "height": self.cfg.viewport_height,
                "deviceScaleFactor": self.cfg.device_scale_factor,
                "mobile": false,
            }),
        )
        .await?;
        self.command_on(
            handle,
            "Emulation.setTimezoneOverride",
            json!({ "timezoneId": self.cfg.timezone }),
        )
        .await?;
        self.command_on(
            handle,
            "Emulation.setLocaleOverride",
            json!({ "locale": self.cfg.locale }),
        )
        .await?;
        if let Some(user_agent) = &self.cfg.user_agent {
            self.command_on(
                handle,
                "Emulation.setUserAgentOverride",
                json!({ "userAgent": user_agent, "acceptLanguage": self.cfg.locale }),
            )
            .await?;
        }
        Ok(())
    }

    async fn command_on(
        &self,
        handle: &PageHandle,
        method: &str,
        params: Value,
    ) -> Result<Value, SessionError> {
        self.track(
            self.transport
                .command(Some(handle.cdp_session.clone()), method, params)
                .await,
        )
    }

    fn active_handle(&self) -> Result<PageHandle, SessionError> {
        if self.is_closed() {
            return Err(SessionError::TargetClosed("session already disposed".into()));
        }
        let role = *self.active.lock();
        self.pages.lock().get(&role).cloned().ok_or_else(|| {
            SessionError::TargetClosed(format!("no page handle for {role:?}"))
        })
    }

    /// Record fatality: any closed-target error flips the session so the
    /// manager recreates it on the next use.
    fn track<T>(&self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        if let Err(err) = &result {
            if matches!(err, SessionError::TargetClosed(_)) {
                warn!(target: "browser-session", account = %self.account, error = %err, "session target closed");
                self.mark_closed();
            }
        }
        result
    }
}

fn string_field(value: &Value, field: &str) -> Result<String, SessionError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SessionError::CdpIo(format!("response missing '{field}'")))
}
