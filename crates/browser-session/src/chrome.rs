//! Shared Chromium process and its DevTools command runtime.
//!
//! One command channel per browser; responses are matched to callers over
//! oneshot responders keyed by call id. The runtime relaunches lazily: a
//! dead connection is detected on the next command and a fresh browser is
//! brought up, leaving it to the session layer to notice its targets died.

use std::collections::HashMap;
use std::convert::TryInto;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::io::{AsyncBufReadExt, BufReader};
use futures::stream::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ChromeConfig;
use crate::errors::{indicates_closed_target, SessionError};

/// Callback invoked for every DevTools event the connection emits; the
/// session manager uses it to notice destroyed targets.
pub type ChromeEventObserver = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Minimal command surface the session layer needs.
#[async_trait]
pub trait CdpTransport: Send + Sync {
    /// Send one DevTools command, browser-scoped when `session` is `None`.
    async fn command(
        &self,
        session: Option<String>,
        method: &str,
        params: Value,
    ) -> Result<Value, SessionError>;
}

/// Lazily-launching transport over a real Chromium.
pub struct ChromeTransport {
    cfg: ChromeConfig,
    state: Mutex<Option<Arc<ChromeRuntime>>>,
    observer: Option<ChromeEventObserver>,
}

impl ChromeTransport {
    pub fn new(cfg: ChromeConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(None),
            observer: None,
        }
    }

    pub fn with_observer(cfg: ChromeConfig, observer: ChromeEventObserver) -> Self {
        Self {
            cfg,
            state: Mutex::new(None),
            observer: Some(observer),
        }
    }

    async fn runtime(&self) -> Result<Arc<ChromeRuntime>, SessionError> {
        let mut guard = self.state.lock().await;
        if let Some(runtime) = guard.as_ref() {
            if runtime.is_alive() {
                return Ok(runtime.clone());
            }
            warn!(target: "browser-session", "chromium runtime died; relaunching");
        }
        let runtime = Arc::new(ChromeRuntime::start(self.cfg.clone(), self.observer.clone()).await?);
        *guard = Some(runtime.clone());
        Ok(runtime)
    }
}

#[async_trait]
impl CdpTransport for ChromeTransport {
    async fn command(
        &self,
        session: Option<String>,
        method: &str,
        params: Value,
    ) -> Result<Value, SessionError> {
        let runtime = self.runtime().await?;
        runtime
            .send(session, method, params, self.cfg.command_deadline())
            .await
    }
}

struct ControlMessage {
    session: Option<String>,
    method: String,
    params: Value,
    responder: oneshot::Sender<Result<Value, SessionError>>,
}

struct ChromeRuntime {
    command_tx: mpsc::Sender<ControlMessage>,
    loop_task: JoinHandle<()>,
    heartbeat_task: Option<JoinHandle<()>>,
    child: std::sync::Mutex<Option<Child>>,
    alive: Arc<AtomicBool>,
}

impl ChromeRuntime {
    async fn start(
        cfg: ChromeConfig,
        observer: Option<ChromeEventObserver>,
    ) -> Result<Self, SessionError> {
        let (child, ws_url) = match cfg.websocket_url.clone() {
            Some(url) => (None, url),
            None => launch_browser(&cfg).await?,
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| SessionError::CdpIo(err.to_string()))?;

        let (command_tx, command_rx) = mpsc::channel(128);
        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = alive.clone();

        let loop_task = tokio::spawn(async move {
            if let Err(err) = run_loop(conn, command_rx, observer).await {
                error!(target: "browser-session", ?err, "devtools loop terminated");
            }
            loop_alive.store(false, Ordering::Relaxed);
        });

        let heartbeat_task = spawn_heartbeat(
            command_tx.clone(),
            alive.clone(),
            Duration::from_millis(cfg.heartbeat_interval_ms),
        );

        info!(target: "browser-session", url = %ws_url, "chromium connection established");

        let runtime = Self {
            command_tx,
            loop_task,
            heartbeat_task,
            child: std::sync::Mutex::new(child),
            alive,
        };

        // Discovery keeps `Target.*` lifecycle events flowing to the
        // observer.
        runtime
            .send(
                None,
                "Target.setDiscoverTargets",
                json!({ "discover": true }),
                Duration::from_millis(cfg.command_deadline_ms),
            )
            .await?;

        Ok(runtime)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn send(
        &self,
        session: Option<String>,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, SessionError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.command_tx
            .send(ControlMessage {
                session,
                method: method.to_string(),
                params,
                responder: resp_tx,
            })
            .await
            .map_err(|err| SessionError::CdpIo(err.to_string()))?;

        match timeout(deadline, resp_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::CdpIo("response channel closed".into())),
            Err(_) => Err(SessionError::Timeout(format!("{method} timed out"))),
        }
    }
}

impl Drop for ChromeRuntime {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.loop_task.abort();
        if let Some(handle) = &self.heartbeat_task {
            handle.abort();
        }

        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(mut child) = guard.take() {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(err) = child.kill().await {
                            warn!(target: "browser-session", ?err, "failed to kill chromium child");
                        }
                    });
                } else {
                    debug!(target: "browser-session", "no runtime available to kill chromium child");
                }
            }
        }
    }
}

async fn run_loop(
    mut conn: Connection<CdpEventMessage>,
    mut command_rx: mpsc::Receiver<ControlMessage>,
    observer: Option<ChromeEventObserver>,
) -> Result<(), SessionError> {
    let mut inflight: HashMap<CallId, oneshot::Sender<Result<Value, SessionError>>> = HashMap::new();

    loop {
        tokio::select! {
            Some(cmd) = command_rx.recv() => {
                let session = cmd.session.map(CdpSessionId::from);
                let method_id: MethodId = cmd.method.clone().into();
                match conn.submit_command(method_id, session, cmd.params) {
                    Ok(call_id) => {
                        inflight.insert(call_id, cmd.responder);
                    }
                    Err(err) => {
                        let _ = cmd.responder.send(Err(map_cdp_error(chromiumoxide::error::CdpError::Serde(err))));
                    }
                }
            }
            message = conn.next() => {
                match message {
                    Some(Ok(Message::Response(resp))) => {
                        if let Some(sender) = inflight.remove(&resp.id) {
                            let _ = sender.send(extract_payload(resp));
                        }
                    }
                    Some(Ok(Message::Event(event))) => {
                        if let Some(observer) = &observer {
                            match TryInto::<CdpJsonEventMessage>::try_into(event) {
                                Ok(raw) => observer(raw.method.as_ref(), &raw.params),
                                Err(err) => {
                                    debug!(target: "browser-session", ?err, "undecodable devtools event");
                                }
                            }
                        }
                    }
                    Some(Err(err)) => {
                        let mapped = map_cdp_error(err);
                        for (_, sender) in inflight.drain() {
                            let _ = sender.send(Err(mapped.clone()));
                        }
                        return Err(mapped);
                    }
                    None => {
                        let err = SessionError::CdpIo("devtools connection closed".into());
                        for (_, sender) in inflight.drain() {
                            let _ = sender.send(Err(err.clone()));
                        }
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn spawn_heartbeat(
    sender: mpsc::Sender<ControlMessage>,
    alive: Arc<AtomicBool>,
    period: Duration,
) -> Option<JoinHandle<()>> {
    if period.as_millis() == 0 {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while alive.load(Ordering::Relaxed) {
            ticker.tick().await;
            let (resp_tx, resp_rx) = oneshot::channel();
            let message = ControlMessage {
                session: None,
                method: "Browser.getVersion".to_string(),
                params: Value::Object(Default::default()),
                responder: resp_tx,
            };
            if sender.send(message).await.is_err() {
                break;
            }
            match timeout(Duration::from_secs(5), resp_rx).await {
                Ok(Ok(Ok(_))) => {}
                other => {
                    warn!(target: "browser-session", ?other, "heartbeat failed");
                    break;
                }
            }
        }
    }))
}

async fn launch_browser(cfg: &ChromeConfig) -> Result<(Option<Child>, String), SessionError> {
    let config = browser_config(cfg)?;
    let mut child = config
        .launch()
        .map_err(|err| SessionError::Launch(err.to_string()))?;
    let ws_url = extract_ws_url(&mut child).await?;
    Ok((Some(child), ws_url))
}

fn browser_config(cfg: &ChromeConfig) -> Result<BrowserConfig, SessionError> {
    if !cfg.executable.as_os_str().is_empty() && !cfg.executable.exists() {
        return Err(SessionError::Launch(format!(
            "chrome executable not found at {}; set CARTWATCH_CHROME",
            cfg.executable.display()
        )));
    }

    let profile_dir = if cfg.user_data_dir.is_absolute() {
        cfg.user_data_dir.clone()
    } else {
        std::env::current_dir()
            .map_err(|err| SessionError::Launch(format!("cwd unavailable: {err}")))?
            .join(&cfg.user_data_dir)
    };
    fs::create_dir_all(&profile_dir)
        .map_err(|err| SessionError::Launch(format!("cannot create profile dir: {err}")))?;

    let mut builder = BrowserConfig::builder()
        .request_timeout(cfg.command_deadline())
        .launch_timeout(Duration::from_secs(20));

    if !cfg.headless {
        builder = builder.with_head();
    }

    let mut args = vec![
        "--disable-background-networking",
        "--disable-background-timer-throttling",
        "--disable-breakpad",
        "--disable-component-update",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-extensions",
        "--disable-hang-monitor",
        "--disable-popup-blocking",
        "--disable-prompt-on-repost",
        "--disable-sync",
        "--metrics-recording-only",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--remote-allow-origins=*",
        "--use-mock-keychain",
    ];
    if cfg.headless {
        args.push("--headless=new");
        args.push("--hide-scrollbars");
        args.push("--mute-audio");
    }
    builder = builder.args(args);

    if !cfg.executable.as_os_str().is_empty() {
        builder = builder.chrome_executable(cfg.executable.clone());
    }
    builder = builder.user_data_dir(profile_dir);

    builder
        .build()
        .map_err(|err| SessionError::Launch(format!("browser config error: {err}")))
}

/// DevTools websocket URL from Chromium stderr.
async fn extract_ws_url(child: &mut Child) -> Result<String, SessionError> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SessionError::Launch("chromium process missing stderr handle".into()))?;
    let mut lines = BufReader::new(stderr).lines();

    let reader = async {
        while let Some(line) = lines.next().await {
            let line = line.map_err(|err| SessionError::Launch(err.to_string()))?;
            if let Some((_, ws)) = line.rsplit_once("listening on ") {
                let ws = ws.trim();
                if ws.starts_with("ws") && ws.contains("devtools/browser") {
                    return Ok(ws.to_string());
                }
            }
        }
        Err(SessionError::Launch(
            "chromium exited before exposing a devtools websocket url".into(),
        ))
    };

    timeout(Duration::from_secs(20), reader)
        .await
        .map_err(|_| SessionError::Launch("timed out waiting for the devtools websocket url".into()))?
}

fn extract_payload(resp: Response) -> Result<Value, SessionError> {
    if let Some(result) = resp.result {
        Ok(result)
    } else if let Some(error) = resp.error {
        let message = format!("cdp error {}: {}", error.code, error.message);
        if indicates_closed_target(&error.message) {
            Err(SessionError::TargetClosed(message))
        } else {
            Err(SessionError::CdpIo(message))
        }
    } else {
        Err(SessionError::CdpIo("empty devtools response".into()))
    }
}

fn map_cdp_error(err: CdpError) -> SessionError {
    let hint = err.to_string();
    match err {
        CdpError::Timeout => SessionError::Timeout(hint),
        _ if indicates_closed_target(&hint) => SessionError::TargetClosed(hint),
        _ => SessionError::CdpIo(hint),
    }
}
