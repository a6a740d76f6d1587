use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::detect_chrome_executable;

/// Launch/attach configuration for the shared Chromium process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChromeConfig {
    pub executable: PathBuf,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    /// Attach to an already-running browser instead of launching one.
    pub websocket_url: Option<String>,
    pub command_deadline_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            executable: detect_chrome_executable().unwrap_or_default(),
            user_data_dir: default_profile_dir(),
            headless: resolve_headless_default(),
            websocket_url: resolve_ws_url(),
            command_deadline_ms: 30_000,
            heartbeat_interval_ms: 15_000,
        }
    }
}

impl ChromeConfig {
    pub fn command_deadline(&self) -> Duration {
        Duration::from_millis(self.command_deadline_ms)
    }
}

fn resolve_headless_default() -> bool {
    match env::var("CARTWATCH_HEADLESS") {
        Ok(value) => {
            let lower = value.to_ascii_lowercase();
            !matches!(lower.as_str(), "0" | "false" | "no" | "off")
        }
        Err(_) => true,
    }
}

fn resolve_ws_url() -> Option<String> {
    match env::var("CARTWATCH_WS_URL") {
        Ok(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Err(_) => None,
    }
}

fn default_profile_dir() -> PathBuf {
    if let Ok(path) = env::var("CARTWATCH_CHROME_PROFILE") {
        return PathBuf::from(path);
    }
    Path::new("./.cartwatch-profile").into()
}

/// Per-account session behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cart page every fresh session is pre-navigated to as a warm baseline.
    pub cart_url: String,
    /// Dispose sessions unused for longer than this.
    pub idle_ttl_ms: u64,
    /// Keep sessions open indefinitely (visible-browser mode for operator
    /// supervision); also enables the one top-level scrape retry after a
    /// fatal session error.
    pub keep_open: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_scale_factor: f64,
    pub locale: String,
    pub timezone: String,
    pub user_agent: Option<String>,
    pub navigation_deadline_ms: u64,
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_millis(self.idle_ttl_ms)
    }

    pub fn navigation_deadline(&self) -> Duration {
        Duration::from_millis(self.navigation_deadline_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cart_url: env::var("CARTWATCH_CART_URL")
                .unwrap_or_else(|_| "https://cart.example.com/cart.htm".to_string()),
            idle_ttl_ms: 10 * 60 * 1_000,
            keep_open: matches!(
                env::var("CARTWATCH_KEEP_SESSIONS").as_deref(),
                Ok("1") | Ok("true") | Ok("yes") | Ok("on")
            ),
            viewport_width: 1_366,
            viewport_height: 858,
            device_scale_factor: 1.0,
            locale: "zh-CN".to_string(),
            timezone: "Asia/Shanghai".to_string(),
            user_agent: None,
            navigation_deadline_ms: 30_000,
        }
    }
}
