use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// Lifecycle state of a monitored account.
///
/// `Idle -> Running -> {Idle, Captcha, Locked, Cooldown}`. Transition policy
/// is owned by the caller; the engine only refuses `Locked` accounts and
/// reports challenge detections distinctly so the caller can move the state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    Idle,
    Running,
    Captcha,
    Locked,
    Cooldown,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Idle => "IDLE",
            AccountStatus::Running => "RUNNING",
            AccountStatus::Captcha => "CAPTCHA",
            AccountStatus::Locked => "LOCKED",
            AccountStatus::Cooldown => "COOLDOWN",
        }
    }

    /// Whether the engine may open a browser session for this account.
    pub fn allows_session(&self) -> bool {
        !matches!(self, AccountStatus::Locked)
    }
}

/// Account fields the engine reads and writes back through the store port.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: AccountId,
    /// Serialized cookie set; either a plain JSON array or an encrypted blob.
    pub cookie_blob: Option<String>,
    pub status: AccountStatus,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
}
