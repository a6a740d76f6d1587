use cartwatch_core_types::WatchError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum SessionError {
    #[error("failed to launch chromium: {0}")]
    Launch(String),
    #[error("devtools i/o failure: {0}")]
    CdpIo(String),
    #[error("command timed out: {0}")]
    Timeout(String),
    /// Target, page or browser context is gone; the session must be rebuilt.
    #[error("target closed: {0}")]
    TargetClosed(String),
    #[error("cookie blob unusable: {0}")]
    CookieBlob(String),
}

impl SessionError {
    /// Fatal errors always dispose the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::TargetClosed(_) | SessionError::CdpIo(_))
    }
}

impl From<SessionError> for WatchError {
    fn from(err: SessionError) -> Self {
        if err.is_fatal() {
            WatchError::fatal(err.to_string())
        } else {
            WatchError::new(err.to_string())
        }
    }
}

/// Whether a DevTools error message indicates the target/context no longer
/// exists, as opposed to a transient protocol failure.
pub fn indicates_closed_target(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    [
        "target closed",
        "session closed",
        "no session with given id",
        "no target with given id",
        "browser context",
        "not attached",
        "websocket connection closed",
    ]
    .iter()
    .any(|needle| lowered.contains(needle))
}
