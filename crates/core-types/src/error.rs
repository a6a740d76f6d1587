use thiserror::Error;

/// Shared error currency across the engine crates.
///
/// The variants mirror how callers have to react, not where the error came
/// from: a `FatalSession` always tears the session down, a `Challenge` must
/// reach the account state machine unchanged, everything else is a plain
/// message scoped to whatever operation produced it.
#[derive(Debug, Error, Clone)]
pub enum WatchError {
    #[error("{0}")]
    Message(String),
    /// Underlying browser/page/context is gone and must be rebuilt.
    #[error("session unusable: {0}")]
    FatalSession(String),
    /// Landed on a login/verification surface; never retried automatically.
    #[error("authentication challenge: {0}")]
    Challenge(String),
    /// Account is locked out; no new session may be started against it.
    #[error("account {0} is locked")]
    AccountLocked(String),
}

impl WatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::FatalSession(message.into())
    }

    pub fn challenge(message: impl Into<String>) -> Self {
        Self::Challenge(message.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalSession(_))
    }

    pub fn is_challenge(&self) -> bool {
        matches!(self, Self::Challenge(_))
    }
}
