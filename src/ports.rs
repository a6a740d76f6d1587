use async_trait::async_trait;

use cartwatch_core_types::{AccountId, AccountRecord, WatchError};

/// Account persistence as the orchestration layer needs it. Status
/// transition policy stays with the caller; the engine only reads the
/// record and writes error bookkeeping back.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn load(&self, account: &AccountId) -> Result<AccountRecord, WatchError>;
    /// Persist a user-visible error and bump the error counter.
    async fn record_error(&self, account: &AccountId, message: &str) -> Result<(), WatchError>;
    async fn clear_error(&self, account: &AccountId) -> Result<(), WatchError>;
}
