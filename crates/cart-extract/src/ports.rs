use async_trait::async_trait;
use cartwatch_core_types::WatchError;

use crate::model::RawLineItem;

/// Read side of the cart page. Implementations must not navigate or wait;
/// the caller is responsible for having settled the page first.
#[async_trait]
pub trait CartView: Send + Sync {
    /// All cart line items currently in the DOM, in document order.
    async fn line_items(&self) -> Result<Vec<RawLineItem>, WatchError>;
}
