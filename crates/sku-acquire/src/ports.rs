use async_trait::async_trait;

use cartwatch_core_types::{
    AccountId, CartProduct, ListingId, PropertySelection, SkuCombination, VariantKey, WatchError,
};

use crate::model::Progress;

/// Rendered state of one option control on the product page.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OptionState {
    /// No control matches the dimension/value pair.
    Missing,
    /// Control carries the page's selected marker.
    Selected,
    Selectable,
    Disabled,
}

/// The product page as the state machine needs it. Implementations own the
/// DOM heuristics (selectors, toast patterns, pointer paths); the engine
/// only decides what to do next.
#[async_trait]
pub trait ProductPage: Send + Sync {
    /// Navigate the active page to the listing's detail view. Also used as
    /// the reset step before a retry.
    async fn open_listing(&self, listing: &ListingId) -> Result<(), WatchError>;
    /// Close feature tours, coupon modals and similar overlays currently
    /// blocking interaction. Returns how many were dismissed.
    async fn dismiss_obstructions(&self) -> Result<u32, WatchError>;
    async fn option_state(&self, selection: &PropertySelection) -> Result<OptionState, WatchError>;
    async fn click_option(&self, selection: &PropertySelection) -> Result<(), WatchError>;
    /// Names of property dimensions with no current selection.
    async fn unselected_dimensions(&self) -> Result<Vec<String>, WatchError>;
    async fn add_to_cart_enabled(&self) -> Result<bool, WatchError>;
    /// Visible cart-count indicator, when the page renders one.
    async fn cart_count(&self) -> Result<Option<u32>, WatchError>;
    /// Human-like pointer click on the add-to-cart control (move, press,
    /// release with randomized offset and timing).
    async fn click_add_to_cart(&self) -> Result<(), WatchError>;
    /// Text of a visible affirmative toast/alert, if any.
    async fn success_toast(&self) -> Result<Option<String>, WatchError>;
    /// Human-readable rejection reason from visible toast/page text, per the
    /// ordered rule set (stock, selection, rate limit, challenge, delisted).
    async fn rejection_reason(&self) -> Result<Option<String>, WatchError>;
    /// Close a post-add confirmation popup when present. Best-effort.
    async fn dismiss_confirmation(&self) -> Result<(), WatchError>;
    /// Whether the session landed on a login/verification surface.
    async fn detect_challenge(&self) -> Result<Option<String>, WatchError>;
}

/// Cart-side operations for the precheck scan and the optional post-run
/// refresh.
#[async_trait]
pub trait CartProbe: Send + Sync {
    async fn open_cart(&self) -> Result<(), WatchError>;
    /// Variant keys of the given listing among currently loaded cart items.
    async fn visible_keys_for(&self, listing: &ListingId) -> Result<Vec<VariantKey>, WatchError>;
    /// Total item count the cart UI declares, when it does.
    async fn declared_total(&self) -> Result<Option<u32>, WatchError>;
    /// Whether the end-of-list marker (recommendations section) is loaded.
    async fn end_marker_visible(&self) -> Result<bool, WatchError>;
    async fn scroll_position(&self) -> Result<i64, WatchError>;
    async fn scroll_by(&self, delta_y: i64) -> Result<(), WatchError>;
    async fn refresh_and_extract(&self) -> Result<Vec<CartProduct>, WatchError>;
}

/// External SKU tree parser: all purchasable combinations of a listing.
#[async_trait]
pub trait SkuTreeParser: Send + Sync {
    async fn parse_sku_tree(&self, listing: &ListingId) -> Result<Vec<SkuCombination>, WatchError>;
}

/// Pause/resume coordination with the scraping workload. Pausing is only
/// honored between SKUs, never mid-selection.
#[async_trait]
pub trait PauseGate: Send + Sync {
    fn is_pause_requested(&self, account: &AccountId) -> bool;
    fn mark_acquisition_start(&self, account: &AccountId);
    fn mark_acquisition_end(&self, account: &AccountId);
    async fn notify_paused_at_safe_point(&self, account: &AccountId);
    async fn wait_until_resumed(&self, account: &AccountId);
}

/// Per-run progress callback.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, progress: Progress, line: Option<&str>);
}

/// Sink that drops everything; for callers without a UI.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn progress(&self, _progress: Progress, _line: Option<&str>) {}
}
