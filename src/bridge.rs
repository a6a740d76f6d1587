//! Chromium-backed implementations of the extraction and acquisition ports.
//!
//! Each bridge wraps one account's [`Session`] plus the [`SiteMap`]
//! heuristics; the engine crates stay adapter-agnostic behind their port
//! traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::debug;

use browser_session::{PageRole, Session};
use cart_extract::{CartView, RawLineItem};
use cartwatch_core_types::{
    CartProduct, ListingId, PropertySelection, VariantKey, WatchError,
};
use sku_acquire::ports::{CartProbe, OptionState, ProductPage};
use sku_acquire::tempo;

use crate::site::SiteMap;

/// Cart page read side for the extractor.
pub struct CdpCartView {
    session: Arc<Session>,
    site: Arc<SiteMap>,
}

impl CdpCartView {
    pub fn new(session: Arc<Session>, site: Arc<SiteMap>) -> Self {
        Self { session, site }
    }

    /// Non-null when the session landed on a login/verification surface
    /// instead of the cart.
    pub async fn detect_challenge(&self) -> Result<Option<String>, WatchError> {
        let value = self.session.evaluate(&self.site.challenge_js()).await?;
        Ok(value.as_str().map(str::to_string))
    }
}

#[async_trait]
impl CartView for CdpCartView {
    async fn line_items(&self) -> Result<Vec<RawLineItem>, WatchError> {
        let value = self
            .session
            .evaluate(&self.site.collect_line_items_js())
            .await?;
        serde_json::from_value(value)
            .map_err(|err| WatchError::new(format!("cart items did not deserialize: {err}")))
    }
}

/// Product page driver for the acquisition state machine.
pub struct CdpProductPage {
    session: Arc<Session>,
    site: Arc<SiteMap>,
}

impl CdpProductPage {
    pub fn new(session: Arc<Session>, site: Arc<SiteMap>) -> Self {
        Self { session, site }
    }

    async fn eval(&self, js: &str) -> Result<Value, WatchError> {
        Ok(self.session.evaluate(js).await?)
    }
}

#[derive(Deserialize)]
struct AddButtonState {
    present: bool,
    enabled: bool,
}

#[derive(Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

#[async_trait]
impl ProductPage for CdpProductPage {
    async fn open_listing(&self, listing: &ListingId) -> Result<(), WatchError> {
        self.session.switch_to(PageRole::Product).await?;
        self.session
            .navigate(&self.site.product_url(&listing.0))
            .await?;
        if let Some(detail) = self.detect_challenge().await? {
            return Err(WatchError::challenge(detail));
        }
        Ok(())
    }

    async fn dismiss_obstructions(&self) -> Result<u32, WatchError> {
        let value = self.eval(&self.site.dismiss_obstructions_js()).await?;
        Ok(value.as_u64().unwrap_or(0) as u32)
    }

    async fn option_state(&self, selection: &PropertySelection) -> Result<OptionState, WatchError> {
        let js = self
            .site
            .option_state_js(&selection.prop_name, &selection.value_name);
        let value = self.eval(&js).await?;
        Ok(match value.as_str() {
            Some("selected") => OptionState::Selected,
            Some("disabled") => OptionState::Disabled,
            Some("selectable") => OptionState::Selectable,
            _ => OptionState::Missing,
        })
    }

    async fn click_option(&self, selection: &PropertySelection) -> Result<(), WatchError> {
        let js = self
            .site
            .click_option_js(&selection.prop_name, &selection.value_name);
        let clicked = self.eval(&js).await?;
        if clicked.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(WatchError::new(format!(
                "option control for {}={} vanished before the click",
                selection.prop_name, selection.value_name
            )))
        }
    }

    async fn unselected_dimensions(&self) -> Result<Vec<String>, WatchError> {
        let value = self.eval(&self.site.unselected_dimensions_js()).await?;
        serde_json::from_value(value)
            .map_err(|err| WatchError::new(format!("dimension list did not deserialize: {err}")))
    }

    async fn add_to_cart_enabled(&self) -> Result<bool, WatchError> {
        let value = self.eval(&self.site.add_to_cart_state_js()).await?;
        let state: AddButtonState = serde_json::from_value(value)
            .map_err(|err| WatchError::new(format!("add button state did not deserialize: {err}")))?;
        Ok(state.present && state.enabled)
    }

    async fn cart_count(&self) -> Result<Option<u32>, WatchError> {
        let value = self.eval(&self.site.cart_count_js()).await?;
        Ok(value.as_u64().map(|n| n as u32))
    }

    async fn click_add_to_cart(&self) -> Result<(), WatchError> {
        let value = self.eval(&self.site.add_to_cart_center_js()).await?;
        if value.is_null() {
            return Err(WatchError::new("add-to-cart control not found"));
        }
        let center: Point = serde_json::from_value(value)
            .map_err(|err| WatchError::new(format!("button center did not deserialize: {err}")))?;

        let plan = tempo::pointer_plan(center.x, center.y, &mut StdRng::from_entropy());
        for (x, y) in &plan.path {
            self.session
                .dispatch_mouse(json!({
                    "type": "mouseMoved",
                    "x": x,
                    "y": y,
                    "pointerType": "mouse",
                }))
                .await?;
            sleep(Duration::from_millis(plan.hover_ms / plan.path.len().max(1) as u64)).await;
        }

        let (end_x, end_y) = plan.path.last().copied().unwrap_or((center.x, center.y));
        self.session
            .dispatch_mouse(json!({
                "type": "mousePressed",
                "x": end_x,
                "y": end_y,
                "button": "left",
                "buttons": 1,
                "clickCount": 1,
                "pointerType": "mouse",
            }))
            .await?;
        sleep(Duration::from_millis(plan.press_ms)).await;
        self.session
            .dispatch_mouse(json!({
                "type": "mouseReleased",
                "x": end_x,
                "y": end_y,
                "button": "left",
                "buttons": 1,
                "clickCount": 1,
                "pointerType": "mouse",
            }))
            .await?;
        Ok(())
    }

    async fn success_toast(&self) -> Result<Option<String>, WatchError> {
        let value = self.eval(&self.site.visible_toast_js()).await?;
        Ok(value
            .as_str()
            .filter(|text| self.site.is_success_toast(text))
            .map(str::to_string))
    }

    async fn rejection_reason(&self) -> Result<Option<String>, WatchError> {
        let value = self.eval(&self.site.page_notice_js()).await?;
        Ok(value.as_str().and_then(|text| self.site.rejection_reason_for(text)))
    }

    async fn dismiss_confirmation(&self) -> Result<(), WatchError> {
        let dismissed = self.eval(&self.site.dismiss_confirmation_js()).await?;
        if dismissed.as_bool() == Some(true) {
            debug!(target: "cartwatch", "post-add confirmation dismissed");
        }
        Ok(())
    }

    async fn detect_challenge(&self) -> Result<Option<String>, WatchError> {
        let value = self.eval(&self.site.challenge_js()).await?;
        Ok(value.as_str().map(str::to_string))
    }
}

/// Cart-side operations for the acquisition precheck and post-run refresh.
pub struct CdpCartProbe {
    session: Arc<Session>,
    site: Arc<SiteMap>,
}

impl CdpCartProbe {
    pub fn new(session: Arc<Session>, site: Arc<SiteMap>) -> Self {
        Self { session, site }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartEntry {
    variant_id: Option<String>,
    props: String,
}

#[async_trait]
impl CartProbe for CdpCartProbe {
    async fn open_cart(&self) -> Result<(), WatchError> {
        self.session.switch_to(PageRole::Cart).await?;
        self.session.navigate(&self.site.cart_url).await?;
        Ok(())
    }

    async fn visible_keys_for(&self, listing: &ListingId) -> Result<Vec<VariantKey>, WatchError> {
        let value = self
            .session
            .evaluate(&self.site.listing_entries_js(&listing.0))
            .await?;
        let entries: Vec<CartEntry> = serde_json::from_value(value)
            .map_err(|err| WatchError::new(format!("cart entries did not deserialize: {err}")))?;
        Ok(entries
            .iter()
            .map(|entry| VariantKey::derive(entry.variant_id.as_deref(), &entry.props))
            .collect())
    }

    async fn declared_total(&self) -> Result<Option<u32>, WatchError> {
        let value = self.session.evaluate(&self.site.declared_total_js()).await?;
        Ok(value.as_u64().map(|n| n as u32))
    }

    async fn end_marker_visible(&self) -> Result<bool, WatchError> {
        let value = self.session.evaluate(&self.site.end_marker_js()).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn scroll_position(&self) -> Result<i64, WatchError> {
        let value = self.session.evaluate(&self.site.scroll_position_js()).await?;
        Ok(value.as_i64().unwrap_or(0))
    }

    async fn scroll_by(&self, delta_y: i64) -> Result<(), WatchError> {
        self.session
            .evaluate(&self.site.scroll_by_js(delta_y))
            .await?;
        Ok(())
    }

    async fn refresh_and_extract(&self) -> Result<Vec<CartProduct>, WatchError> {
        self.open_cart().await?;
        let view = CdpCartView::new(self.session.clone(), self.site.clone());
        cart_extract::extract(&view).await
    }
}
