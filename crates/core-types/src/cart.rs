use serde::{Deserialize, Serialize};

use crate::{key::VariantKey, ListingId};

/// One cart line item as extracted from the DOM. Lives only for the duration
/// of a single extraction pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartProduct {
    pub listing_id: ListingId,
    pub variant_id: Option<String>,
    /// Raw property labels as rendered in the cart, e.g. `"color:red;size:m"`.
    pub props_text: String,
    pub title: String,
    pub image_url: Option<String>,
    /// After-coupon price actually charged.
    pub final_price: f64,
    /// Before-coupon price when the cart shows one.
    pub original_price: Option<f64>,
    pub quantity: u32,
}

impl CartProduct {
    /// Derived cart-item key, `listingId_variantId`.
    pub fn cart_key(&self) -> String {
        match &self.variant_id {
            Some(vid) if !vid.is_empty() => format!("{}_{}", self.listing_id, vid),
            _ => format!("{}_", self.listing_id),
        }
    }

    /// Stable key used to match this entry against snapshot history.
    pub fn variant_key(&self) -> VariantKey {
        VariantKey::derive(self.variant_id.as_deref(), &self.props_text)
    }
}
