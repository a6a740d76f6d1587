use serde::{Deserialize, Serialize};

/// Integer/decimal price fragments as rendered by the cart markup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawPricePair {
    pub int_part: String,
    pub dec_part: String,
}

/// Raw fields of one cart line item, in DOM order, before any parsing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLineItem {
    pub title: String,
    pub image_href: Option<String>,
    /// After-coupon price; always present on a purchasable line.
    pub price: RawPricePair,
    /// Before-coupon price when the line shows a discount.
    pub original_price: Option<RawPricePair>,
    /// Property labels as rendered, e.g. `["color:red", "size:m"]`.
    pub prop_labels: Vec<String>,
    /// Href of the item's detail-page link; carries the listing/variant ids.
    pub detail_href: Option<String>,
    pub quantity: Option<u32>,
}
