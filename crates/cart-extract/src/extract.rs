use cartwatch_core_types::{CartProduct, ListingId, WatchError};
use tracing::debug;
use url::Url;

use crate::model::{RawLineItem, RawPricePair};
use crate::ports::CartView;

/// Extract all cart line items into [`CartProduct`] records.
///
/// Output order equals DOM order; no dedup, no sort. Items whose listing id
/// cannot be determined from the detail link are skipped.
pub async fn extract(view: &dyn CartView) -> Result<Vec<CartProduct>, WatchError> {
    let raw = view.line_items().await?;
    let mut products = Vec::with_capacity(raw.len());

    for item in raw {
        let (listing_id, variant_id) = match item.detail_href.as_deref().and_then(parse_detail_ids) {
            Some(ids) => ids,
            None => {
                debug!(
                    target: "cart-extract",
                    title = %item.title,
                    "skipping cart line without a resolvable listing id"
                );
                continue;
            }
        };

        let final_price = match parse_price_pair(&item.price) {
            Some(price) => price,
            None => {
                debug!(
                    target: "cart-extract",
                    listing = %listing_id,
                    "skipping cart line with unparsable price"
                );
                continue;
            }
        };

        products.push(CartProduct {
            listing_id: ListingId::new(listing_id),
            variant_id,
            props_text: item.prop_labels.join(";"),
            title: item.title,
            image_url: item.image_href.as_deref().map(normalize_image_url),
            final_price,
            original_price: item.original_price.as_ref().and_then(parse_price_pair),
            quantity: item.quantity.unwrap_or(1),
        });
    }

    Ok(products)
}

/// Concatenate the rendered integer and decimal fragments into a price.
///
/// Group separators inside the integer fragment are dropped; a missing or
/// empty decimal fragment means a whole amount.
pub fn parse_price_pair(pair: &RawPricePair) -> Option<f64> {
    let int_digits: String = pair.int_part.chars().filter(|c| c.is_ascii_digit()).collect();
    if int_digits.is_empty() {
        return None;
    }
    let dec_digits: String = pair.dec_part.chars().filter(|c| c.is_ascii_digit()).collect();
    let text = if dec_digits.is_empty() {
        int_digits
    } else {
        format!("{int_digits}.{dec_digits}")
    };
    text.parse().ok()
}

/// `//`-prefixed URLs are protocol-relative in the markup; pin them to https.
fn normalize_image_url(href: &str) -> String {
    if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        href.to_string()
    }
}

/// Listing and variant ids from a detail-page link (`id`, `skuId` query
/// parameters). Protocol-relative links are accepted.
fn parse_detail_ids(href: &str) -> Option<(String, Option<String>)> {
    let absolute;
    let href = if href.starts_with("//") {
        absolute = format!("https:{href}");
        absolute.as_str()
    } else {
        href
    };
    let parsed = Url::parse(href).ok()?;

    let mut listing = None;
    let mut variant = None;
    for (name, value) in parsed.query_pairs() {
        match name.as_ref() {
            "id" if listing.is_none() => listing = Some(value.into_owned()),
            "skuId" if variant.is_none() => variant = Some(value.into_owned()),
            _ => {}
        }
    }

    let listing = listing.filter(|id| !id.is_empty())?;
    Some((listing, variant.filter(|v| !v.is_empty())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedView(Vec<RawLineItem>);

    #[async_trait]
    impl CartView for FixedView {
        async fn line_items(&self) -> Result<Vec<RawLineItem>, WatchError> {
            Ok(self.0.clone())
        }
    }

    fn line(title: &str, href: Option<&str>, int_part: &str, dec_part: &str) -> RawLineItem {
        RawLineItem {
            title: title.into(),
            image_href: Some("//img.example.com/t.jpg".into()),
            price: RawPricePair {
                int_part: int_part.into(),
                dec_part: dec_part.into(),
            },
            original_price: None,
            prop_labels: vec!["color:red".into(), "size:m".into()],
            detail_href: href.map(Into::into),
            quantity: Some(1),
        }
    }

    #[tokio::test]
    async fn extracts_ids_prices_and_normalized_image() {
        let view = FixedView(vec![line(
            "shirt",
            Some("https://shop.example.com/item?id=42&skuId=7"),
            "1,299",
            "90",
        )]);
        let products = extract(&view).await.unwrap();
        assert_eq!(products.len(), 1);
        let p = &products[0];
        assert_eq!(p.listing_id.0, "42");
        assert_eq!(p.variant_id.as_deref(), Some("7"));
        assert_eq!(p.final_price, 1299.90);
        assert_eq!(p.image_url.as_deref(), Some("https://img.example.com/t.jpg"));
        assert_eq!(p.props_text, "color:red;size:m");
        assert_eq!(p.cart_key(), "42_7");
    }

    #[tokio::test]
    async fn skips_lines_without_listing_id() {
        let view = FixedView(vec![
            line("no link", None, "10", ""),
            line("no id", Some("https://shop.example.com/item?skuId=7"), "10", ""),
            line("ok", Some("//shop.example.com/item?id=9"), "10", "50"),
        ]);
        let products = extract(&view).await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].listing_id.0, "9");
        assert_eq!(products[0].variant_id, None);
        assert_eq!(products[0].final_price, 10.50);
    }

    #[tokio::test]
    async fn preserves_dom_order_without_dedup() {
        let view = FixedView(vec![
            line("b", Some("https://s.example.com/i?id=2"), "2", ""),
            line("a", Some("https://s.example.com/i?id=1"), "1", ""),
            line("b again", Some("https://s.example.com/i?id=2"), "3", ""),
        ]);
        let products = extract(&view).await.unwrap();
        let ids: Vec<_> = products.iter().map(|p| p.listing_id.0.as_str()).collect();
        assert_eq!(ids, ["2", "1", "2"]);
    }

    #[test]
    fn price_pair_edge_cases() {
        let whole = RawPricePair {
            int_part: "15".into(),
            dec_part: String::new(),
        };
        assert_eq!(parse_price_pair(&whole), Some(15.0));

        let garbage = RawPricePair {
            int_part: "free".into(),
            dec_part: "00".into(),
        };
        assert_eq!(parse_price_pair(&garbage), None);
    }
}
