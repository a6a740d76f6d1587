use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable key identifying one variant across snapshots.
///
/// The variant id wins when it is numeric; otherwise the normalized property
/// string is used. Normalization case-folds, collapses delimiter variants to
/// `;` and sorts the property pairs by key so that
/// `"Color:Red;Size:M"` and `"size:m,color:red"` land on the same key.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct VariantKey(String);

impl VariantKey {
    /// Sentinel key on an aggregate listing record: "track the cheapest
    /// available variant" rather than one specific combination.
    pub const BASE: &'static str = "__base__";

    pub fn base() -> Self {
        Self(Self::BASE.to_string())
    }

    pub fn is_base(&self) -> bool {
        self.0 == Self::BASE
    }

    /// Key for a cart or catalog entry: numeric variant id first, property
    /// string fallback.
    pub fn derive(variant_id: Option<&str>, props_text: &str) -> Self {
        if let Some(vid) = variant_id {
            let trimmed = vid.trim();
            if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
                return Self(trimmed.to_string());
            }
        }
        Self::from_props(props_text)
    }

    /// Normalized key from a raw property string.
    pub fn from_props(props_text: &str) -> Self {
        let mut pairs: Vec<String> = props_text
            .to_lowercase()
            .split([';', ','])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                match part.split_once(':') {
                    Some((name, value)) => format!("{}:{}", name.trim(), value.trim()),
                    None => part.to_string(),
                }
            })
            .collect();
        pairs.sort();
        pairs.dedup();
        Self(pairs.join(";"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_variant_id_wins() {
        let key = VariantKey::derive(Some("123"), "color:red;size:m");
        assert_eq!(key.as_str(), "123");
    }

    #[test]
    fn non_numeric_variant_id_falls_back_to_props() {
        let by_props = VariantKey::derive(None, "color:red;size:m");
        assert_eq!(VariantKey::derive(Some("sku-a"), "color:red;size:m"), by_props);
        assert_eq!(VariantKey::derive(Some(""), "color:red;size:m"), by_props);
    }

    #[test]
    fn property_order_is_irrelevant() {
        let a = VariantKey::from_props("color:red;size:m");
        let b = VariantKey::from_props("size:m;color:red");
        assert_eq!(a, b);
    }

    #[test]
    fn normalization_folds_case_and_delimiters() {
        let a = VariantKey::from_props("Color: Red, Size: M");
        let b = VariantKey::from_props("size:m;color:red");
        assert_eq!(a, b);
    }

    #[test]
    fn numeric_id_and_props_key_differ() {
        let by_id = VariantKey::derive(Some("123"), "color:red;size:m");
        let by_props = VariantKey::derive(None, "color:red;size:m");
        assert_ne!(by_id, by_props);
    }
}
