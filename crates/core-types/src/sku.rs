use serde::{Deserialize, Serialize};

use crate::key::VariantKey;

/// One purchasable property combination, as produced by the external SKU
/// tree parser for a single acquisition run. Not persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkuCombination {
    pub sku_id: String,
    /// Normalized property string, e.g. `"color:red;size:m"`.
    pub props_text: String,
    pub stock: u32,
    /// Ordered selections; order matters because selecting one dimension can
    /// re-render the options of the next.
    pub selections: Vec<PropertySelection>,
}

impl SkuCombination {
    pub fn variant_key(&self) -> VariantKey {
        let id = (!self.sku_id.is_empty()).then_some(self.sku_id.as_str());
        VariantKey::derive(id, &self.props_text)
    }

    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// One property dimension choice within a combination.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PropertySelection {
    pub prop_id: String,
    pub prop_name: String,
    pub value_id: String,
    pub value_name: String,
}
