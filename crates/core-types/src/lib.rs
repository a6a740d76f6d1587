//! Shared primitives for the cartwatch engine crates.
//!
//! Everything that crosses a crate boundary lives here: identifiers, the
//! account status machine, the transient extraction records, the persisted
//! snapshot shapes and the shared error currency.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod account;
pub mod cart;
pub mod error;
pub mod key;
pub mod listing;
pub mod sku;
pub mod snapshot;

pub use account::{AccountRecord, AccountStatus};
pub use cart::CartProduct;
pub use error::WatchError;
pub use key::VariantKey;
pub use listing::ListingRecord;
pub use sku::{PropertySelection, SkuCombination};
pub use snapshot::{PriceSnapshot, Variant};

/// Site-native identity of one monitored account.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Site-native identity of one tracked listing.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ListingId(pub String);

impl ListingId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for one scrape or acquisition run.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
