use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use cartwatch_core_types::{AccountId, CartProduct, ListingId, RunId, VariantKey};

/// One acquisition run: add the missing variants of `listing` to the cart
/// held by `account`'s session.
#[derive(Clone, Debug)]
pub struct AcquireRequest {
    pub run_id: RunId,
    pub account: AccountId,
    pub listing: ListingId,
    pub options: AcquireOptions,
}

impl AcquireRequest {
    pub fn new(account: AccountId, listing: ListingId, options: AcquireOptions) -> Self {
        Self {
            run_id: RunId::new(),
            account,
            listing,
            options,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AcquireOptions {
    /// Desired number of the listing's variants in the cart; 0 means all
    /// available.
    pub target_count: u32,
    /// Variant keys already present in the cart, when the caller has just
    /// scanned it; `None` makes the engine derive the index itself.
    pub in_cart: Option<HashSet<VariantKey>>,
    /// Re-read the cart after the run so the caller gets authoritative
    /// post-acquisition prices without a second scrape cycle.
    pub refresh_cart_after: bool,
}

/// What happened to one selected variant.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SkuOutcome {
    Added,
    AlreadyInCart,
    Failed { reason: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkuResult {
    pub key: VariantKey,
    pub props_text: String,
    pub outcome: SkuOutcome,
    pub elapsed_ms: u64,
}

/// Always returned, even when every SKU failed; only a challenge aborts a
/// run with an error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AcquireReport {
    pub added: u32,
    pub failed: u32,
    pub skipped: u32,
    pub results: Vec<SkuResult>,
    pub refreshed_cart: Option<Vec<CartProduct>>,
}

impl AcquireReport {
    pub fn record(&mut self, result: SkuResult) {
        match &result.outcome {
            SkuOutcome::Added => self.added += 1,
            SkuOutcome::AlreadyInCart => self.skipped += 1,
            SkuOutcome::Failed { .. } => self.failed += 1,
        }
        self.results.push(result);
    }

    pub fn in_cart_total(&self) -> u32 {
        self.added + self.skipped
    }
}

/// Progress callback payload: how far the run is, plus an optional
/// human-readable log line.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Progress {
    pub done: u32,
    pub total: u32,
}

impl Progress {
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            100
        } else {
            (self.done * 100) / self.total
        }
    }
}
