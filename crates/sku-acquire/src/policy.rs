use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and retry policy for an acquisition run. Every DOM wait in the
/// engine is bounded by one of these values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcquirePolicy {
    /// Wait for a clicked option to report the selected state.
    pub selection_applied_ms: u64,
    /// Success-signal race window after clicking add-to-cart.
    pub add_confirm_ms: u64,
    /// Settle time after each scroll round during the cart scan.
    pub scroll_round_ms: u64,
    pub max_scroll_rounds: u32,
    /// Inclusive bounds for the randomized sleep between SKUs.
    pub inter_sku_delay_ms: (u64, u64),
    /// Probability that an inter-SKU sleep is extended further, so the
    /// cadence never settles into a fixed rhythm.
    pub long_pause_probability: f64,
    pub long_pause_extra_ms: u64,
    /// Poll interval while suspended on the pause gate; each tick re-emits
    /// progress so a stalled resume stays visible.
    pub pause_poll_ms: u64,
    /// Attempts per SKU; the second attempt is preceded by a product-page
    /// reset.
    pub max_attempts_per_sku: u32,
    pub signal_poll_ms: u64,
}

impl AcquirePolicy {
    pub fn selection_applied(&self) -> Duration {
        Duration::from_millis(self.selection_applied_ms)
    }

    pub fn add_confirm(&self) -> Duration {
        Duration::from_millis(self.add_confirm_ms)
    }

    pub fn scroll_round(&self) -> Duration {
        Duration::from_millis(self.scroll_round_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }

    pub fn signal_poll(&self) -> Duration {
        Duration::from_millis(self.signal_poll_ms)
    }
}

impl Default for AcquirePolicy {
    fn default() -> Self {
        Self {
            selection_applied_ms: 3_000,
            add_confirm_ms: 8_000,
            scroll_round_ms: 1_200,
            max_scroll_rounds: 30,
            inter_sku_delay_ms: (2_000, 6_000),
            long_pause_probability: 0.08,
            long_pause_extra_ms: 9_000,
            pause_poll_ms: 5_000,
            max_attempts_per_sku: 2,
            signal_poll_ms: 150,
        }
    }
}
