use std::collections::HashSet;

use tracing::{debug, warn};

use cartwatch_core_types::{ListingId, VariantKey, WatchError};

use crate::policy::AcquirePolicy;
use crate::ports::CartProbe;

const SCROLL_STEP: i64 = 900;
const REVERSE_NUDGE: i64 = -240;

/// Which variants of `listing` are already in the cart.
///
/// The cart lazy-loads, so the probe scrolls incrementally until one of the
/// stop conditions holds: the listing's item count is stable across two
/// consecutive rounds with nothing new found, the UI-declared total has been
/// reached, or the end-of-list marker is visible. A scroll that does not
/// advance the position is retried once with a wait and a small reverse
/// nudge before the scan gives up with whatever it has.
pub async fn derive_in_cart_index(
    probe: &dyn CartProbe,
    listing: &ListingId,
    policy: &AcquirePolicy,
) -> Result<HashSet<VariantKey>, WatchError> {
    probe.open_cart().await?;

    let mut keys: HashSet<VariantKey> = HashSet::new();
    let mut stable_rounds = 0u32;
    let mut stalls = 0u32;

    for round in 0..policy.max_scroll_rounds {
        let before = keys.len();
        for key in probe.visible_keys_for(listing).await? {
            keys.insert(key);
        }

        if let Some(total) = probe.declared_total().await? {
            if keys.len() as u32 >= total {
                debug!(target: "sku-acquire", listing = %listing, round, "declared cart total reached");
                break;
            }
        }
        if probe.end_marker_visible().await? {
            debug!(target: "sku-acquire", listing = %listing, round, "end-of-cart marker reached");
            break;
        }

        if keys.len() == before {
            stable_rounds += 1;
            if stable_rounds >= 2 {
                debug!(target: "sku-acquire", listing = %listing, round, "cart item count stable");
                break;
            }
        } else {
            stable_rounds = 0;
        }

        let position = probe.scroll_position().await?;
        probe.scroll_by(SCROLL_STEP).await?;
        tokio::time::sleep(policy.scroll_round()).await;

        if probe.scroll_position().await? == position {
            stalls += 1;
            if stalls > 2 {
                warn!(target: "sku-acquire", listing = %listing, "cart scroll made no progress; ending scan");
                break;
            }
            // Lazy loaders sometimes need a backward wiggle to wake up.
            probe.scroll_by(REVERSE_NUDGE).await?;
            tokio::time::sleep(policy.scroll_round()).await;
            probe.scroll_by(SCROLL_STEP - REVERSE_NUDGE).await?;
        } else {
            stalls = 0;
        }
    }

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cartwatch_core_types::CartProduct;
    use std::sync::Mutex;

    /// Reveals one scripted batch of keys per scroll round.
    struct ScriptedCart {
        batches: Vec<Vec<&'static str>>,
        revealed: Mutex<usize>,
        position: Mutex<i64>,
        declared_total: Option<u32>,
        stall_rounds: usize,
        scrolls: Mutex<Vec<i64>>,
    }

    impl ScriptedCart {
        fn new(batches: Vec<Vec<&'static str>>) -> Self {
            Self {
                batches,
                revealed: Mutex::new(1),
                position: Mutex::new(0),
                declared_total: None,
                stall_rounds: 0,
                scrolls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CartProbe for ScriptedCart {
        async fn open_cart(&self) -> Result<(), WatchError> {
            Ok(())
        }

        async fn visible_keys_for(&self, _: &ListingId) -> Result<Vec<VariantKey>, WatchError> {
            let upto = (*self.revealed.lock().unwrap()).min(self.batches.len());
            Ok(self.batches[..upto]
                .iter()
                .flatten()
                .map(|props| VariantKey::from_props(props))
                .collect())
        }

        async fn declared_total(&self) -> Result<Option<u32>, WatchError> {
            Ok(self.declared_total)
        }

        async fn end_marker_visible(&self) -> Result<bool, WatchError> {
            Ok(false)
        }

        async fn scroll_position(&self) -> Result<i64, WatchError> {
            Ok(*self.position.lock().unwrap())
        }

        async fn scroll_by(&self, delta_y: i64) -> Result<(), WatchError> {
            let mut scrolls = self.scrolls.lock().unwrap();
            scrolls.push(delta_y);
            let past_stall = scrolls.len() > self.stall_rounds;
            drop(scrolls);
            if past_stall {
                *self.position.lock().unwrap() += delta_y;
                let mut revealed = self.revealed.lock().unwrap();
                *revealed += 1;
            }
            Ok(())
        }

        async fn refresh_and_extract(&self) -> Result<Vec<CartProduct>, WatchError> {
            Ok(Vec::new())
        }
    }

    fn quick_policy() -> AcquirePolicy {
        AcquirePolicy {
            scroll_round_ms: 1,
            max_scroll_rounds: 12,
            ..AcquirePolicy::default()
        }
    }

    #[tokio::test]
    async fn collects_until_count_stabilizes() {
        let probe = ScriptedCart::new(vec![
            vec!["color:red"],
            vec!["color:blue"],
            vec!["color:green"],
        ]);
        let keys = derive_in_cart_index(&probe, &ListingId::new("1"), &quick_policy())
            .await
            .unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&VariantKey::from_props("color:green")));
    }

    #[tokio::test]
    async fn stops_at_declared_total() {
        let mut probe = ScriptedCart::new(vec![vec!["color:red", "color:blue"]]);
        probe.declared_total = Some(2);
        let keys = derive_in_cart_index(&probe, &ListingId::new("1"), &quick_policy())
            .await
            .unwrap();
        assert_eq!(keys.len(), 2);
        // The total was already met on the first round; no scrolling needed.
        assert!(probe.scrolls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stalled_scroll_gets_a_reverse_nudge() {
        let mut probe = ScriptedCart::new(vec![vec!["color:red"], vec!["color:blue"]]);
        probe.stall_rounds = 1;
        let keys = derive_in_cart_index(&probe, &ListingId::new("1"), &quick_policy())
            .await
            .unwrap();
        assert_eq!(keys.len(), 2);
        let scrolls = probe.scrolls.lock().unwrap();
        assert!(scrolls.contains(&REVERSE_NUDGE));
    }
}
