//! In-memory pause/resume coordination between the scraping and acquisition
//! workloads.
//!
//! The scraper requests a pause before reading the cart; an in-flight
//! acquisition acknowledges at its next SKU boundary and blocks until
//! resumed. All waits here are backed by [`tokio::sync::Notify`] plus
//! polled flags, so neither side can be wedged by a missed wakeup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::debug;

use cartwatch_core_types::AccountId;
use sku_acquire::ports::PauseGate;

#[derive(Default)]
struct PauseState {
    requested: AtomicBool,
    acquisition_active: AtomicBool,
    at_safe_point: AtomicBool,
    resumed: Notify,
    safe_point: Notify,
}

#[derive(Default)]
pub struct PauseHub {
    states: DashMap<AccountId, Arc<PauseState>>,
}

impl PauseHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, account: &AccountId) -> Arc<PauseState> {
        self.states
            .entry(account.clone())
            .or_insert_with(|| Arc::new(PauseState::default()))
            .clone()
    }

    /// Ask the account's acquisition (if any) to pause. Returns whether an
    /// acquisition is currently running and therefore needs waiting on.
    pub fn request_pause(&self, account: &AccountId) -> bool {
        let state = self.state(account);
        state.requested.store(true, Ordering::SeqCst);
        state.acquisition_active.load(Ordering::SeqCst)
    }

    /// Wait until the paused acquisition reaches a SKU boundary (or ends).
    /// Returns `false` on timeout.
    pub async fn wait_for_safe_point(&self, account: &AccountId, deadline: Duration) -> bool {
        let state = self.state(account);
        let until = Instant::now() + deadline;
        loop {
            if !state.acquisition_active.load(Ordering::SeqCst)
                || state.at_safe_point.load(Ordering::SeqCst)
            {
                return true;
            }
            if Instant::now() >= until {
                return false;
            }
            let notified = state.safe_point.notified();
            tokio::select! {
                _ = notified => {}
                _ = sleep(Duration::from_millis(100)) => {}
            }
        }
    }

    pub fn resume(&self, account: &AccountId) {
        let state = self.state(account);
        state.requested.store(false, Ordering::SeqCst);
        state.at_safe_point.store(false, Ordering::SeqCst);
        state.resumed.notify_waiters();
        debug!(target: "cartwatch", account = %account, "acquisition resumed");
    }
}

#[async_trait]
impl PauseGate for PauseHub {
    fn is_pause_requested(&self, account: &AccountId) -> bool {
        self.state(account).requested.load(Ordering::SeqCst)
    }

    fn mark_acquisition_start(&self, account: &AccountId) {
        let state = self.state(account);
        state.acquisition_active.store(true, Ordering::SeqCst);
        state.at_safe_point.store(false, Ordering::SeqCst);
    }

    fn mark_acquisition_end(&self, account: &AccountId) {
        let state = self.state(account);
        state.acquisition_active.store(false, Ordering::SeqCst);
        state.at_safe_point.store(false, Ordering::SeqCst);
        // A finished run is as safe as a boundary for anyone waiting.
        state.safe_point.notify_waiters();
    }

    async fn notify_paused_at_safe_point(&self, account: &AccountId) {
        let state = self.state(account);
        state.at_safe_point.store(true, Ordering::SeqCst);
        state.safe_point.notify_waiters();
    }

    async fn wait_until_resumed(&self, account: &AccountId) {
        let state = self.state(account);
        let notified = state.resumed.notified();
        if !state.requested.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }
}
