//! Reconciliation of freshly extracted cart products against per-listing
//! price history.
//!
//! The reconciler owns no storage: listings, snapshots, the drop notifier
//! and the live-update sink are all ports, so the same logic runs against
//! the production stores and the in-memory fakes used in tests.

pub mod model;
pub mod ports;

mod reconciler;

pub use model::{DropRule, ListingUpdate, PriceDropEvent, ReconcileReport};
pub use ports::{ListingStore, LiveUpdateSink, PriceDropNotifier, SnapshotStore};
pub use reconciler::Reconciler;
