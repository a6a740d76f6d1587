//! Cart line-item extraction.
//!
//! The DOM side is behind the [`CartView`] port; everything in this crate is
//! pure parsing of the raw fields a view hands back, so the mapping from a
//! concrete site's markup can rot and be replaced without touching the
//! extraction contract.

pub mod model;
pub mod ports;

mod extract;

pub use extract::{extract, parse_price_pair};
pub use model::{RawLineItem, RawPricePair};
pub use ports::CartView;
