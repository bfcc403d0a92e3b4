//! Oracle module for price feeds.
//!
//! The engines never talk to a feed directly: each operation captures a
//! [`PriceSnapshot`] from a [`PriceOracle`] and reads every price from it.

pub mod price_feed;

pub use price_feed::*;
