//! Price feed implementation.
//!
//! This module provides the oracle seam and its reference implementation:
//! - [`PriceOracle`], the capability the engines consume
//! - [`PriceFeedRegistry`], an in-memory set of per-asset feeds with their own decimals
//! - [`PriceSnapshot`], validated prices captured once per operation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::core::asset::AssetId;
use crate::error::{Error, Result};
use crate::utils::constants::WAD;
use crate::utils::math::{mul_div_floor, pow10, Wad};
use crate::utils::validation::validate_decimals;

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE QUOTE
// ═══════════════════════════════════════════════════════════════════════════════

/// Price of one whole unit of an asset in the unit of account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Price (Wad)
    pub price: Wad,
    /// Unix timestamp of the observation
    pub timestamp: u64,
}

impl PriceQuote {
    /// Get age of the quote in seconds; zero for a quote from the future
    pub fn age(&self, current_time: u64) -> u64 {
        current_time.saturating_sub(self.timestamp)
    }

    /// Whether the quote claims to be newer than `current_time`
    pub fn is_ahead_of(&self, current_time: u64) -> bool {
        self.timestamp > current_time
    }

    /// Check if quote is fresh; a quote from the future never is
    pub fn is_fresh(&self, current_time: u64, max_age: u64) -> bool {
        !self.is_ahead_of(current_time) && self.age(current_time) <= max_age
    }
}

/// Source of asset prices
pub trait PriceOracle {
    /// Latest quote for `asset`; `NoFeedConfigured` if none is set
    fn quote(&self, asset: &AssetId) -> Result<PriceQuote>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// FEED REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Latest round reported by an external feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRound {
    /// Raw answer in feed decimals
    pub answer: i128,
    /// Decimals of `answer`
    pub decimals: u8,
    /// Unix timestamp of the round
    pub updated_at: u64,
}

impl FeedRound {
    /// Normalise the answer to 18 decimals
    pub fn to_quote(&self, asset: &AssetId) -> Result<PriceQuote> {
        if self.answer <= 0 {
            return Err(Error::InvalidPrice {
                asset: asset.to_string(),
                reason: format!("non-positive answer {}", self.answer),
            });
        }
        let answer = self.answer as u128;

        let scaled = if self.decimals <= 18 {
            answer.checked_mul(pow10(18 - self.decimals)?)
        } else {
            Some(mul_div_floor(answer, WAD, pow10(self.decimals)?)?)
        };
        let price = scaled.ok_or_else(|| Error::InvalidPrice {
            asset: asset.to_string(),
            reason: "answer overflows 18-decimal scale".into(),
        })?;

        if price == 0 {
            return Err(Error::InvalidPrice {
                asset: asset.to_string(),
                reason: "answer rounds to zero".into(),
            });
        }

        Ok(PriceQuote {
            price: Wad::from_raw(price),
            timestamp: self.updated_at,
        })
    }
}

/// In-memory price feeds keyed by asset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceFeedRegistry {
    feeds: BTreeMap<AssetId, FeedRound>,
}

impl PriceFeedRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a feed round
    pub fn set_round(&mut self, asset: AssetId, answer: i128, decimals: u8, updated_at: u64) -> Result<()> {
        validate_decimals(decimals)?;
        self.feeds.insert(
            asset,
            FeedRound {
                answer,
                decimals,
                updated_at,
            },
        );
        Ok(())
    }

    /// Record an 18-decimal price
    pub fn set_price(&mut self, asset: AssetId, price: Wad, updated_at: u64) -> Result<()> {
        let answer = i128::try_from(price.raw()).map_err(|_| Error::InvalidPrice {
            asset: asset.to_string(),
            reason: "price exceeds feed range".into(),
        })?;
        self.set_round(asset, answer, 18, updated_at)
    }

    /// Remove a feed
    pub fn remove_feed(&mut self, asset: &AssetId) -> Option<FeedRound> {
        self.feeds.remove(asset)
    }

    /// Latest raw round
    pub fn round(&self, asset: &AssetId) -> Option<&FeedRound> {
        self.feeds.get(asset)
    }
}

impl PriceOracle for PriceFeedRegistry {
    fn quote(&self, asset: &AssetId) -> Result<PriceQuote> {
        self.feeds
            .get(asset)
            .ok_or_else(|| Error::NoFeedConfigured(asset.to_string()))?
            .to_quote(asset)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Fresh prices read once at the start of an operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    taken_at: u64,
    prices: BTreeMap<AssetId, PriceQuote>,
}

impl PriceSnapshot {
    /// Read and validate a quote for every asset
    pub fn capture<'a, I>(oracle: &dyn PriceOracle, assets: I, now: u64, max_age: u64) -> Result<Self>
    where
        I: IntoIterator<Item = &'a AssetId>,
    {
        let mut prices = BTreeMap::new();
        for asset in assets {
            if prices.contains_key(asset) {
                continue;
            }
            let quote = oracle.quote(asset)?;
            if quote.is_ahead_of(now) {
                return Err(Error::InvalidPrice {
                    asset: asset.to_string(),
                    reason: format!("timestamp {} is ahead of block time {}", quote.timestamp, now),
                });
            }
            if !quote.is_fresh(now, max_age) {
                return Err(Error::StalePrice {
                    asset: asset.to_string(),
                    age: quote.age(now),
                    max_age,
                });
            }
            prices.insert(asset.clone(), quote);
        }
        Ok(Self { taken_at: now, prices })
    }

    /// Like [`capture`](Self::capture), but skips assets whose quote is
    /// missing, invalid or stale
    pub fn capture_available<'a, I>(oracle: &dyn PriceOracle, assets: I, now: u64, max_age: u64) -> Self
    where
        I: IntoIterator<Item = &'a AssetId>,
    {
        let mut prices = BTreeMap::new();
        for asset in assets {
            match oracle.quote(asset) {
                Ok(quote) if quote.is_fresh(now, max_age) => {
                    prices.insert(asset.clone(), quote);
                }
                Ok(quote) if quote.is_ahead_of(now) => {
                    debug!(%asset, timestamp = quote.timestamp, "skipping quote from the future")
                }
                Ok(quote) => debug!(%asset, age = quote.age(now), "skipping stale quote"),
                Err(e) => debug!(%asset, "skipping unavailable quote: {}", e),
            }
        }
        Self { taken_at: now, prices }
    }

    /// Whether a price for `asset` was captured
    pub fn contains(&self, asset: &AssetId) -> bool {
        self.prices.contains_key(asset)
    }

    /// Captured price for `asset`
    pub fn price(&self, asset: &AssetId) -> Result<Wad> {
        self.prices
            .get(asset)
            .map(|q| q.price)
            .ok_or_else(|| Error::NoFeedConfigured(asset.to_string()))
    }

    /// Time the snapshot was taken
    pub fn taken_at(&self) -> u64 {
        self.taken_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wbtc() -> AssetId {
        AssetId::new("wBTC").unwrap()
    }

    #[test]
    fn test_feed_decimals_normalised() {
        let mut feeds = PriceFeedRegistry::new();
        feeds.set_round(wbtc(), 6_000_000_000_000, 8, 100).unwrap();
        let quote = feeds.quote(&wbtc()).unwrap();
        assert_eq!(quote.price, Wad::from_integer(60_000).unwrap());
        assert_eq!(quote.timestamp, 100);
    }

    #[test]
    fn test_invalid_and_missing_feed() {
        let mut feeds = PriceFeedRegistry::new();
        assert!(matches!(feeds.quote(&wbtc()), Err(Error::NoFeedConfigured(_))));

        feeds.set_round(wbtc(), 0, 8, 100).unwrap();
        assert!(matches!(feeds.quote(&wbtc()), Err(Error::InvalidPrice { .. })));

        feeds.set_round(wbtc(), -5, 8, 100).unwrap();
        assert!(matches!(feeds.quote(&wbtc()), Err(Error::InvalidPrice { .. })));
    }

    #[test]
    fn test_snapshot_rejects_stale_quote() {
        let mut feeds = PriceFeedRegistry::new();
        feeds.set_price(wbtc(), Wad::from_integer(60_000).unwrap(), 1_000).unwrap();

        let assets = [wbtc()];
        let snapshot = PriceSnapshot::capture(&feeds, &assets, 1_060, 60).unwrap();
        assert_eq!(snapshot.price(&wbtc()).unwrap(), Wad::from_integer(60_000).unwrap());

        let err = PriceSnapshot::capture(&feeds, &assets, 1_061, 60).unwrap_err();
        assert_eq!(
            err,
            Error::StalePrice {
                asset: "wBTC".into(),
                age: 61,
                max_age: 60
            }
        );
    }

    #[test]
    fn test_snapshot_rejects_future_quote() {
        let mut feeds = PriceFeedRegistry::new();
        feeds.set_price(wbtc(), Wad::from_integer(60_000).unwrap(), 1_001).unwrap();

        let assets = [wbtc()];
        let err = PriceSnapshot::capture(&feeds, &assets, 1_000, 60).unwrap_err();
        assert!(matches!(err, Error::InvalidPrice { .. }));
        assert!(!PriceSnapshot::capture_available(&feeds, &assets, 1_000, 60).contains(&wbtc()));
        assert!(PriceSnapshot::capture(&feeds, &assets, 1_001, 60).is_ok());
    }

    #[test]
    fn test_capture_available_skips_bad_feeds() {
        let weth = AssetId::new("wETH").unwrap();
        let mut feeds = PriceFeedRegistry::new();
        feeds.set_price(wbtc(), Wad::from_integer(60_000).unwrap(), 1_000).unwrap();
        feeds.set_price(weth.clone(), Wad::from_integer(3_000).unwrap(), 10).unwrap();

        let assets = [wbtc(), weth.clone()];
        let snapshot = PriceSnapshot::capture_available(&feeds, &assets, 1_000, 60);
        assert!(snapshot.contains(&wbtc()));
        assert!(!snapshot.contains(&weth));
    }

    #[test]
    fn test_snapshot_missing_asset() {
        let snapshot = PriceSnapshot::default();
        assert!(matches!(snapshot.price(&wbtc()), Err(Error::NoFeedConfigured(_))));
    }
}
