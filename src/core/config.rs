//! Protocol configuration and parameters.
//!
//! Parameters fixed at construction live in [`ProtocolParams`]. The health
//! threshold and liquidation bonus stay admin-adjustable afterwards through
//! the engines that own them.

use serde::{Deserialize, Serialize};

use crate::core::asset::AssetId;
use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::math::Wad;
use crate::utils::validation::validate_bps;

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Protocol version
    pub version: String,

    /// Asset that is borrowed and repaid
    pub debt_asset: AssetId,

    /// Asset staked for collateral boost
    pub boost_asset: AssetId,

    /// Minimum health factor after any non-liquidation operation
    pub health_threshold: Wad,

    /// Upper bound on base factor plus boost
    pub effective_factor_cap: Wad,

    /// Liquidation bonus in basis points
    pub liquidation_bonus_bps: u64,

    /// Maximum quote age in seconds
    pub max_price_age_secs: u64,

    /// Bonus reached at `boost_reference_stake`
    pub max_boost: Wad,

    /// Stake (raw boost-asset units) at which the full bonus applies
    pub boost_reference_stake: u128,

    /// Share of collected fees routed to the disbursement pool
    pub disbursement_bps: u64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            debt_asset: AssetId::from_static("bUSD"),
            boost_asset: AssetId::from_static("BOOST"),
            health_threshold: Wad::from_raw(DEFAULT_HEALTH_THRESHOLD),
            effective_factor_cap: Wad::from_raw(DEFAULT_EFFECTIVE_FACTOR_CAP),
            liquidation_bonus_bps: DEFAULT_LIQUIDATION_BONUS_BPS,
            max_price_age_secs: DEFAULT_MAX_PRICE_AGE_SECS,
            max_boost: Wad::from_raw(DEFAULT_MAX_BOOST),
            boost_reference_stake: DEFAULT_BOOST_REFERENCE_TOKENS * WAD,
            disbursement_bps: DEFAULT_DISBURSEMENT_BPS,
        }
    }
}

impl ProtocolParams {
    /// Override the liquidation bonus (for testing)
    pub fn with_liquidation_bonus(mut self, bps: u64) -> Self {
        self.liquidation_bonus_bps = bps;
        self
    }

    /// Override the quote age bound (for testing)
    pub fn with_max_price_age(mut self, secs: u64) -> Self {
        self.max_price_age_secs = secs;
        self
    }

    /// Override the boost curve (for testing)
    pub fn with_boost(mut self, max_boost: Wad, reference_stake: u128) -> Self {
        self.max_boost = max_boost;
        self.boost_reference_stake = reference_stake;
        self
    }

    /// Override the debt and boost assets
    pub fn with_assets(mut self, debt_asset: AssetId, boost_asset: AssetId) -> Self {
        self.debt_asset = debt_asset;
        self.boost_asset = boost_asset;
        self
    }

    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &str, reason: &str| Error::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        };

        if self.debt_asset == self.boost_asset {
            return Err(invalid("boost_asset", "must differ from debt_asset"));
        }
        if self.health_threshold.is_zero() {
            return Err(invalid("health_threshold", "must be positive"));
        }
        if self.effective_factor_cap.is_zero() || self.effective_factor_cap > Wad::ONE {
            return Err(invalid("effective_factor_cap", "must be in (0, 1]"));
        }
        if self.max_boost > self.effective_factor_cap {
            return Err(invalid("max_boost", "cannot exceed effective_factor_cap"));
        }
        if self.boost_reference_stake == 0 {
            return Err(invalid("boost_reference_stake", "must be positive"));
        }
        if self.max_price_age_secs == 0 {
            return Err(invalid("max_price_age_secs", "must be positive"));
        }
        validate_bps("liquidation_bonus_bps", self.liquidation_bonus_bps, MAX_LIQUIDATION_BONUS_BPS)?;
        validate_bps("disbursement_bps", self.disbursement_bps, BPS_DIVISOR as u64)?;
        Ok(())
    }
}
