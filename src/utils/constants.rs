//! Protocol constants.
//!
//! All protocol-wide defaults are defined here for easy auditing.

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Wad scale: 10^18
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Basis points divisor (10000 = 100%)
pub const BPS_DIVISOR: u128 = 10_000;

/// Largest decimal scale an asset may declare (10^38 still fits in u128)
pub const MAX_ASSET_DECIMALS: u8 = 38;

// ═══════════════════════════════════════════════════════════════════════════════
// RISK DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Health factor threshold (1.0)
pub const DEFAULT_HEALTH_THRESHOLD: u128 = WAD;

/// Upper bound on the effective collateral factor (0.95)
pub const DEFAULT_EFFECTIVE_FACTOR_CAP: u128 = 950_000_000_000_000_000;

/// Liquidation bonus - 5% (500 basis points)
pub const DEFAULT_LIQUIDATION_BONUS_BPS: u64 = 500;

/// Maximum liquidation bonus admins may configure - 50%
pub const MAX_LIQUIDATION_BONUS_BPS: u64 = 5_000;

/// Maximum liquidation records kept in memory
pub const MAX_LIQUIDATION_HISTORY: usize = 1_000;

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum quote age in seconds (1 hour)
pub const DEFAULT_MAX_PRICE_AGE_SECS: u64 = 3_600;

/// Decimals used by external price feeds
pub const DEFAULT_FEED_DECIMALS: u8 = 8;

// ═══════════════════════════════════════════════════════════════════════════════
// BOOST DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum collateral-factor bonus from staking (+10 percentage points)
pub const DEFAULT_MAX_BOOST: u128 = 100_000_000_000_000_000;

/// Whole boost tokens at which the maximum bonus is reached
pub const DEFAULT_BOOST_REFERENCE_TOKENS: u128 = 5_000;

// ═══════════════════════════════════════════════════════════════════════════════
// REVENUE DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Share of collected fees routed to the disbursement pool - 10%
pub const DEFAULT_DISBURSEMENT_BPS: u64 = 1_000;

// ═══════════════════════════════════════════════════════════════════════════════
// SYSTEM ACCOUNT LABELS
// ═══════════════════════════════════════════════════════════════════════════════

/// Custody account holding collateral and debt-asset liquidity
pub const LENDING_CUSTODY_LABEL: &str = "boostlend/lending-custody";

/// Custody account holding staked boost tokens
pub const BOOST_CUSTODY_LABEL: &str = "boostlend/boost-custody";

/// Account the yield router holds harvested yield in
pub const YIELD_ROUTER_LABEL: &str = "boostlend/yield-router";

/// Identity of the liquidation engine
pub const LIQUIDATION_ENGINE_LABEL: &str = "boostlend/liquidation-engine";

/// Account holding the disbursement share of fees
pub const DISBURSEMENT_POOL_LABEL: &str = "boostlend/disbursement-pool";

/// Account holding the staker share of fees
pub const REWARD_POOL_LABEL: &str = "boostlend/reward-pool";
