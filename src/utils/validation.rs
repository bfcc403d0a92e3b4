//! Input validation helpers.

use crate::error::{Error, Result};
use crate::utils::constants::{BPS_DIVISOR, MAX_ASSET_DECIMALS};
use crate::utils::math::Wad;

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that an amount is non-zero
pub fn validate_non_zero(amount: u128) -> Result<()> {
    if amount == 0 {
        return Err(Error::ZeroAmount);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARAMETER VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate a collateral factor lies in (0, 1]
pub fn validate_collateral_factor(name: &str, factor: Wad) -> Result<()> {
    if factor.is_zero() || factor > Wad::ONE {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("factor {} must be in (0, 1]", factor),
        });
    }
    Ok(())
}

/// Validate a basis-point value does not exceed `max`
pub fn validate_bps(name: &str, bps: u64, max: u64) -> Result<()> {
    if bps as u128 > BPS_DIVISOR || bps > max {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("{} bps exceeds maximum {}", bps, max),
        });
    }
    Ok(())
}

/// Validate an asset's decimal scale
pub fn validate_decimals(decimals: u8) -> Result<()> {
    if decimals > MAX_ASSET_DECIMALS {
        return Err(Error::InvalidParameter {
            name: "decimals".into(),
            reason: format!("{} exceeds maximum {}", decimals, MAX_ASSET_DECIMALS),
        });
    }
    Ok(())
}

/// Validate an asset symbol
pub fn validate_symbol(symbol: &str) -> Result<()> {
    if symbol.is_empty() || symbol.len() > 16 {
        return Err(Error::InvalidParameter {
            name: "symbol".into(),
            reason: "must be 1-16 characters".into(),
        });
    }
    if !symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(Error::InvalidParameter {
            name: "symbol".into(),
            reason: format!("{} contains invalid characters", symbol),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_non_zero() {
        assert!(validate_non_zero(1).is_ok());
        assert_eq!(validate_non_zero(0), Err(Error::ZeroAmount));
    }

    #[test]
    fn test_validate_collateral_factor() {
        assert!(validate_collateral_factor("cf", Wad::from_bps(7_500)).is_ok());
        assert!(validate_collateral_factor("cf", Wad::ONE).is_ok());
        assert!(validate_collateral_factor("cf", Wad::ZERO).is_err());
        assert!(validate_collateral_factor("cf", Wad::from_bps(10_001)).is_err());
    }

    #[test]
    fn test_validate_bps() {
        assert!(validate_bps("bonus", 500, 5_000).is_ok());
        assert!(validate_bps("bonus", 6_000, 5_000).is_err());
        assert!(validate_bps("share", 10_001, 20_000).is_err());
    }

    #[test]
    fn test_validate_symbol() {
        assert!(validate_symbol("wBTC").is_ok());
        assert!(validate_symbol("").is_err());
        assert!(validate_symbol("w BTC").is_err());
    }
}
