//! Fixed-point arithmetic and mathematical utilities.
//!
//! Prices, factors and health factors are [`Wad`] values (18 decimals).
//! Products of two 18-decimal quantities exceed `u128`, so [`mul_div`] keeps a
//! full 256-bit intermediate before dividing.

use std::fmt;
use std::str::FromStr;

use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::utils::constants::{BPS_DIVISOR, MAX_ASSET_DECIMALS, WAD};

// ═══════════════════════════════════════════════════════════════════════════════
// ROUNDING
// ═══════════════════════════════════════════════════════════════════════════════

/// Rounding direction for integer division
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero
    Down,
    /// Away from zero
    Up,
}

// ═══════════════════════════════════════════════════════════════════════════════
// WIDE MULTIPLY / DIVIDE
// ═══════════════════════════════════════════════════════════════════════════════

const LIMB_MASK: u128 = u64::MAX as u128;

/// Full 128x128 -> 256 bit product as (high, low)
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let (a1, a0) = (a >> 64, a & LIMB_MASK);
    let (b1, b0) = (b >> 64, b & LIMB_MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    // Each term is below 2^64, so the sum cannot overflow
    let mid = (p00 >> 64) + (p01 & LIMB_MASK) + (p10 & LIMB_MASK);
    let lo = (p00 & LIMB_MASK) | ((mid & LIMB_MASK) << 64);
    let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (hi, lo)
}

/// Divide the 256-bit value (hi, lo) by `d`; requires `hi < d`
fn div_wide(hi: u128, lo: u128, d: u128) -> (u128, u128) {
    let mut rem = hi;
    let mut quot = 0u128;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        quot <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quot |= 1;
        }
    }
    (quot, rem)
}

/// Computes `a * b / d` with a 256-bit intermediate
pub fn mul_div(a: u128, b: u128, d: u128, rounding: Rounding) -> Result<u128> {
    if d == 0 {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "division by zero".into(),
        });
    }

    let (hi, lo) = widening_mul(a, b);
    let (quot, rem) = if hi == 0 {
        (lo / d, lo % d)
    } else if hi < d {
        div_wide(hi, lo, d)
    } else {
        return Err(Error::Overflow {
            operation: format!("({} * {}) / {}", a, b, d),
        });
    };

    match rounding {
        Rounding::Up if rem != 0 => quot.checked_add(1).ok_or(Error::Overflow {
            operation: format!("ceil(({} * {}) / {})", a, b, d),
        }),
        _ => Ok(quot),
    }
}

/// `a * b / d`, rounded down
pub fn mul_div_floor(a: u128, b: u128, d: u128) -> Result<u128> {
    mul_div(a, b, d, Rounding::Down)
}

/// `a * b / d`, rounded up
pub fn mul_div_ceil(a: u128, b: u128, d: u128) -> Result<u128> {
    mul_div(a, b, d, Rounding::Up)
}

/// 10^decimals for an asset scale
pub fn pow10(decimals: u8) -> Result<u128> {
    if decimals > MAX_ASSET_DECIMALS {
        return Err(Error::InvalidParameter {
            name: "decimals".into(),
            reason: format!("{} exceeds maximum {}", decimals, MAX_ASSET_DECIMALS),
        });
    }
    Ok(10u128.pow(decimals as u32))
}

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Apply a basis-point share, rounding down
pub fn apply_bps(amount: u128, bps: u64) -> Result<u128> {
    mul_div_floor(amount, bps as u128, BPS_DIVISOR)
}

// ═══════════════════════════════════════════════════════════════════════════════
// WAD TYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-point number with 18 decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Wad(u128);

impl Wad {
    /// Scale factor: 10^18
    pub const SCALE: u128 = WAD;

    /// Zero value
    pub const ZERO: Self = Self(0);

    /// One (1.0)
    pub const ONE: Self = Self(WAD);

    /// Largest representable value; stands in for an unbounded health factor
    pub const MAX: Self = Self(u128::MAX);

    /// Create from a raw scaled value
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Get the raw underlying value
    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// Create from an integer (scales up)
    pub fn from_integer(value: u128) -> Result<Self> {
        value.checked_mul(WAD).map(Self).ok_or(Error::Overflow {
            operation: format!("{} * WAD", value),
        })
    }

    /// Create from basis points (100 bps = 1%)
    pub fn from_bps(bps: u64) -> Self {
        Self((bps as u128) * WAD / BPS_DIVISOR)
    }

    /// `numerator / denominator` as a Wad, rounded down
    pub fn from_ratio(numerator: u128, denominator: u128) -> Result<Self> {
        mul_div_floor(numerator, WAD, denominator).map(Self)
    }

    /// Multiply two Wads, rounding down
    pub fn mul(self, other: Self) -> Result<Self> {
        mul_div_floor(self.0, other.0, WAD).map(Self)
    }

    /// Divide two Wads, rounding down
    pub fn div(self, other: Self) -> Result<Self> {
        mul_div_floor(self.0, WAD, other.0).map(Self)
    }

    /// Scale an integer amount by this factor, rounding down
    pub fn mul_int(self, amount: u128) -> Result<u128> {
        mul_div_floor(amount, self.0, WAD)
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Result<Self> {
        safe_add(self.0, other.0).map(Self)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Self) -> Result<Self> {
        safe_sub(self.0, other.0).map(Self)
    }

    /// Saturating subtraction
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Minimum of two values
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Check if value is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Whether this is the unbounded sentinel
    pub fn is_max(&self) -> bool {
        self.0 == u128::MAX
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_max() {
            return write!(f, "inf");
        }
        write!(f, "{}", format_units(self.0, 18))
    }
}

impl FromStr for Wad {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("inf") {
            return Ok(Self::MAX);
        }
        parse_units(s, 18).map(Self)
    }
}

impl Serialize for Wad {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Wad {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HUMAN AMOUNTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a human decimal string ("1.5") into raw units of an asset scale
pub fn parse_units(input: &str, decimals: u8) -> Result<u128> {
    let invalid = |reason: String| Error::InvalidParameter {
        name: "amount".into(),
        reason,
    };

    let value = Decimal::from_str(input.trim()).map_err(|e| invalid(format!("{}: {}", input, e)))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(invalid(format!("{} is negative", input)));
    }

    let value = value.normalize();
    let scale = value.scale();
    if scale > decimals as u32 {
        return Err(invalid(format!(
            "{} has more than {} decimal places",
            input, decimals
        )));
    }

    let mantissa = value
        .mantissa()
        .to_u128()
        .ok_or_else(|| invalid(format!("{} is not representable", input)))?;
    let factor = pow10(decimals - scale as u8)?;
    mantissa.checked_mul(factor).ok_or(Error::Overflow {
        operation: format!("parse_units({}, {})", input, decimals),
    })
}

/// Render raw units as a human decimal string, trimming trailing zeros
pub fn format_units(raw: u128, decimals: u8) -> String {
    let decimals = decimals.min(MAX_ASSET_DECIMALS);
    let unit = 10u128.pow(decimals as u32);
    let whole = raw / unit;
    let frac = raw % unit;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_small() {
        assert_eq!(mul_div_floor(10, 3, 4).unwrap(), 7);
        assert_eq!(mul_div_ceil(10, 3, 4).unwrap(), 8);
        assert_eq!(mul_div_ceil(8, 3, 4).unwrap(), 6);
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 1e18 amount at a 60,000e18 price overflows u128 before dividing
        let amount = WAD;
        let price = 60_000 * WAD;
        assert!(amount.checked_mul(price).is_none());
        assert_eq!(mul_div_floor(amount, price, WAD).unwrap(), price);

        let max = u128::MAX;
        assert_eq!(mul_div_floor(max, max, max).unwrap(), max);
        assert_eq!(mul_div_floor(max, 2, 4).unwrap(), max / 2);
    }

    #[test]
    fn test_mul_div_overflow_and_zero() {
        assert!(matches!(
            mul_div_floor(u128::MAX, 2, 1),
            Err(Error::Overflow { .. })
        ));
        assert!(mul_div_floor(1, 1, 0).is_err());
    }

    #[test]
    fn test_wad_arithmetic() {
        let a = Wad::from_bps(7_500);
        assert_eq!(a.raw(), 750_000_000_000_000_000);
        let hundred = Wad::from_integer(100).unwrap();
        assert_eq!(hundred.mul(a).unwrap(), Wad::from_integer(75).unwrap());
        assert_eq!(
            Wad::from_integer(45).unwrap().div(Wad::from_integer(45).unwrap()).unwrap(),
            Wad::ONE
        );
        assert_eq!(Wad::from_ratio(1, 3).unwrap().raw(), 333_333_333_333_333_333);
        assert_eq!(a.mul_int(60_000).unwrap(), 45_000);
    }

    #[test]
    fn test_wad_display_and_parse() {
        assert_eq!(Wad::from_bps(8_500).to_string(), "0.85");
        assert_eq!(Wad::ONE.to_string(), "1");
        assert_eq!(Wad::MAX.to_string(), "inf");
        assert_eq!("0.75".parse::<Wad>().unwrap(), Wad::from_bps(7_500));
        assert_eq!("inf".parse::<Wad>().unwrap(), Wad::MAX);
    }

    #[test]
    fn test_wad_serde_roundtrip_as_string() {
        let json = serde_json::to_string(&Wad::from_bps(500)).unwrap();
        assert_eq!(json, "\"0.05\"");
        let back: Wad = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Wad::from_bps(500));
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("1", 8).unwrap(), 100_000_000);
        assert_eq!(parse_units("0.945", 8).unwrap(), 94_500_000);
        assert_eq!(parse_units("60000", 18).unwrap(), 60_000 * WAD);
        assert_eq!(parse_units("1.50", 2).unwrap(), 150);
        assert!(parse_units("0.123", 2).is_err());
        assert!(parse_units("-1", 8).is_err());
        assert!(parse_units("abc", 8).is_err());
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(94_500_000, 8), "0.945");
        assert_eq!(format_units(100_000_000, 8), "1");
        assert_eq!(format_units(5, 0), "5");
        assert_eq!(format_units(1, 18), "0.000000000000000001");
    }

    #[test]
    fn test_apply_bps() {
        assert_eq!(apply_bps(10_000, 1_000).unwrap(), 1_000);
        assert_eq!(apply_bps(9, 1_000).unwrap(), 0);
    }

    #[test]
    fn test_safe_ops() {
        assert_eq!(safe_add(1, 2).unwrap(), 3);
        assert!(safe_add(u128::MAX, 1).is_err());
        assert!(matches!(safe_sub(1, 2), Err(Error::Underflow { .. })));
    }
}
