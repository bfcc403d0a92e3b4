//! boostlend Command Line Interface.
//!
//! Configuration, scenario replay and output helpers behind the
//! `boostlend` binary.

pub mod config;
pub mod output;
pub mod scenario;

pub use config::*;
pub use output::*;
pub use scenario::*;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::risk::{collateral_value, debt_value, effective_factor, health_factor};
use crate::utils::constants::WAD;
use crate::utils::math::Wad;

// ═══════════════════════════════════════════════════════════════════════════════
// OFFLINE HEALTH
// ═══════════════════════════════════════════════════════════════════════════════

/// Inputs of a stand-alone health factor computation, in whole units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthQuery {
    /// Collateral amount
    pub collateral: Wad,
    /// Price per whole collateral unit
    pub price: Wad,
    /// Base collateral factor
    pub factor: Wad,
    /// Debt amount
    pub debt: Wad,
    /// Boost bonus
    pub bonus: Wad,
    /// Cap on factor plus bonus
    pub cap: Wad,
}

/// Result of a [`HealthQuery`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthAnswer {
    /// Collateral value
    pub collateral_value: Wad,
    /// Factor actually applied
    pub effective_factor: Wad,
    /// Risk-adjusted collateral value
    pub borrowing_capacity: Wad,
    /// Health factor, `Wad::MAX` without debt
    pub health_factor: Wad,
}

impl HealthQuery {
    /// Run the same math the Health Engine uses
    pub fn evaluate(&self) -> Result<HealthAnswer> {
        let value = collateral_value(self.collateral.raw(), WAD, self.price)?;
        let factor = effective_factor(self.factor, self.bonus, self.cap)?;
        let capacity = value.mul(factor)?;
        Ok(HealthAnswer {
            collateral_value: value,
            effective_factor: factor,
            borrowing_capacity: capacity,
            health_factor: health_factor(capacity, debt_value(self.debt.raw(), WAD)?)?,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
