//! Health Engine.
//!
//! ```text
//! collateral_value = price(asset) * collateral
//! effective_factor = min(cap, base_factor(asset) + bonus(owner))
//! adjusted         = collateral_value * effective_factor
//! health_factor    = debt == 0 ? MAX : adjusted / debt_value
//! ```
//!
//! Every division rounds in the protocol's favour: collateral side down,
//! debt side up.

use serde::{Deserialize, Serialize};

use crate::boost::BoostLedger;
use crate::core::asset::AssetId;
use crate::core::position::{Position, PositionId};
use crate::core::registry::CollateralRegistry;
use crate::error::{Error, Result};
use crate::oracle::PriceSnapshot;
use crate::utils::constants::WAD;
use crate::utils::math::{mul_div_ceil, mul_div_floor, Wad};

// ═══════════════════════════════════════════════════════════════════════════════
// PURE CALCULATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Value of `amount` raw units at `price` per whole unit
pub fn collateral_value(amount: u128, unit: u128, price: Wad) -> Result<Wad> {
    mul_div_floor(amount, price.raw(), unit).map(Wad::from_raw)
}

/// Value of `debt` raw units of the debt asset (1:1 with the unit of account)
pub fn debt_value(debt: u128, debt_unit: u128) -> Result<Wad> {
    mul_div_ceil(debt, WAD, debt_unit).map(Wad::from_raw)
}

/// `adjusted / debt_value`, or `Wad::MAX` without debt.
///
/// Dust debt against large collateral pushes the ratio past the Wad range;
/// that saturates to `Wad::MAX` as well.
pub fn health_factor(adjusted: Wad, debt_value: Wad) -> Result<Wad> {
    if debt_value.is_zero() {
        return Ok(Wad::MAX);
    }
    match adjusted.div(debt_value) {
        Err(Error::Overflow { .. }) => Ok(Wad::MAX),
        other => other,
    }
}

/// `min(cap, base + bonus)`
pub fn effective_factor(base: Wad, bonus: Wad, cap: Wad) -> Result<Wad> {
    Ok(base.checked_add(bonus)?.min(cap))
}

// ═══════════════════════════════════════════════════════════════════════════════
// HEALTH REPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-only view of a position's solvency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Position described
    pub position_id: PositionId,
    /// Collateral value in the unit of account
    pub collateral_value: Wad,
    /// Base factor plus boost, capped
    pub effective_factor: Wad,
    /// Risk-adjusted collateral value
    pub borrowing_capacity: Wad,
    /// Debt value in the unit of account
    pub debt_value: Wad,
    /// Health factor
    pub health_factor: Wad,
    /// Additional debt (raw units) the position can take
    pub max_additional_borrow: u128,
    /// Whether liquidation is currently allowed
    pub liquidatable: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// HEALTH ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Health computation over one consistent view of registry, boost and prices
#[derive(Debug, Clone, Copy)]
pub struct HealthEngine<'a> {
    registry: &'a CollateralRegistry,
    boost: &'a BoostLedger,
    prices: &'a PriceSnapshot,
    debt_unit: u128,
    factor_cap: Wad,
    threshold: Wad,
}

impl<'a> HealthEngine<'a> {
    /// Build an engine over borrowed state
    pub fn new(
        registry: &'a CollateralRegistry,
        boost: &'a BoostLedger,
        prices: &'a PriceSnapshot,
        debt_unit: u128,
        factor_cap: Wad,
        threshold: Wad,
    ) -> Self {
        Self {
            registry,
            boost,
            prices,
            debt_unit,
            factor_cap,
            threshold,
        }
    }

    /// Solvency threshold
    pub fn threshold(&self) -> Wad {
        self.threshold
    }

    /// Whether `hf` meets the threshold
    pub fn is_healthy(&self, hf: Wad) -> bool {
        hf >= self.threshold
    }

    /// Effective collateral factor for `asset` under a given bonus
    pub fn effective_factor_with_bonus(&self, asset: &AssetId, bonus: Wad) -> Result<Wad> {
        let config = self.registry.collateral_config(asset)?;
        effective_factor(config.base_factor, bonus, self.factor_cap)
    }

    /// Risk-adjusted collateral value of an (asset, amount) pair
    pub fn adjusted_collateral(&self, asset: &AssetId, collateral: u128, bonus: Wad) -> Result<Wad> {
        let factor = self.effective_factor_with_bonus(asset, bonus)?;
        let price = self.prices.price(asset)?;
        let unit = self.registry.unit(asset)?;
        collateral_value(collateral, unit, price)?.mul(factor)
    }

    /// Health factor of hypothetical balances under a given bonus
    pub fn health_factor_with(&self, asset: &AssetId, collateral: u128, debt: u128, bonus: Wad) -> Result<Wad> {
        let adjusted = self.adjusted_collateral(asset, collateral, bonus)?;
        health_factor(adjusted, debt_value(debt, self.debt_unit)?)
    }

    /// Health factor of a position under the owner's current boost
    pub fn health_factor(&self, position: &Position) -> Result<Wad> {
        let bonus = self.boost.bonus_of(&position.owner)?;
        self.health_factor_with(&position.asset, position.collateral, position.debt, bonus)
    }

    /// Health factor with collateral and debt replaced
    pub fn health_factor_after(&self, position: &Position, collateral: u128, debt: u128) -> Result<Wad> {
        let bonus = self.boost.bonus_of(&position.owner)?;
        self.health_factor_with(&position.asset, collateral, debt, bonus)
    }

    /// Additional debt (raw units) the position can take under the owner's boost
    pub fn max_borrow(&self, position: &Position) -> Result<u128> {
        let bonus = self.boost.bonus_of(&position.owner)?;
        let capacity = self.adjusted_collateral(&position.asset, position.collateral, bonus)?;
        let max_debt = mul_div_floor(capacity.raw(), self.debt_unit, WAD)?;
        Ok(max_debt.saturating_sub(position.debt))
    }

    /// Full solvency report for a position
    pub fn report(&self, position: &Position) -> Result<HealthReport> {
        let bonus = self.boost.bonus_of(&position.owner)?;
        let factor = self.effective_factor_with_bonus(&position.asset, bonus)?;
        let price = self.prices.price(&position.asset)?;
        let unit = self.registry.unit(&position.asset)?;

        let value = collateral_value(position.collateral, unit, price)?;
        let capacity = value.mul(factor)?;
        let debt = debt_value(position.debt, self.debt_unit)?;
        let hf = health_factor(capacity, debt)?;
        let max_debt = mul_div_floor(capacity.raw(), self.debt_unit, WAD)?;

        Ok(HealthReport {
            position_id: position.id,
            collateral_value: value,
            effective_factor: factor,
            borrowing_capacity: capacity,
            debt_value: debt,
            health_factor: hf,
            max_additional_borrow: max_debt.saturating_sub(position.debt),
            liquidatable: position.has_debt() && !self.is_healthy(hf),
        })
    }
}
