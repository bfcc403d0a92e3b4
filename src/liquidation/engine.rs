//! Liquidation Engine.
//!
//! This module handles the liquidation of undercollateralized positions:
//! - Detection of positions below the health threshold
//! - Seizure sizing with the liquidation bonus
//! - Settlement against the liquidator, with residual debt write-off
//!
//! ```text
//! repaid     = min(repay_amount, debt)
//! seize      = min(repaid_value * (1 + bonus) / price, collateral)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::core::access::AccessControl;
use crate::core::asset::AssetId;
use crate::core::position::PositionId;
use crate::error::{Error, Result};
use crate::lending::engine::LendingEngine;
use crate::oracle::PriceSnapshot;
use crate::protocol::context::OperationContext;
use crate::protocol::events::{LiquidatedEvent, ProtocolEvent};
use crate::utils::constants::*;
use crate::utils::crypto::AccountId;
use crate::utils::math::*;
use crate::utils::validation::{validate_bps, validate_non_zero};

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// Record of a completed liquidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRecord {
    /// Position that was liquidated
    pub position_id: PositionId,
    /// Owner of the liquidated position
    pub owner: AccountId,
    /// Liquidator who triggered the liquidation
    pub liquidator: AccountId,
    /// Collateral asset
    pub asset: AssetId,
    /// Debt repaid by the liquidator
    pub debt_repaid: u128,
    /// Collateral paid to the liquidator
    pub collateral_seized: u128,
    /// Residual debt written off
    pub written_off: u128,
    /// Debt left on the position
    pub remaining_debt: u128,
    /// Collateral left on the position
    pub remaining_collateral: u128,
    /// Health factor before liquidation
    pub health_factor: Wad,
    /// Collateral price used
    pub price: Wad,
    /// Block height
    pub block_height: u64,
}

/// Running liquidation statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationStats {
    /// Liquidations performed
    pub count: u64,
    /// Debt repaid by liquidators
    pub total_debt_repaid: u128,
    /// Residual debt written off
    pub total_written_off: u128,
    /// Collateral seized per asset
    pub collateral_seized: BTreeMap<AssetId, u128>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine for liquidating undercollateralized positions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEngine {
    /// Engine identity, wired into the lending engine
    account: AccountId,
    /// Admin gate for the bonus
    access: AccessControl,
    /// Liquidation bonus in basis points
    bonus_bps: u64,
    /// Records history
    history: Vec<LiquidationRecord>,
    /// Maximum records to keep
    max_history: usize,
    /// Statistics
    stats: LiquidationStats,
}

impl LiquidationEngine {
    /// Create a new liquidation engine
    pub fn new(admin: AccountId, bonus_bps: u64) -> Result<Self> {
        validate_bps("liquidation_bonus_bps", bonus_bps, MAX_LIQUIDATION_BONUS_BPS)?;
        Ok(Self {
            account: AccountId::from_label(LIQUIDATION_ENGINE_LABEL),
            access: AccessControl::new(admin),
            bonus_bps,
            history: Vec::new(),
            max_history: MAX_LIQUIDATION_HISTORY,
            stats: LiquidationStats::default(),
        })
    }

    /// Engine identity
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Current bonus in basis points
    pub fn bonus_bps(&self) -> u64 {
        self.bonus_bps
    }

    /// Change the liquidation bonus
    pub fn set_liquidation_bonus(&mut self, caller: &AccountId, bonus_bps: u64) -> Result<()> {
        self.access.ensure_admin(caller, "set_liquidation_bonus")?;
        validate_bps("liquidation_bonus_bps", bonus_bps, MAX_LIQUIDATION_BONUS_BPS)?;
        self.bonus_bps = bonus_bps;
        info!(bonus_bps, "liquidation bonus set");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION DETECTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Find all liquidatable positions, most at risk first.
    ///
    /// Positions whose asset has no price in `prices` are skipped.
    pub fn find_liquidatable(&self, lending: &LendingEngine, prices: &PriceSnapshot) -> Vec<(PositionId, Wad)> {
        let health = match lending.health_engine(prices) {
            Ok(health) => health,
            Err(e) => {
                debug!("cannot scan for liquidations: {}", e);
                return Vec::new();
            }
        };

        let mut candidates: Vec<(PositionId, Wad)> = lending
            .positions()
            .open_positions()
            .filter(|p| p.has_debt() && prices.contains(&p.asset))
            .filter_map(|p| match health.health_factor(p) {
                Ok(hf) if !health.is_healthy(hf) => Some((p.id, hf)),
                Ok(_) => None,
                Err(e) => {
                    debug!(position = %p.id, "skipping position: {}", e);
                    None
                }
            })
            .collect();

        // Lowest health factor = highest priority
        candidates.sort_by_key(|(id, hf)| (*hf, *id));
        candidates
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate a position below the health threshold
    pub fn liquidate(
        &mut self,
        lending: &mut LendingEngine,
        ctx: &mut OperationContext<'_>,
        liquidator: AccountId,
        id: PositionId,
        repay_amount: u128,
    ) -> Result<LiquidationRecord> {
        lending.wiring().ensure_configured()?;
        validate_non_zero(repay_amount)?;

        let position = lending.position(id)?;
        position.ensure_active()?;

        let prices = ctx.prices([&position.asset])?;
        let health = lending.health_engine(&prices)?;
        let hf = health.health_factor(position)?;
        if health.is_healthy(hf) {
            return Err(Error::LoanIsHealthy {
                position_id: id.0,
                health_factor: hf.raw(),
            });
        }

        let owner = position.owner;
        let asset = position.asset.clone();
        let repaid = repay_amount.min(position.debt);
        let price = prices.price(&asset)?;
        let seized = calculate_seizure(
            repaid,
            lending.debt_unit()?,
            price,
            lending.registry().unit(&asset)?,
            self.bonus_bps,
            position.collateral,
        )?;

        let custody = lending.custody();
        let debt_asset = lending.params().debt_asset.clone();
        ctx.settlement().transfer_in(&debt_asset, &liquidator, &custody, repaid)?;
        ctx.settlement().transfer_out(&asset, &custody, &liquidator, seized)?;

        let settled = lending.apply_liquidation(ctx, &self.account, id, repaid, seized)?;

        let record = LiquidationRecord {
            position_id: id,
            owner,
            liquidator,
            asset: asset.clone(),
            debt_repaid: repaid,
            collateral_seized: seized,
            written_off: settled.written_off,
            remaining_debt: settled.remaining_debt,
            remaining_collateral: settled.remaining_collateral,
            health_factor: hf,
            price,
            block_height: ctx.block_height(),
        };

        // Update stats
        self.stats.count += 1;
        self.stats.total_debt_repaid = self.stats.total_debt_repaid.saturating_add(repaid);
        self.stats.total_written_off = self.stats.total_written_off.saturating_add(settled.written_off);
        let total_seized = self.stats.collateral_seized.entry(asset.clone()).or_insert(0);
        *total_seized = total_seized.saturating_add(seized);

        info!(
            position = %id,
            liquidator = %liquidator.short(),
            repaid,
            seized,
            %hf,
            "position liquidated"
        );
        ctx.emit(ProtocolEvent::Liquidated(LiquidatedEvent {
            position_id: id,
            owner,
            liquidator,
            asset,
            debt_repaid: repaid,
            collateral_seized: seized,
            remaining_debt: settled.remaining_debt,
            remaining_collateral: settled.remaining_collateral,
            health_factor: hf,
            price,
            block_height: ctx.block_height(),
            timestamp: ctx.timestamp(),
        }));

        self.add_record(record.clone());
        Ok(record)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HISTORY
    // ═══════════════════════════════════════════════════════════════════════════

    fn add_record(&mut self, record: LiquidationRecord) {
        self.history.push(record);
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }
    }

    /// Recent liquidations, oldest first
    pub fn history(&self) -> &[LiquidationRecord] {
        &self.history
    }

    /// Liquidation statistics
    pub fn stats(&self) -> &LiquidationStats {
        &self.stats
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INCENTIVE CALCULATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral (raw units) paid for repaying `repaid` raw units of debt,
/// capped at the position's `collateral`
pub fn calculate_seizure(
    repaid: u128,
    debt_unit: u128,
    price: Wad,
    collateral_unit: u128,
    bonus_bps: u64,
    collateral: u128,
) -> Result<u128> {
    if price.is_zero() {
        return Err(Error::InvalidPrice {
            asset: "collateral".into(),
            reason: "zero price".into(),
        });
    }
    let repaid_value = mul_div_floor(repaid, WAD, debt_unit)?;
    let seize_value = mul_div_floor(repaid_value, BPS_DIVISOR + bonus_bps as u128, BPS_DIVISOR)?;
    let seize_amount = mul_div_floor(seize_value, collateral_unit, price.raw())?;
    Ok(seize_amount.min(collateral))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
