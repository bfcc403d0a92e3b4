//! Lending Engine.
//!
//! Owns the collateral registry, the boost ledger and the position ledger,
//! and runs the four position operations (deposit, borrow, repay, withdraw)
//! plus stake/unstake against them. Every operation follows the same order:
//! validate, compute the new values, settle transfers, then commit state and
//! stage events. A failure anywhere before commit leaves engine state
//! untouched; the caller rolls back the settlement.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::boost::BoostLedger;
use crate::core::access::{AccessControl, EngineWiring, Wiring};
use crate::core::asset::AssetId;
use crate::core::config::ProtocolParams;
use crate::core::position::{Position, PositionId, PositionLedger};
use crate::core::registry::CollateralRegistry;
use crate::error::{Error, Result};
use crate::oracle::PriceSnapshot;
use crate::protocol::context::OperationContext;
use crate::protocol::events::*;
use crate::risk::{HealthEngine, HealthReport};
use crate::utils::constants::{BOOST_CUSTODY_LABEL, LENDING_CUSTODY_LABEL};
use crate::utils::crypto::AccountId;
use crate::utils::math::{safe_add, Wad};
use crate::utils::validation::validate_non_zero;

// ═══════════════════════════════════════════════════════════════════════════════
// AGGREGATES
// ═══════════════════════════════════════════════════════════════════════════════

/// Aggregate balances of one collateral asset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTotals {
    /// Collateral held across open positions
    pub collateral: u128,
    /// Debt owed by positions backed by this asset
    pub debt: u128,
}

/// Effect of a liquidation on the position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationSettlement {
    /// Debt left on the position
    pub remaining_debt: u128,
    /// Collateral left on the position
    pub remaining_collateral: u128,
    /// Residual debt written off
    pub written_off: u128,
    /// Whether the position closed
    pub closed: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LENDING ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Position-level lending operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingEngine {
    params: ProtocolParams,
    access: AccessControl,
    wiring: Wiring,
    registry: CollateralRegistry,
    boost: BoostLedger,
    positions: PositionLedger,
    custody: AccountId,
    boost_custody: AccountId,
    totals: BTreeMap<AssetId, AssetTotals>,
    bad_debt: u128,
}

impl LendingEngine {
    /// Create an unconfigured engine
    pub fn new(admin: AccountId, params: ProtocolParams) -> Result<Self> {
        params.validate()?;
        let boost = BoostLedger::new(params.max_boost, params.boost_reference_stake);

        Ok(Self {
            params,
            access: AccessControl::new(admin),
            wiring: Wiring::default(),
            registry: CollateralRegistry::new(),
            boost,
            positions: PositionLedger::new(),
            custody: AccountId::from_label(LENDING_CUSTODY_LABEL),
            boost_custody: AccountId::from_label(BOOST_CUSTODY_LABEL),
            totals: BTreeMap::new(),
            bad_debt: 0,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ADMIN
    // ═══════════════════════════════════════════════════════════════════════════

    /// Wire the privileged engines; admin-only and one-shot.
    ///
    /// The debt asset must be registered first so debt can be valued.
    pub fn configure(&mut self, caller: &AccountId, wiring: EngineWiring) -> Result<()> {
        self.access.ensure_admin(caller, "configure")?;
        if self.wiring.is_configured() {
            return Err(Error::AlreadyConfigured);
        }
        if !self.registry.is_registered(&self.params.debt_asset) {
            return Err(Error::InvalidParameter {
                name: "debt_asset".into(),
                reason: format!("{} must be registered before configure", self.params.debt_asset),
            });
        }
        self.wiring.configure(wiring)?;
        info!(
            yield_router = %wiring.yield_router.short(),
            liquidation_engine = %wiring.liquidation_engine.short(),
            "lending engine configured"
        );
        Ok(())
    }

    /// Register an asset's decimal scale
    pub fn register_asset(&mut self, caller: &AccountId, asset: AssetId, decimals: u8) -> Result<()> {
        self.access.ensure_admin(caller, "register_asset")?;
        debug!(%asset, decimals, "registering asset");
        self.registry.register_asset(asset, decimals)
    }

    /// Accept an asset as collateral, or change its base factor
    pub fn set_collateral_factor(&mut self, caller: &AccountId, asset: &AssetId, factor: Wad) -> Result<()> {
        self.access.ensure_admin(caller, "set_collateral_factor")?;
        self.registry.set_collateral_factor(asset, factor)?;
        info!(%asset, %factor, "collateral factor set");
        Ok(())
    }

    /// Stop accepting an asset as collateral
    pub fn remove_collateral(&mut self, caller: &AccountId, asset: &AssetId) -> Result<()> {
        self.access.ensure_admin(caller, "remove_collateral")?;
        self.registry.remove_collateral(asset)?;
        warn!(%asset, "collateral support removed");
        Ok(())
    }

    /// Change the solvency threshold
    pub fn set_health_threshold(&mut self, caller: &AccountId, threshold: Wad) -> Result<()> {
        self.access.ensure_admin(caller, "set_health_threshold")?;
        if threshold.is_zero() {
            return Err(Error::InvalidParameter {
                name: "health_threshold".into(),
                reason: "must be positive".into(),
            });
        }
        self.params.health_threshold = threshold;
        info!(%threshold, "health threshold set");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // POSITION OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit collateral into the owner's open position for `asset`,
    /// opening one if none exists
    pub fn deposit_collateral(
        &mut self,
        ctx: &mut OperationContext<'_>,
        owner: AccountId,
        asset: AssetId,
        amount: u128,
    ) -> Result<PositionId> {
        self.wiring.ensure_configured()?;
        validate_non_zero(amount)?;
        self.registry.collateral_config(&asset)?;

        let existing = self.positions.find_open(&owner, &asset);
        let current = match existing {
            Some(id) => self.positions.get(id)?.collateral,
            None => 0,
        };
        let new_collateral = safe_add(current, amount)?;
        let new_total = safe_add(self.totals_of(&asset).collateral, amount)?;

        ctx.settlement().transfer_in(&asset, &owner, &self.custody, amount)?;

        let block_height = ctx.block_height();
        let id = match existing {
            Some(id) => id,
            None => {
                let id = self.positions.open(owner, asset.clone(), block_height)?;
                info!(position = %id, owner = %owner.short(), %asset, "position opened");
                ctx.emit(ProtocolEvent::PositionOpened(PositionOpenedEvent {
                    position_id: id,
                    owner,
                    asset: asset.clone(),
                    block_height,
                    timestamp: ctx.timestamp(),
                }));
                id
            }
        };

        let position = self.positions.get_mut(id)?;
        position.collateral = new_collateral;
        position.last_updated = block_height;
        self.totals.entry(asset.clone()).or_default().collateral = new_total;

        debug!(position = %id, amount, new_collateral, "collateral deposited");
        ctx.emit(ProtocolEvent::CollateralDeposited(CollateralDepositedEvent {
            position_id: id,
            depositor: owner,
            asset,
            amount,
            new_collateral,
            block_height,
            timestamp: ctx.timestamp(),
        }));
        Ok(id)
    }

    /// Draw debt against a position; returns the resulting health factor
    pub fn borrow(
        &mut self,
        ctx: &mut OperationContext<'_>,
        owner: AccountId,
        id: PositionId,
        amount: u128,
    ) -> Result<Wad> {
        self.wiring.ensure_configured()?;
        validate_non_zero(amount)?;

        let position = self.positions.get(id)?;
        position.verify_owner(&owner)?;
        position.ensure_active()?;

        let new_debt = safe_add(position.debt, amount)?;
        let prices = ctx.prices([&position.asset])?;
        let hf = self
            .health_engine(&prices)?
            .health_factor_after(position, position.collateral, new_debt)?;

        let threshold = self.params.health_threshold;
        if hf < threshold {
            debug!(position = %id, %hf, "borrow rejected");
            return Err(Error::InsufficientHealthFactor {
                health_factor: hf.raw(),
                threshold: threshold.raw(),
            });
        }

        let asset = position.asset.clone();
        let new_total = safe_add(self.totals_of(&asset).debt, amount)?;
        ctx.settlement()
            .transfer_out(&self.params.debt_asset, &self.custody, &owner, amount)?;

        let block_height = ctx.block_height();
        let position = self.positions.get_mut(id)?;
        position.debt = new_debt;
        position.last_updated = block_height;
        self.totals.entry(asset).or_default().debt = new_total;

        info!(position = %id, amount, new_debt, %hf, "borrowed");
        ctx.emit(ProtocolEvent::Borrowed(BorrowedEvent {
            position_id: id,
            owner,
            amount,
            new_debt,
            health_factor: hf,
            block_height,
            timestamp: ctx.timestamp(),
        }));
        Ok(hf)
    }

    /// Repay debt on any position from `payer`; returns the amount applied
    pub fn repay(
        &mut self,
        ctx: &mut OperationContext<'_>,
        payer: AccountId,
        id: PositionId,
        amount: u128,
    ) -> Result<u128> {
        self.wiring.ensure_configured()?;
        validate_non_zero(amount)?;

        let position = self.positions.get(id)?;
        position.ensure_active()?;
        let applied = amount.min(position.debt);
        if applied == 0 {
            debug!(position = %id, "repay with no outstanding debt");
            return Ok(0);
        }

        ctx.settlement()
            .transfer_in(&self.params.debt_asset, &payer, &self.custody, applied)?;

        let new_debt = self.reduce_debt(id, applied, ctx.block_height())?;
        info!(position = %id, applied, new_debt, "repaid");
        ctx.emit(ProtocolEvent::Repaid(RepaidEvent {
            position_id: id,
            payer,
            amount: applied,
            new_debt,
            block_height: ctx.block_height(),
            timestamp: ctx.timestamp(),
        }));
        self.close_if_empty(ctx, id)?;
        Ok(applied)
    }

    /// Withdraw collateral; returns the collateral left on the position
    pub fn withdraw_collateral(
        &mut self,
        ctx: &mut OperationContext<'_>,
        owner: AccountId,
        id: PositionId,
        amount: u128,
    ) -> Result<u128> {
        self.wiring.ensure_configured()?;
        validate_non_zero(amount)?;

        let position = self.positions.get(id)?;
        position.verify_owner(&owner)?;
        position.ensure_active()?;
        if amount > position.collateral {
            return Err(Error::InsufficientCollateral {
                required: amount,
                available: position.collateral,
            });
        }

        let new_collateral = position.collateral - amount;
        let mut health_factor = Wad::MAX;
        if position.has_debt() {
            let prices = ctx.prices([&position.asset])?;
            let hf = self
                .health_engine(&prices)?
                .health_factor_after(position, new_collateral, position.debt)?;
            let threshold = self.params.health_threshold;
            if hf < threshold {
                debug!(position = %id, %hf, "withdrawal rejected");
                return Err(Error::WithdrawalViolatesHealthFactor {
                    health_factor: hf.raw(),
                    threshold: threshold.raw(),
                });
            }
            health_factor = hf;
        }

        let asset = position.asset.clone();
        ctx.settlement().transfer_out(&asset, &self.custody, &owner, amount)?;

        let block_height = ctx.block_height();
        let position = self.positions.get_mut(id)?;
        position.collateral = new_collateral;
        position.last_updated = block_height;
        let totals = self.totals.entry(asset.clone()).or_default();
        totals.collateral = totals.collateral.saturating_sub(amount);

        info!(position = %id, amount, new_collateral, %health_factor, "collateral withdrawn");
        ctx.emit(ProtocolEvent::CollateralWithdrawn(CollateralWithdrawnEvent {
            position_id: id,
            owner,
            asset,
            amount,
            new_collateral,
            block_height,
            timestamp: ctx.timestamp(),
        }));
        self.close_if_empty(ctx, id)?;
        Ok(new_collateral)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BOOST OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Stake boost tokens; returns the new stake
    pub fn stake(&mut self, ctx: &mut OperationContext<'_>, account: AccountId, amount: u128) -> Result<u128> {
        self.wiring.ensure_configured()?;
        validate_non_zero(amount)?;

        ctx.settlement()
            .transfer_in(&self.params.boost_asset, &account, &self.boost_custody, amount)?;
        let new_stake = self.boost.stake(account, amount)?;
        let new_bonus = self.boost.bonus_of(&account)?;

        info!(account = %account.short(), amount, new_stake, %new_bonus, "staked");
        ctx.emit(ProtocolEvent::Staked(StakeChangedEvent {
            account,
            amount,
            new_stake,
            new_bonus,
            block_height: ctx.block_height(),
            timestamp: ctx.timestamp(),
        }));
        Ok(new_stake)
    }

    /// Unstake boost tokens if every indebted open position of the account
    /// stays healthy under the reduced bonus; returns the remaining stake
    pub fn unstake(&mut self, ctx: &mut OperationContext<'_>, account: AccountId, amount: u128) -> Result<u128> {
        self.wiring.ensure_configured()?;

        let remaining = self.boost.stake_after_unstake(&account, amount)?;
        let new_bonus = self.boost.bonus_for_stake(remaining)?;

        let indebted: Vec<&Position> = self
            .positions
            .open_positions_of(&account)
            .into_iter()
            .filter(|p| p.has_debt())
            .collect();
        if !indebted.is_empty() {
            let prices = ctx.prices(indebted.iter().map(|p| &p.asset))?;
            let health = self.health_engine(&prices)?;
            for position in &indebted {
                let hf = health.health_factor_with(&position.asset, position.collateral, position.debt, new_bonus)?;
                if !health.is_healthy(hf) {
                    debug!(position = %position.id, %hf, "unstake rejected");
                    return Err(Error::UnstakeViolatesHealthFactor {
                        position_id: position.id.0,
                        health_factor: hf.raw(),
                    });
                }
            }
        }

        ctx.settlement()
            .transfer_out(&self.params.boost_asset, &self.boost_custody, &account, amount)?;
        let new_stake = self.boost.unstake(account, amount)?;

        info!(account = %account.short(), amount, new_stake, %new_bonus, "unstaked");
        ctx.emit(ProtocolEvent::Unstaked(StakeChangedEvent {
            account,
            amount,
            new_stake,
            new_bonus,
            block_height: ctx.block_height(),
            timestamp: ctx.timestamp(),
        }));
        Ok(new_stake)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRIVILEGED HOOKS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Reduce debt with yield held by the wired router; returns the amount applied
    pub fn apply_yield(
        &mut self,
        ctx: &mut OperationContext<'_>,
        caller: &AccountId,
        keeper: AccountId,
        id: PositionId,
        amount: u128,
    ) -> Result<u128> {
        let wiring = self.wiring.ensure_configured()?;
        if *caller != wiring.yield_router {
            return Err(Error::NotAuthorized("apply_yield is reserved for the yield router".into()));
        }
        validate_non_zero(amount)?;

        let position = self.positions.get(id)?;
        position.ensure_active()?;
        let applied = amount.min(position.debt);
        if applied == 0 {
            return Ok(0);
        }

        ctx.settlement()
            .transfer_in(&self.params.debt_asset, caller, &self.custody, applied)?;
        let new_debt = self.reduce_debt(id, applied, ctx.block_height())?;

        info!(position = %id, requested = amount, applied, new_debt, "yield applied");
        ctx.emit(ProtocolEvent::YieldApplied(YieldAppliedEvent {
            position_id: id,
            keeper,
            requested: amount,
            applied,
            new_debt,
            block_height: ctx.block_height(),
            timestamp: ctx.timestamp(),
        }));
        self.close_if_empty(ctx, id)?;
        Ok(applied)
    }

    /// Record a liquidation already settled by the wired liquidation engine.
    ///
    /// If no collateral remains but debt does, the residual is written off
    /// to `bad_debt` and the position closes.
    pub fn apply_liquidation(
        &mut self,
        ctx: &mut OperationContext<'_>,
        caller: &AccountId,
        id: PositionId,
        repaid: u128,
        seized: u128,
    ) -> Result<LiquidationSettlement> {
        let wiring = self.wiring.ensure_configured()?;
        if *caller != wiring.liquidation_engine {
            return Err(Error::NotAuthorized(
                "apply_liquidation is reserved for the liquidation engine".into(),
            ));
        }

        let position = self.positions.get(id)?;
        position.ensure_active()?;
        if repaid > position.debt || seized > position.collateral {
            return Err(Error::InvariantViolation(format!(
                "liquidation of {} exceeds position balances",
                id
            )));
        }

        let owner = position.owner;
        let asset = position.asset.clone();
        let remaining_collateral = position.collateral - seized;
        let mut remaining_debt = position.debt - repaid;
        let written_off = if remaining_collateral == 0 { remaining_debt } else { 0 };
        let total_bad_debt = safe_add(self.bad_debt, written_off)?;

        let block_height = ctx.block_height();
        let position = self.positions.get_mut(id)?;
        position.collateral = remaining_collateral;
        position.debt = remaining_debt - written_off;
        position.last_updated = block_height;

        let totals = self.totals.entry(asset).or_default();
        totals.collateral = totals.collateral.saturating_sub(seized);
        totals.debt = totals.debt.saturating_sub(repaid + written_off);

        if written_off > 0 {
            self.bad_debt = total_bad_debt;
            remaining_debt = 0;
            warn!(position = %id, written_off, total_bad_debt, "residual debt written off");
            ctx.emit(ProtocolEvent::BadDebtWrittenOff(BadDebtWrittenOffEvent {
                position_id: id,
                owner,
                amount: written_off,
                total_bad_debt,
                block_height,
                timestamp: ctx.timestamp(),
            }));
        }

        let closed = self.close_if_empty(ctx, id)?;
        Ok(LiquidationSettlement {
            remaining_debt,
            remaining_collateral,
            written_off,
            closed,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════════════════

    fn totals_of(&self, asset: &AssetId) -> AssetTotals {
        self.totals.get(asset).copied().unwrap_or_default()
    }

    fn reduce_debt(&mut self, id: PositionId, amount: u128, block_height: u64) -> Result<u128> {
        let position = self.positions.get_mut(id)?;
        position.debt = position.debt.saturating_sub(amount);
        position.last_updated = block_height;
        let new_debt = position.debt;

        let totals = self.totals.entry(position.asset.clone()).or_default();
        totals.debt = totals.debt.saturating_sub(amount);
        Ok(new_debt)
    }

    fn close_if_empty(&mut self, ctx: &mut OperationContext<'_>, id: PositionId) -> Result<bool> {
        let position = self.positions.get(id)?;
        if !position.is_empty() {
            return Ok(false);
        }
        let owner = position.owner;
        self.positions.close(id, ctx.block_height())?;

        info!(position = %id, owner = %owner.short(), "position closed");
        ctx.emit(ProtocolEvent::PositionClosed(PositionClosedEvent {
            position_id: id,
            owner,
            block_height: ctx.block_height(),
            timestamp: ctx.timestamp(),
        }));
        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Health engine over the current registry and boost state
    pub fn health_engine<'a>(&'a self, prices: &'a PriceSnapshot) -> Result<HealthEngine<'a>> {
        Ok(HealthEngine::new(
            &self.registry,
            &self.boost,
            prices,
            self.debt_unit()?,
            self.params.effective_factor_cap,
            self.params.health_threshold,
        ))
    }

    /// Solvency report for one position
    pub fn position_report(&self, prices: &PriceSnapshot, id: PositionId) -> Result<HealthReport> {
        let position = self.positions.get(id)?;
        self.health_engine(prices)?.report(position)
    }

    /// Raw units per whole debt token
    pub fn debt_unit(&self) -> Result<u128> {
        self.registry.unit(&self.params.debt_asset)
    }

    /// Protocol parameters
    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// Access control
    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    /// Wiring state
    pub fn wiring(&self) -> Wiring {
        self.wiring
    }

    /// Whether configure has been called
    pub fn is_configured(&self) -> bool {
        self.wiring.is_configured()
    }

    /// Collateral registry
    pub fn registry(&self) -> &CollateralRegistry {
        &self.registry
    }

    /// Boost ledger
    pub fn boost(&self) -> &BoostLedger {
        &self.boost
    }

    /// Position ledger
    pub fn positions(&self) -> &PositionLedger {
        &self.positions
    }

    /// Get a position by id
    pub fn position(&self, id: PositionId) -> Result<&Position> {
        self.positions.get(id)
    }

    /// Account holding all deposited collateral and borrowable liquidity
    pub fn custody(&self) -> AccountId {
        self.custody
    }

    /// Account holding staked boost tokens
    pub fn boost_custody(&self) -> AccountId {
        self.boost_custody
    }

    /// Aggregate balances of a collateral asset
    pub fn totals(&self, asset: &AssetId) -> AssetTotals {
        self.totals_of(asset)
    }

    /// Debt written off by liquidations
    pub fn bad_debt(&self) -> u128 {
        self.bad_debt
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
