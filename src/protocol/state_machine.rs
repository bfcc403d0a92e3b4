//! Protocol State Machine - Core orchestration engine.
//!
//! The state machine owns every engine plus the two external collaborators
//! (price oracle and asset ledger). Each public operation runs as one
//! transaction: a fresh [`OperationContext`] journals its transfers and
//! stages its events; on success both are kept, on failure every transfer
//! is reversed and the events are dropped.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::access::EngineWiring;
use crate::core::asset::AssetId;
use crate::core::config::ProtocolParams;
use crate::core::position::{Position, PositionId};
use crate::error::{Error, Result};
use crate::ledger::asset_ledger::AssetLedger;
use crate::lending::{HarvestRecord, LendingEngine, YieldRouter, YieldVaults};
use crate::liquidation::{LiquidationEngine, LiquidationRecord};
use crate::oracle::price_feed::{PriceOracle, PriceSnapshot};
use crate::protocol::context::OperationContext;
use crate::protocol::events::*;
use crate::protocol::operations::*;
use crate::revenue::{FeeSplit, RevenueSplitter};
use crate::risk::HealthReport;
use crate::utils::crypto::{AccountId, Hash};
use crate::utils::math::Wad;

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINES
// ═══════════════════════════════════════════════════════════════════════════════

/// Every engine the state machine drives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engines {
    /// Positions, registry and boost
    pub lending: LendingEngine,
    /// Yield relay
    pub router: YieldRouter,
    /// Collateral yield sources
    pub vaults: YieldVaults,
    /// Liquidations
    pub liquidation: LiquidationEngine,
    /// Fee revenue
    pub splitter: RevenueSplitter,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE MACHINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol state machine - orchestrates all operations
pub struct ProtocolStateMachine<O: PriceOracle, L: AssetLedger> {
    /// Protocol administrator
    admin: AccountId,
    /// Engine state
    engines: Engines,
    /// Price source
    oracle: O,
    /// Balance ledger
    ledger: L,
    /// Current block height
    block_height: u64,
    /// Current timestamp
    timestamp: u64,
    /// Events of the current block
    event_log: EventLog,
    /// Events emitted since construction
    event_count: u64,
}

impl<O: PriceOracle, L: AssetLedger> ProtocolStateMachine<O, L> {
    /// Create an unconfigured state machine
    pub fn new(admin: AccountId, params: ProtocolParams, oracle: O, ledger: L) -> Result<Self> {
        params.validate()?;
        let engines = Engines {
            router: YieldRouter::new(admin),
            vaults: YieldVaults::new(admin),
            liquidation: LiquidationEngine::new(admin, params.liquidation_bonus_bps)?,
            splitter: RevenueSplitter::new(admin, params.disbursement_bps)?,
            lending: LendingEngine::new(admin, params)?,
        };

        Ok(Self {
            admin,
            engines,
            oracle,
            ledger,
            block_height: 0,
            timestamp: 0,
            event_log: EventLog::new(),
            event_count: 0,
        })
    }

    /// Wire the router and liquidation engine into the lending engine
    pub fn configure(&mut self, caller: &AccountId) -> Result<()> {
        let wiring = EngineWiring {
            yield_router: self.engines.router.account(),
            liquidation_engine: self.engines.liquidation.account(),
        };
        self.engines.lending.configure(caller, wiring)?;
        self.record(ProtocolEvent::Configured(ConfiguredEvent {
            yield_router: wiring.yield_router,
            liquidation_engine: wiring.liquidation_engine,
            block_height: self.block_height,
            timestamp: self.timestamp,
        }));
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BLOCK PROCESSING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Begin a new block
    pub fn begin_block(&mut self, height: u64, timestamp: u64) -> Result<()> {
        if height < self.block_height || timestamp < self.timestamp {
            return Err(Error::InvalidParameter {
                name: "block".into(),
                reason: format!(
                    "clock cannot move backwards ({}@{} -> {}@{})",
                    self.block_height, self.timestamp, height, timestamp
                ),
            });
        }
        self.block_height = height;
        self.timestamp = timestamp;
        self.event_log.clear();
        debug!(height, timestamp, "block started");
        Ok(())
    }

    /// End the current block, returning its events
    pub fn end_block(&mut self) -> EventLog {
        let events = std::mem::take(&mut self.event_log);
        debug!(height = self.block_height, events = events.len(), "block ended");
        events
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ADMIN
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register an asset's decimal scale
    pub fn register_asset(&mut self, caller: &AccountId, asset: AssetId, decimals: u8) -> Result<()> {
        self.engines.lending.register_asset(caller, asset.clone(), decimals)?;
        self.parameter_changed(format!("asset.{}.decimals", asset), decimals.to_string());
        Ok(())
    }

    /// Accept an asset as collateral, or change its base factor
    pub fn set_collateral_factor(&mut self, caller: &AccountId, asset: &AssetId, factor: Wad) -> Result<()> {
        self.engines.lending.set_collateral_factor(caller, asset, factor)?;
        self.parameter_changed(format!("asset.{}.base_factor", asset), factor.to_string());
        Ok(())
    }

    /// Stop accepting an asset as collateral
    pub fn remove_collateral(&mut self, caller: &AccountId, asset: &AssetId) -> Result<()> {
        self.engines.lending.remove_collateral(caller, asset)?;
        self.parameter_changed(format!("asset.{}.base_factor", asset), "removed".into());
        Ok(())
    }

    /// Change the solvency threshold
    pub fn set_health_threshold(&mut self, caller: &AccountId, threshold: Wad) -> Result<()> {
        self.engines.lending.set_health_threshold(caller, threshold)?;
        self.parameter_changed("health_threshold".into(), threshold.to_string());
        Ok(())
    }

    /// Change the liquidation bonus
    pub fn set_liquidation_bonus(&mut self, caller: &AccountId, bonus_bps: u64) -> Result<()> {
        self.engines.liquidation.set_liquidation_bonus(caller, bonus_bps)?;
        self.parameter_changed("liquidation_bonus_bps".into(), bonus_bps.to_string());
        Ok(())
    }

    /// Grant or revoke yield relay rights
    pub fn set_keeper(&mut self, caller: &AccountId, keeper: AccountId, allowed: bool) -> Result<()> {
        if self.engines.router.set_keeper(caller, keeper, allowed)? {
            self.parameter_changed(format!("keeper.{}", keeper.to_hex()), allowed.to_string());
        }
        Ok(())
    }

    /// Add or remove a disbursement recipient
    pub fn set_recipient(&mut self, caller: &AccountId, recipient: AccountId, allowed: bool) -> Result<()> {
        if self.engines.splitter.set_recipient(caller, recipient, allowed)? {
            self.parameter_changed(format!("recipient.{}", recipient.to_hex()), allowed.to_string());
        }
        Ok(())
    }

    /// Point a collateral asset at the vault account its yield accrues in,
    /// or clear it with `None`
    pub fn set_yield_vault(&mut self, caller: &AccountId, asset: AssetId, vault: Option<AccountId>) -> Result<()> {
        if vault.is_some() {
            self.engines.lending.registry().collateral_config(&asset)?;
        }
        if self.engines.vaults.set_vault(caller, asset.clone(), vault)? {
            let value = vault.map(|v| v.to_hex()).unwrap_or_else(|| "none".into());
            self.parameter_changed(format!("yield_vault.{}", asset), value);
        }
        Ok(())
    }

    /// Open a staker reward pool for `asset`
    pub fn add_reward_asset(&mut self, caller: &AccountId, asset: AssetId) -> Result<()> {
        if self.engines.splitter.add_reward_asset(caller, asset.clone())? {
            self.parameter_changed(format!("reward_asset.{}", asset), "true".into());
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OPERATION EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Execute a protocol operation
    pub fn execute(&mut self, op: Operation) -> Result<OperationOutcome> {
        let operation = op.operation_type();
        debug!(operation, caller = %op.caller().short(), "executing operation");

        match op {
            Operation::DepositCollateral { owner, asset, amount } => self
                .deposit_collateral(owner, asset, amount)
                .map(|position_id| OperationOutcome::Deposited { position_id }),
            Operation::Borrow {
                owner,
                position_id,
                amount,
            } => self
                .borrow(owner, position_id, amount)
                .map(|health_factor| OperationOutcome::Borrowed { health_factor }),
            Operation::Repay {
                payer,
                position_id,
                amount,
            } => self
                .repay(payer, position_id, amount)
                .map(|applied| OperationOutcome::Repaid { applied }),
            Operation::WithdrawCollateral {
                owner,
                position_id,
                amount,
            } => self
                .withdraw_collateral(owner, position_id, amount)
                .map(|remaining| OperationOutcome::Withdrawn { remaining }),
            Operation::Stake { account, amount } => self
                .stake(account, amount)
                .map(|stake| OperationOutcome::Staked { stake }),
            Operation::Unstake { account, amount } => self
                .unstake(account, amount)
                .map(|stake| OperationOutcome::Unstaked { stake }),
            Operation::Liquidate {
                liquidator,
                position_id,
                repay_amount,
            } => self
                .liquidate(liquidator, position_id, repay_amount)
                .map(OperationOutcome::Liquidated),
            Operation::RouteYield {
                keeper,
                position_id,
                amount,
            } => self
                .route_yield_to_repayment(keeper, position_id, amount)
                .map(|applied| OperationOutcome::YieldApplied { applied }),
            Operation::HarvestAndApply { keeper, position_id } => self
                .harvest_and_apply(keeper, position_id)
                .map(OperationOutcome::Harvested),
            Operation::CollectFees { payer, asset, amount } => self
                .collect_fees(payer, asset, amount)
                .map(OperationOutcome::FeesCollected),
            Operation::ClaimReward { account, asset } => self
                .claim_reward(account, asset)
                .map(|amount| OperationOutcome::RewardClaimed { amount }),
            Operation::Disburse {
                caller,
                asset,
                recipient,
                amount,
            } => self
                .disburse(caller, asset, recipient, amount)
                .map(|_| OperationOutcome::Disbursed),
        }
    }

    /// Deposit collateral; returns the credited position
    pub fn deposit_collateral(&mut self, owner: AccountId, asset: AssetId, amount: u128) -> Result<PositionId> {
        self.transact("deposit_collateral", |eng, ctx| {
            eng.lending.deposit_collateral(ctx, owner, asset, amount)
        })
    }

    /// Draw debt; returns the resulting health factor
    pub fn borrow(&mut self, owner: AccountId, id: PositionId, amount: u128) -> Result<Wad> {
        self.transact("borrow", |eng, ctx| eng.lending.borrow(ctx, owner, id, amount))
    }

    /// Repay debt; returns the amount applied
    pub fn repay(&mut self, payer: AccountId, id: PositionId, amount: u128) -> Result<u128> {
        self.transact("repay", |eng, ctx| eng.lending.repay(ctx, payer, id, amount))
    }

    /// Withdraw collateral; returns the collateral left
    pub fn withdraw_collateral(&mut self, owner: AccountId, id: PositionId, amount: u128) -> Result<u128> {
        self.transact("withdraw_collateral", |eng, ctx| {
            eng.lending.withdraw_collateral(ctx, owner, id, amount)
        })
    }

    /// Stake boost tokens; returns the new stake
    pub fn stake(&mut self, account: AccountId, amount: u128) -> Result<u128> {
        self.transact("stake", |eng, ctx| {
            let stake_before = eng.lending.boost().stake_of(&account);
            let pending = eng.splitter.prepare_checkpoint(account, stake_before)?;
            let stake = eng.lending.stake(ctx, account, amount)?;
            eng.splitter.apply_checkpoint(pending);
            Ok(stake)
        })
    }

    /// Unstake boost tokens; returns the new stake
    pub fn unstake(&mut self, account: AccountId, amount: u128) -> Result<u128> {
        self.transact("unstake", |eng, ctx| {
            let stake_before = eng.lending.boost().stake_of(&account);
            let pending = eng.splitter.prepare_checkpoint(account, stake_before)?;
            let stake = eng.lending.unstake(ctx, account, amount)?;
            eng.splitter.apply_checkpoint(pending);
            Ok(stake)
        })
    }

    /// Liquidate an unhealthy position
    pub fn liquidate(&mut self, liquidator: AccountId, id: PositionId, repay_amount: u128) -> Result<LiquidationRecord> {
        self.transact("liquidate", |eng, ctx| {
            eng.liquidation
                .liquidate(&mut eng.lending, ctx, liquidator, id, repay_amount)
        })
    }

    /// Apply harvested yield held by the router; returns the amount applied
    pub fn route_yield_to_repayment(&mut self, keeper: AccountId, id: PositionId, amount: u128) -> Result<u128> {
        self.transact("route_yield_to_repayment", |eng, ctx| {
            eng.router
                .route_yield_to_repayment(&mut eng.lending, ctx, keeper, id, amount)
        })
    }

    /// Claim collateral yield for a position and apply it to the debt
    pub fn harvest_and_apply(&mut self, keeper: AccountId, id: PositionId) -> Result<HarvestRecord> {
        self.transact("harvest_and_apply", |eng, ctx| {
            eng.router
                .harvest_and_apply(&eng.vaults, &mut eng.lending, ctx, keeper, id)
        })
    }

    /// Collect and split fees
    pub fn collect_fees(&mut self, payer: AccountId, asset: AssetId, amount: u128) -> Result<FeeSplit> {
        self.transact("collect_fees", |eng, ctx| {
            let total_stake = eng.lending.boost().total_staked();
            eng.splitter.collect_fees(ctx, payer, asset, amount, total_stake)
        })
    }

    /// Claim staker rewards; returns the amount paid
    pub fn claim_reward(&mut self, account: AccountId, asset: AssetId) -> Result<u128> {
        self.transact("claim_reward", |eng, ctx| {
            let stake = eng.lending.boost().stake_of(&account);
            eng.splitter.claim_reward(ctx, account, asset, stake)
        })
    }

    /// Pay from the disbursement pool
    pub fn disburse(&mut self, caller: AccountId, asset: AssetId, recipient: AccountId, amount: u128) -> Result<()> {
        self.transact("disburse", |eng, ctx| {
            eng.splitter.disburse(ctx, &caller, asset, recipient, amount)
        })
    }

    fn transact<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Engines, &mut OperationContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let max_age = self.engines.lending.params().max_price_age_secs;
        let mut ctx = OperationContext::new(
            &self.oracle,
            &mut self.ledger,
            self.block_height,
            self.timestamp,
            max_age,
        );

        match f(&mut self.engines, &mut ctx) {
            Ok(value) => {
                let (movements, events) = ctx.commit();
                debug!(operation, transfers = movements.len(), events = events.len(), "operation committed");
                for event in events {
                    self.record(event);
                }
                Ok(value)
            }
            Err(e) => {
                ctx.rollback()?;
                warn!(operation, code = e.code(), "operation failed: {}", e);
                Err(e)
            }
        }
    }

    fn record(&mut self, event: ProtocolEvent) {
        self.event_log.push(event);
        self.event_count += 1;
    }

    fn parameter_changed(&mut self, parameter: String, value: String) {
        info!(%parameter, %value, "parameter changed");
        self.record(ProtocolEvent::ParameterChanged(ParameterChangedEvent {
            parameter,
            value,
            block_height: self.block_height,
            timestamp: self.timestamp,
        }));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Fresh prices for `assets`, or the first staleness/feed error
    pub fn price_snapshot<'a, I>(&self, assets: I) -> Result<PriceSnapshot>
    where
        I: IntoIterator<Item = &'a AssetId>,
    {
        PriceSnapshot::capture(
            &self.oracle,
            assets,
            self.timestamp,
            self.engines.lending.params().max_price_age_secs,
        )
    }

    /// Solvency report for a position at current prices
    pub fn position_report(&self, id: PositionId) -> Result<HealthReport> {
        let position = self.engines.lending.position(id)?;
        let prices = self.price_snapshot([&position.asset])?;
        self.engines.lending.position_report(&prices, id)
    }

    /// Health factor of a position at current prices
    pub fn health_factor(&self, id: PositionId) -> Result<Wad> {
        self.position_report(id).map(|r| r.health_factor)
    }

    /// Additional debt a position can draw at current prices
    pub fn max_borrow(&self, id: PositionId) -> Result<u128> {
        let position = self.engines.lending.position(id)?;
        let prices = self.price_snapshot([&position.asset])?;
        self.engines.lending.health_engine(&prices)?.max_borrow(position)
    }

    /// Open positions below the threshold, most at risk first
    pub fn find_liquidatable(&self) -> Vec<(PositionId, Wad)> {
        let lending = &self.engines.lending;
        let assets: Vec<&AssetId> = lending.registry().collateral_assets().map(|c| &c.asset).collect();
        let prices = PriceSnapshot::capture_available(
            &self.oracle,
            assets,
            self.timestamp,
            lending.params().max_price_age_secs,
        );
        self.engines.liquidation.find_liquidatable(lending, &prices)
    }

    /// Claimable rewards of `account` in `asset`
    pub fn calculate_reward(&self, account: &AccountId, asset: &AssetId) -> Result<u128> {
        let stake = self.engines.lending.boost().stake_of(account);
        self.engines.splitter.calculate_reward(account, asset, stake)
    }

    /// Get a position by id
    pub fn position(&self, id: PositionId) -> Result<&Position> {
        self.engines.lending.position(id)
    }

    /// Hash of all engine state
    pub fn state_hash(&self) -> Result<Hash> {
        let bytes = bincode::serialize(&self.engines).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Hash::sha256(&bytes))
    }

    /// Administrator
    pub fn admin(&self) -> AccountId {
        self.admin
    }

    /// Engine state
    pub fn engines(&self) -> &Engines {
        &self.engines
    }

    /// Lending engine
    pub fn lending(&self) -> &LendingEngine {
        &self.engines.lending
    }

    /// Yield router
    pub fn router(&self) -> &YieldRouter {
        &self.engines.router
    }

    /// Collateral yield sources
    pub fn yield_vaults(&self) -> &YieldVaults {
        &self.engines.vaults
    }

    /// Liquidation engine
    pub fn liquidation(&self) -> &LiquidationEngine {
        &self.engines.liquidation
    }

    /// Revenue splitter
    pub fn splitter(&self) -> &RevenueSplitter {
        &self.engines.splitter
    }

    /// Price oracle
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Mutable price oracle
    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    /// Asset ledger
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Mutable asset ledger
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Events of the current block
    pub fn events(&self) -> &EventLog {
        &self.event_log
    }

    /// Events emitted since construction
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Current block height
    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    /// Current timestamp
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::oracle::PriceFeedRegistry;
    use crate::utils::constants::WAD;

    const BTC: u128 = 100_000_000;

    fn admin() -> AccountId {
        AccountId::from_label("admin")
    }

    fn alice() -> AccountId {
        AccountId::from_label("alice")
    }

    fn wbtc() -> AssetId {
        AssetId::new("wBTC").unwrap()
    }

    fn busd() -> AssetId {
        AssetId::new("bUSD").unwrap()
    }

    fn protocol() -> ProtocolStateMachine<PriceFeedRegistry, InMemoryLedger> {
        let mut p = ProtocolStateMachine::new(
            admin(),
            ProtocolParams::default(),
            PriceFeedRegistry::new(),
            InMemoryLedger::new(),
        )
        .unwrap();
        p.register_asset(&admin(), busd(), 18).unwrap();
        p.register_asset(&admin(), wbtc(), 8).unwrap();
        p.set_collateral_factor(&admin(), &wbtc(), Wad::from_bps(7_500)).unwrap();
        p.configure(&admin()).unwrap();
        p.begin_block(1, 1_000).unwrap();

        p.oracle_mut()
            .set_price(wbtc(), Wad::from_integer(60_000).unwrap(), 1_000)
            .unwrap();
        let custody = p.lending().custody();
        p.ledger_mut().mint(&wbtc(), &alice(), BTC).unwrap();
        p.ledger_mut().mint(&busd(), &custody, 1_000_000 * WAD).unwrap();
        p
    }

    #[test]
    fn test_failed_borrow_leaves_no_trace() {
        let mut p = protocol();
        let id = p.deposit_collateral(alice(), wbtc(), BTC).unwrap();
        let ledger_before = p.ledger().clone();
        let state_before = p.state_hash().unwrap();
        let events_before = p.events().len();

        let err = p.borrow(alice(), id, 46_000 * WAD).unwrap_err();
        assert!(matches!(err, Error::InsufficientHealthFactor { .. }));
        assert_eq!(p.ledger(), &ledger_before);
        assert_eq!(p.state_hash().unwrap(), state_before);
        assert_eq!(p.events().len(), events_before);
    }

    #[test]
    fn test_execute_dispatch_and_block_events() {
        let mut p = protocol();
        let outcome = p
            .execute(Operation::DepositCollateral {
                owner: alice(),
                asset: wbtc(),
                amount: BTC,
            })
            .unwrap();
        assert_eq!(outcome, OperationOutcome::Deposited { position_id: PositionId(1) });

        let log = p.end_block();
        assert_eq!(log.filter_by_type("PositionOpened").len(), 1);
        assert_eq!(log.filter_by_type("CollateralDeposited").len(), 1);
        assert!(p.events().is_empty());
    }

    #[test]
    fn test_stale_price_blocks_borrow() {
        let mut p = protocol();
        let id = p.deposit_collateral(alice(), wbtc(), BTC).unwrap();
        p.begin_block(2, 1_000 + 3_601).unwrap();

        let err = p.borrow(alice(), id, WAD).unwrap_err();
        assert!(matches!(err, Error::StalePrice { .. }));
        assert!(p.begin_block(1, 0).is_err());
    }

    #[test]
    fn test_operations_require_configure() {
        let mut p = ProtocolStateMachine::new(
            admin(),
            ProtocolParams::default(),
            PriceFeedRegistry::new(),
            InMemoryLedger::new(),
        )
        .unwrap();
        assert_eq!(p.deposit_collateral(alice(), wbtc(), 1), Err(Error::NotConfigured));
        p.register_asset(&admin(), busd(), 18).unwrap();
        p.configure(&admin()).unwrap();
        assert_eq!(p.configure(&admin()), Err(Error::AlreadyConfigured));
    }
}
