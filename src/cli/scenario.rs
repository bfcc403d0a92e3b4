//! Scenario replay.
//!
//! A scenario is a JSON list of steps run against a fresh protocol backed by
//! the in-memory price feeds and ledger. Accounts are named by label and
//! mapped through [`AccountId::from_label`]; amounts are human decimals in
//! the asset's own scale. A failing step is recorded and the replay moves
//! on, since every operation is atomic.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::asset::AssetId;
use crate::core::config::ProtocolParams;
use crate::core::position::{Position, PositionId};
use crate::error::Result;
use crate::ledger::{AssetLedger, InMemoryLedger};
use crate::oracle::PriceFeedRegistry;
use crate::protocol::{Operation, OperationOutcome, ProtocolEvent, ProtocolStateMachine};
use crate::risk::HealthReport;
use crate::utils::crypto::AccountId;
use crate::utils::math::{parse_units, Wad};

/// State machine over the reference collaborators
pub type SimulatedProtocol = ProtocolStateMachine<PriceFeedRegistry, InMemoryLedger>;

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIO FILE
// ═══════════════════════════════════════════════════════════════════════════════

/// A replayable scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Free-form name
    #[serde(default)]
    pub name: String,
    /// Label of the administrator account
    #[serde(default = "default_admin")]
    pub admin: String,
    /// Timestamp of the first block
    #[serde(default)]
    pub start_time: u64,
    /// Seconds per block when `advance_block` gives none
    #[serde(default = "default_block_time")]
    pub block_time: u64,
    /// Steps in order
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Parse a scenario from JSON
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// One scenario step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Register an asset, optionally enabling it as collateral
    RegisterAsset {
        /// Symbol
        asset: String,
        /// Decimal places
        decimals: u8,
        /// Base collateral factor, e.g. "0.45"
        #[serde(default)]
        collateral_factor: Option<String>,
    },
    /// Stop accepting an asset as collateral
    RemoveCollateral {
        /// Symbol
        asset: String,
    },
    /// Publish a price quote
    SetPrice {
        /// Symbol
        asset: String,
        /// Price per whole unit, e.g. "60000"
        price: String,
        /// Quote age in seconds at the current block
        #[serde(default)]
        age: u64,
    },
    /// Create balance out of thin air
    Mint {
        /// Account label
        account: String,
        /// Symbol
        asset: String,
        /// Human amount
        amount: String,
    },
    /// Wire the engines together
    Configure,
    /// Allow or revoke a yield keeper
    SetKeeper {
        /// Account label
        keeper: String,
        /// New status
        #[serde(default = "default_true")]
        allowed: bool,
    },
    /// Point a collateral asset's yield at a vault account, or clear it
    SetYieldVault {
        /// Collateral symbol
        asset: String,
        /// Vault account label; omitted to clear
        #[serde(default)]
        vault: Option<String>,
    },
    /// Allow or revoke a disbursement recipient
    SetRecipient {
        /// Account label
        recipient: String,
        /// New status
        #[serde(default = "default_true")]
        allowed: bool,
    },
    /// Open a staker reward pool
    AddRewardAsset {
        /// Symbol
        asset: String,
    },
    /// Change the minimum health factor
    SetHealthThreshold {
        /// Threshold, e.g. "1.0"
        threshold: String,
    },
    /// Change the liquidation bonus
    SetLiquidationBonus {
        /// Basis points
        bps: u64,
    },
    /// Deposit collateral
    Deposit {
        /// Account label
        account: String,
        /// Symbol
        asset: String,
        /// Human amount
        amount: String,
    },
    /// Draw debt
    Borrow {
        /// Account label
        account: String,
        /// Position id
        position: u64,
        /// Human amount of the debt asset
        amount: String,
    },
    /// Repay debt
    Repay {
        /// Account label
        account: String,
        /// Position id
        position: u64,
        /// Human amount of the debt asset
        amount: String,
    },
    /// Withdraw collateral
    Withdraw {
        /// Account label
        account: String,
        /// Position id
        position: u64,
        /// Human amount of the position's collateral asset
        amount: String,
    },
    /// Stake boost tokens
    Stake {
        /// Account label
        account: String,
        /// Human amount of the boost asset
        amount: String,
    },
    /// Unstake boost tokens
    Unstake {
        /// Account label
        account: String,
        /// Human amount of the boost asset
        amount: String,
    },
    /// Liquidate a position
    Liquidate {
        /// Account label
        liquidator: String,
        /// Position id
        position: u64,
        /// Human amount of debt to repay
        amount: String,
    },
    /// Apply router-held yield to a position
    RouteYield {
        /// Account label
        keeper: String,
        /// Position id
        position: u64,
        /// Human amount of the debt asset
        amount: String,
    },
    /// Claim collateral yield and apply it to a position
    Harvest {
        /// Account label
        keeper: String,
        /// Position id
        position: u64,
    },
    /// Collect and split fees
    CollectFees {
        /// Account label
        payer: String,
        /// Symbol
        asset: String,
        /// Human amount
        amount: String,
    },
    /// Claim staker rewards
    Claim {
        /// Account label
        account: String,
        /// Symbol
        asset: String,
    },
    /// Pay from the disbursement pool as the administrator
    Disburse {
        /// Account label
        recipient: String,
        /// Symbol
        asset: String,
        /// Human amount
        amount: String,
    },
    /// Close the current block and open the next
    AdvanceBlock {
        /// Blocks to skip
        #[serde(default = "default_one")]
        blocks: u64,
        /// Seconds to skip; `blocks * block_time` when absent
        #[serde(default)]
        seconds: Option<u64>,
    },
}

impl Step {
    /// Step name as written in scenario files
    pub fn action(&self) -> &'static str {
        match self {
            Step::RegisterAsset { .. } => "register_asset",
            Step::RemoveCollateral { .. } => "remove_collateral",
            Step::SetPrice { .. } => "set_price",
            Step::Mint { .. } => "mint",
            Step::Configure => "configure",
            Step::SetKeeper { .. } => "set_keeper",
            Step::SetYieldVault { .. } => "set_yield_vault",
            Step::SetRecipient { .. } => "set_recipient",
            Step::AddRewardAsset { .. } => "add_reward_asset",
            Step::SetHealthThreshold { .. } => "set_health_threshold",
            Step::SetLiquidationBonus { .. } => "set_liquidation_bonus",
            Step::Deposit { .. } => "deposit",
            Step::Borrow { .. } => "borrow",
            Step::Repay { .. } => "repay",
            Step::Withdraw { .. } => "withdraw",
            Step::Stake { .. } => "stake",
            Step::Unstake { .. } => "unstake",
            Step::Liquidate { .. } => "liquidate",
            Step::RouteYield { .. } => "route_yield",
            Step::Harvest { .. } => "harvest",
            Step::CollectFees { .. } => "collect_fees",
            Step::Claim { .. } => "claim",
            Step::Disburse { .. } => "disburse",
            Step::AdvanceBlock { .. } => "advance_block",
        }
    }
}

fn default_admin() -> String {
    "admin".into()
}

fn default_block_time() -> u64 {
    12
}

fn default_true() -> bool {
    true
}

fn default_one() -> u64 {
    1
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPORTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    /// Position in the scenario
    pub index: usize,
    /// Step name
    pub action: String,
    /// Whether the step succeeded
    pub ok: bool,
    /// Outcome on success, error message on failure
    pub detail: String,
    /// Error code on failure
    pub error_code: Option<u32>,
}

/// Final view of one position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSummary {
    /// Stored state
    pub position: Position,
    /// Solvency at final prices, when they are fresh
    pub report: Option<HealthReport>,
    /// Why no report could be produced
    pub note: Option<String>,
}

/// Everything a replay produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Scenario name
    pub name: String,
    /// Per-step results
    pub steps: Vec<StepReport>,
    /// Every event emitted, in order
    pub events: Vec<ProtocolEvent>,
    /// All positions ever opened
    pub positions: Vec<PositionSummary>,
    /// Liquidatable positions at the end, most at risk first
    pub liquidatable: Vec<(PositionId, Wad)>,
    /// Debt written off by liquidations
    pub bad_debt: u128,
    /// Final block height
    pub block_height: u64,
    /// Final timestamp
    pub timestamp: u64,
    /// Hex SHA-256 of the engine state
    pub state_hash: String,
}

impl SimulationReport {
    /// Number of failed steps
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUNNER
// ═══════════════════════════════════════════════════════════════════════════════

/// Replays scenario steps one at a time
pub struct ScenarioRunner {
    name: String,
    admin: AccountId,
    block_time: u64,
    machine: SimulatedProtocol,
    events: Vec<ProtocolEvent>,
    steps: Vec<StepReport>,
}

impl ScenarioRunner {
    /// Build a fresh protocol for `scenario` and open its first block
    pub fn new(scenario: &Scenario, params: ProtocolParams) -> Result<Self> {
        let admin = AccountId::from_label(&scenario.admin);
        let mut machine = ProtocolStateMachine::new(admin, params, PriceFeedRegistry::new(), InMemoryLedger::new())?;
        machine.begin_block(1, scenario.start_time)?;

        Ok(Self {
            name: scenario.name.clone(),
            admin,
            block_time: scenario.block_time,
            machine,
            events: Vec::new(),
            steps: Vec::new(),
        })
    }

    /// Replay a whole scenario
    pub fn run(scenario: &Scenario, params: ProtocolParams) -> Result<SimulationReport> {
        let mut runner = Self::new(scenario, params)?;
        for step in &scenario.steps {
            runner.step(step);
        }
        runner.finish()
    }

    /// Run one step and record its result
    pub fn step(&mut self, step: &Step) -> &StepReport {
        let index = self.steps.len();
        let report = match self.apply(step) {
            Ok(detail) => {
                debug!(index, action = step.action(), %detail, "step ok");
                StepReport {
                    index,
                    action: step.action().into(),
                    ok: true,
                    detail,
                    error_code: None,
                }
            }
            Err(e) => {
                info!(index, action = step.action(), code = e.code(), "step failed: {}", e);
                StepReport {
                    index,
                    action: step.action().into(),
                    ok: false,
                    detail: e.to_string(),
                    error_code: Some(e.code()),
                }
            }
        };
        self.steps.push(report);
        &self.steps[index]
    }

    /// Close the last block and summarize
    pub fn finish(mut self) -> Result<SimulationReport> {
        self.events.extend(self.machine.end_block());

        let positions = self
            .machine
            .lending()
            .positions()
            .all_positions()
            .map(|position| {
                let (report, note) = if position.is_active() {
                    match self.machine.position_report(position.id) {
                        Ok(report) => (Some(report), None),
                        Err(e) => (None, Some(e.to_string())),
                    }
                } else {
                    (None, Some("closed".to_string()))
                };
                PositionSummary {
                    position: position.clone(),
                    report,
                    note,
                }
            })
            .collect();

        Ok(SimulationReport {
            name: self.name,
            liquidatable: self.machine.find_liquidatable(),
            bad_debt: self.machine.lending().bad_debt(),
            block_height: self.machine.block_height(),
            timestamp: self.machine.timestamp(),
            state_hash: self.machine.state_hash()?.to_hex(),
            steps: self.steps,
            events: self.events,
            positions,
        })
    }

    /// Protocol being driven
    pub fn machine(&self) -> &SimulatedProtocol {
        &self.machine
    }

    /// Results so far
    pub fn reports(&self) -> &[StepReport] {
        &self.steps
    }

    fn apply(&mut self, step: &Step) -> Result<String> {
        let admin = self.admin;
        match step {
            Step::RegisterAsset {
                asset,
                decimals,
                collateral_factor,
            } => {
                let asset = AssetId::new(asset)?;
                self.machine.register_asset(&admin, asset.clone(), *decimals)?;
                if let Some(factor) = collateral_factor {
                    self.machine.set_collateral_factor(&admin, &asset, factor.parse()?)?;
                }
                Ok(format!("{} registered", asset))
            }
            Step::RemoveCollateral { asset } => {
                let asset = AssetId::new(asset)?;
                self.machine.remove_collateral(&admin, &asset)?;
                Ok(format!("{} removed as collateral", asset))
            }
            Step::SetPrice { asset, price, age } => {
                let asset = AssetId::new(asset)?;
                let price: Wad = price.parse()?;
                let updated_at = self.machine.timestamp().saturating_sub(*age);
                self.machine.oracle_mut().set_price(asset.clone(), price, updated_at)?;
                Ok(format!("{} = {} at {}", asset, price, updated_at))
            }
            Step::Mint { account, asset, amount } => {
                let asset = AssetId::new(asset)?;
                let raw = self.amount(&asset, amount)?;
                self.machine
                    .ledger_mut()
                    .mint(&asset, &AccountId::from_label(account), raw)?;
                Ok(format!("{} {} minted to {}", amount, asset, account))
            }
            Step::Configure => {
                self.machine.configure(&admin)?;
                Ok("configured".into())
            }
            Step::SetKeeper { keeper, allowed } => {
                self.machine
                    .set_keeper(&admin, AccountId::from_label(keeper), *allowed)?;
                Ok(format!("keeper {} allowed={}", keeper, allowed))
            }
            Step::SetYieldVault { asset, vault } => {
                let vault = vault.as_deref().map(AccountId::from_label);
                self.machine.set_yield_vault(&admin, AssetId::new(asset)?, vault)?;
                Ok(format!("yield vault for {} set", asset))
            }
            Step::SetRecipient { recipient, allowed } => {
                self.machine
                    .set_recipient(&admin, AccountId::from_label(recipient), *allowed)?;
                Ok(format!("recipient {} allowed={}", recipient, allowed))
            }
            Step::AddRewardAsset { asset } => {
                self.machine.add_reward_asset(&admin, AssetId::new(asset)?)?;
                Ok(format!("reward pool for {}", asset))
            }
            Step::SetHealthThreshold { threshold } => {
                self.machine.set_health_threshold(&admin, threshold.parse()?)?;
                Ok(format!("health threshold {}", threshold))
            }
            Step::SetLiquidationBonus { bps } => {
                self.machine.set_liquidation_bonus(&admin, *bps)?;
                Ok(format!("liquidation bonus {} bps", bps))
            }
            Step::AdvanceBlock { blocks, seconds } => {
                let seconds = seconds.unwrap_or(blocks.saturating_mul(self.block_time));
                let height = self.machine.block_height().saturating_add(*blocks);
                let timestamp = self.machine.timestamp().saturating_add(seconds);
                self.events.extend(self.machine.end_block());
                self.machine.begin_block(height, timestamp)?;
                Ok(format!("block {} at {}", height, timestamp))
            }
            _ => {
                let op = self.operation(step)?;
                let outcome = self.machine.execute(op)?;
                Ok(describe(&outcome))
            }
        }
    }

    fn operation(&self, step: &Step) -> Result<Operation> {
        let params = self.machine.lending().params();
        let debt_asset = params.debt_asset.clone();
        let boost_asset = params.boost_asset.clone();
        let label = |s: &String| AccountId::from_label(s);

        Ok(match step {
            Step::Deposit { account, asset, amount } => {
                let asset = AssetId::new(asset)?;
                Operation::DepositCollateral {
                    owner: label(account),
                    amount: self.amount(&asset, amount)?,
                    asset,
                }
            }
            Step::Borrow { account, position, amount } => Operation::Borrow {
                owner: label(account),
                position_id: PositionId(*position),
                amount: self.amount(&debt_asset, amount)?,
            },
            Step::Repay { account, position, amount } => Operation::Repay {
                payer: label(account),
                position_id: PositionId(*position),
                amount: self.amount(&debt_asset, amount)?,
            },
            Step::Withdraw { account, position, amount } => {
                let asset = self.machine.position(PositionId(*position))?.asset.clone();
                Operation::WithdrawCollateral {
                    owner: label(account),
                    position_id: PositionId(*position),
                    amount: self.amount(&asset, amount)?,
                }
            }
            Step::Stake { account, amount } => Operation::Stake {
                account: label(account),
                amount: self.amount(&boost_asset, amount)?,
            },
            Step::Unstake { account, amount } => Operation::Unstake {
                account: label(account),
                amount: self.amount(&boost_asset, amount)?,
            },
            Step::Liquidate {
                liquidator,
                position,
                amount,
            } => Operation::Liquidate {
                liquidator: label(liquidator),
                position_id: PositionId(*position),
                repay_amount: self.amount(&debt_asset, amount)?,
            },
            Step::RouteYield { keeper, position, amount } => Operation::RouteYield {
                keeper: label(keeper),
                position_id: PositionId(*position),
                amount: self.amount(&debt_asset, amount)?,
            },
            Step::Harvest { keeper, position } => Operation::HarvestAndApply {
                keeper: label(keeper),
                position_id: PositionId(*position),
            },
            Step::CollectFees { payer, asset, amount } => {
                let asset = AssetId::new(asset)?;
                Operation::CollectFees {
                    payer: label(payer),
                    amount: self.amount(&asset, amount)?,
                    asset,
                }
            }
            Step::Claim { account, asset } => Operation::ClaimReward {
                account: label(account),
                asset: AssetId::new(asset)?,
            },
            Step::Disburse {
                recipient,
                asset,
                amount,
            } => {
                let asset = AssetId::new(asset)?;
                Operation::Disburse {
                    caller: self.admin,
                    recipient: label(recipient),
                    amount: self.amount(&asset, amount)?,
                    asset,
                }
            }
            other => {
                return Err(crate::error::Error::InvalidParameter {
                    name: "action".into(),
                    reason: format!("{} is not an operation", other.action()),
                })
            }
        })
    }

    fn amount(&self, asset: &AssetId, human: &str) -> Result<u128> {
        let decimals = self.machine.lending().registry().decimals(asset)?;
        parse_units(human, decimals)
    }
}

fn describe(outcome: &OperationOutcome) -> String {
    match outcome {
        OperationOutcome::Deposited { position_id } => format!("position {}", position_id),
        OperationOutcome::Borrowed { health_factor } => format!("health factor {}", health_factor),
        OperationOutcome::Repaid { applied } => format!("repaid {}", applied),
        OperationOutcome::Withdrawn { remaining } => format!("collateral left {}", remaining),
        OperationOutcome::Staked { stake } | OperationOutcome::Unstaked { stake } => format!("stake {}", stake),
        OperationOutcome::Liquidated(record) => format!(
            "repaid {} seized {} written off {}",
            record.debt_repaid, record.collateral_seized, record.written_off
        ),
        OperationOutcome::YieldApplied { applied } => format!("applied {}", applied),
        OperationOutcome::Harvested(record) => {
            format!("harvested {} applied {}", record.claimed, record.applied)
        }
        OperationOutcome::FeesCollected(split) => {
            format!("disbursement {} rewards {}", split.disbursement, split.rewards)
        }
        OperationOutcome::RewardClaimed { amount } => format!("claimed {}", amount),
        OperationOutcome::Disbursed => "disbursed".into(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
