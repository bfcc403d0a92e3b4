//! Protocol operations - atomic state changes.
//!
//! Every user-facing action is an [`Operation`]. The state machine executes
//! each one as a whole-operation transaction and answers with an
//! [`OperationOutcome`].

use serde::{Deserialize, Serialize};

use crate::core::asset::AssetId;
use crate::core::position::PositionId;
use crate::lending::HarvestRecord;
use crate::liquidation::LiquidationRecord;
use crate::revenue::FeeSplit;
use crate::utils::crypto::AccountId;
use crate::utils::math::Wad;

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// A user or keeper action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Deposit collateral, opening a position if needed
    DepositCollateral {
        /// Position owner
        owner: AccountId,
        /// Collateral asset
        asset: AssetId,
        /// Raw amount
        amount: u128,
    },
    /// Draw debt
    Borrow {
        /// Position owner
        owner: AccountId,
        /// Target position
        position_id: PositionId,
        /// Raw amount
        amount: u128,
    },
    /// Repay debt on any position
    Repay {
        /// Account paying
        payer: AccountId,
        /// Target position
        position_id: PositionId,
        /// Raw amount, clamped to the debt
        amount: u128,
    },
    /// Withdraw collateral
    WithdrawCollateral {
        /// Position owner
        owner: AccountId,
        /// Target position
        position_id: PositionId,
        /// Raw amount
        amount: u128,
    },
    /// Stake boost tokens
    Stake {
        /// Staker
        account: AccountId,
        /// Raw amount
        amount: u128,
    },
    /// Unstake boost tokens
    Unstake {
        /// Staker
        account: AccountId,
        /// Raw amount
        amount: u128,
    },
    /// Liquidate an unhealthy position
    Liquidate {
        /// Account repaying and receiving collateral
        liquidator: AccountId,
        /// Target position
        position_id: PositionId,
        /// Debt to repay, clamped to the debt
        repay_amount: u128,
    },
    /// Apply harvested yield to a position's debt
    RouteYield {
        /// Relay submitting the yield
        keeper: AccountId,
        /// Target position
        position_id: PositionId,
        /// Raw amount held by the router
        amount: u128,
    },
    /// Claim collateral yield and apply it to a position's debt
    HarvestAndApply {
        /// Relay triggering the harvest
        keeper: AccountId,
        /// Target position
        position_id: PositionId,
    },
    /// Collect and split fees
    CollectFees {
        /// Account the fees are pulled from
        payer: AccountId,
        /// Fee asset
        asset: AssetId,
        /// Raw amount
        amount: u128,
    },
    /// Claim staker rewards
    ClaimReward {
        /// Claimant
        account: AccountId,
        /// Reward asset
        asset: AssetId,
    },
    /// Pay from the disbursement pool
    Disburse {
        /// Admin issuing the payment
        caller: AccountId,
        /// Asset
        asset: AssetId,
        /// Allow-listed recipient
        recipient: AccountId,
        /// Raw amount
        amount: u128,
    },
}

impl Operation {
    /// Get the operation type name
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::DepositCollateral { .. } => "DepositCollateral",
            Self::Borrow { .. } => "Borrow",
            Self::Repay { .. } => "Repay",
            Self::WithdrawCollateral { .. } => "WithdrawCollateral",
            Self::Stake { .. } => "Stake",
            Self::Unstake { .. } => "Unstake",
            Self::Liquidate { .. } => "Liquidate",
            Self::RouteYield { .. } => "RouteYield",
            Self::HarvestAndApply { .. } => "HarvestAndApply",
            Self::CollectFees { .. } => "CollectFees",
            Self::ClaimReward { .. } => "ClaimReward",
            Self::Disburse { .. } => "Disburse",
        }
    }

    /// Account on whose authority the operation runs
    pub fn caller(&self) -> &AccountId {
        match self {
            Self::DepositCollateral { owner, .. }
            | Self::Borrow { owner, .. }
            | Self::WithdrawCollateral { owner, .. } => owner,
            Self::Repay { payer, .. } | Self::CollectFees { payer, .. } => payer,
            Self::Stake { account, .. } | Self::Unstake { account, .. } | Self::ClaimReward { account, .. } => {
                account
            }
            Self::Liquidate { liquidator, .. } => liquidator,
            Self::RouteYield { keeper, .. } | Self::HarvestAndApply { keeper, .. } => keeper,
            Self::Disburse { caller, .. } => caller,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a successful operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationOutcome {
    /// Collateral deposited into `position_id`
    Deposited {
        /// Position credited
        position_id: PositionId,
    },
    /// Debt drawn
    Borrowed {
        /// Health factor afterwards
        health_factor: Wad,
    },
    /// Debt repaid
    Repaid {
        /// Amount applied
        applied: u128,
    },
    /// Collateral withdrawn
    Withdrawn {
        /// Collateral left
        remaining: u128,
    },
    /// Stake increased
    Staked {
        /// New stake
        stake: u128,
    },
    /// Stake decreased
    Unstaked {
        /// New stake
        stake: u128,
    },
    /// Position liquidated
    Liquidated(LiquidationRecord),
    /// Yield applied
    YieldApplied {
        /// Amount applied
        applied: u128,
    },
    /// Yield harvested from a collateral source
    Harvested(HarvestRecord),
    /// Fees split
    FeesCollected(FeeSplit),
    /// Rewards claimed
    RewardClaimed {
        /// Amount paid
        amount: u128,
    },
    /// Disbursement paid
    Disbursed,
}
