//! Protocol events for state change notifications.
//!
//! Each event carries the identifiers and resulting amounts of the change, so
//! an observer can rebuild positions, stakes and pools from the stream alone.

use serde::{Deserialize, Serialize};

use crate::core::asset::AssetId;
use crate::core::position::PositionId;
use crate::utils::crypto::{AccountId, Hash};
use crate::utils::math::Wad;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All protocol event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    // Position Events
    /// Position was opened
    PositionOpened(PositionOpenedEvent),
    /// Collateral was deposited
    CollateralDeposited(CollateralDepositedEvent),
    /// Debt was drawn
    Borrowed(BorrowedEvent),
    /// Debt was repaid
    Repaid(RepaidEvent),
    /// Collateral was withdrawn
    CollateralWithdrawn(CollateralWithdrawnEvent),
    /// Position was closed
    PositionClosed(PositionClosedEvent),

    // Liquidation Events
    /// Position was liquidated
    Liquidated(LiquidatedEvent),
    /// Uncollateralized residual debt was written off
    BadDebtWrittenOff(BadDebtWrittenOffEvent),

    // Boost Events
    /// Boost tokens were staked
    Staked(StakeChangedEvent),
    /// Boost tokens were unstaked
    Unstaked(StakeChangedEvent),

    // Yield Events
    /// External yield reduced a position's debt
    YieldApplied(YieldAppliedEvent),
    /// Yield was claimed from a collateral yield source
    YieldHarvested(YieldHarvestedEvent),

    // Revenue Events
    /// Fees were collected and split
    FeesCollected(FeesCollectedEvent),
    /// Staker reward was claimed
    RewardClaimed(RewardClaimedEvent),
    /// Disbursement pool paid a whitelisted recipient
    FeesDisbursed(FeesDisbursedEvent),

    // Admin Events
    /// Admin changed a parameter or allow-list
    ParameterChanged(ParameterChangedEvent),
    /// Engines were wired together
    Configured(ConfiguredEvent),
}

macro_rules! dispatch {
    ($event:expr, $e:ident => $body:expr) => {
        match $event {
            ProtocolEvent::PositionOpened($e) => $body,
            ProtocolEvent::CollateralDeposited($e) => $body,
            ProtocolEvent::Borrowed($e) => $body,
            ProtocolEvent::Repaid($e) => $body,
            ProtocolEvent::CollateralWithdrawn($e) => $body,
            ProtocolEvent::PositionClosed($e) => $body,
            ProtocolEvent::Liquidated($e) => $body,
            ProtocolEvent::BadDebtWrittenOff($e) => $body,
            ProtocolEvent::Staked($e) => $body,
            ProtocolEvent::Unstaked($e) => $body,
            ProtocolEvent::YieldApplied($e) => $body,
            ProtocolEvent::YieldHarvested($e) => $body,
            ProtocolEvent::FeesCollected($e) => $body,
            ProtocolEvent::RewardClaimed($e) => $body,
            ProtocolEvent::FeesDisbursed($e) => $body,
            ProtocolEvent::ParameterChanged($e) => $body,
            ProtocolEvent::Configured($e) => $body,
        }
    };
}

impl ProtocolEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PositionOpened(_) => "PositionOpened",
            Self::CollateralDeposited(_) => "CollateralDeposited",
            Self::Borrowed(_) => "Borrowed",
            Self::Repaid(_) => "Repaid",
            Self::CollateralWithdrawn(_) => "CollateralWithdrawn",
            Self::PositionClosed(_) => "PositionClosed",
            Self::Liquidated(_) => "Liquidated",
            Self::BadDebtWrittenOff(_) => "BadDebtWrittenOff",
            Self::Staked(_) => "Staked",
            Self::Unstaked(_) => "Unstaked",
            Self::YieldApplied(_) => "YieldApplied",
            Self::YieldHarvested(_) => "YieldHarvested",
            Self::FeesCollected(_) => "FeesCollected",
            Self::RewardClaimed(_) => "RewardClaimed",
            Self::FeesDisbursed(_) => "FeesDisbursed",
            Self::ParameterChanged(_) => "ParameterChanged",
            Self::Configured(_) => "Configured",
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> u64 {
        dispatch!(self, e => e.timestamp)
    }

    /// Get the block height of the event
    pub fn block_height(&self) -> u64 {
        dispatch!(self, e => e.block_height)
    }

    /// Position the event concerns, if any
    pub fn position_id(&self) -> Option<PositionId> {
        match self {
            Self::PositionOpened(e) => Some(e.position_id),
            Self::CollateralDeposited(e) => Some(e.position_id),
            Self::Borrowed(e) => Some(e.position_id),
            Self::Repaid(e) => Some(e.position_id),
            Self::CollateralWithdrawn(e) => Some(e.position_id),
            Self::PositionClosed(e) => Some(e.position_id),
            Self::Liquidated(e) => Some(e.position_id),
            Self::BadDebtWrittenOff(e) => Some(e.position_id),
            Self::YieldApplied(e) => Some(e.position_id),
            Self::YieldHarvested(e) => Some(e.position_id),
            _ => None,
        }
    }

    /// Compute event hash
    pub fn hash(&self) -> Hash {
        let data = bincode::serialize(self).unwrap_or_default();
        Hash::sha256(&data)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when a position is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    /// Position identifier
    pub position_id: PositionId,
    /// Owner
    pub owner: AccountId,
    /// Collateral asset
    pub asset: AssetId,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when collateral is deposited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralDepositedEvent {
    /// Position identifier
    pub position_id: PositionId,
    /// Depositor
    pub depositor: AccountId,
    /// Collateral asset
    pub asset: AssetId,
    /// Amount deposited
    pub amount: u128,
    /// New total collateral
    pub new_collateral: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when debt is drawn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowedEvent {
    /// Position identifier
    pub position_id: PositionId,
    /// Owner who borrowed
    pub owner: AccountId,
    /// Amount paid out
    pub amount: u128,
    /// New total debt
    pub new_debt: u128,
    /// Health factor after the borrow
    pub health_factor: Wad,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when debt is repaid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaidEvent {
    /// Position identifier
    pub position_id: PositionId,
    /// Account whose funds were pulled
    pub payer: AccountId,
    /// Amount applied (after clamping to debt)
    pub amount: u128,
    /// New total debt
    pub new_debt: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when collateral is withdrawn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralWithdrawnEvent {
    /// Position identifier
    pub position_id: PositionId,
    /// Owner who withdrew
    pub owner: AccountId,
    /// Collateral asset
    pub asset: AssetId,
    /// Amount withdrawn
    pub amount: u128,
    /// New total collateral
    pub new_collateral: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a position closes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    /// Position identifier
    pub position_id: PositionId,
    /// Owner
    pub owner: AccountId,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when a position is liquidated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidatedEvent {
    /// Position identifier
    pub position_id: PositionId,
    /// Owner of the position
    pub owner: AccountId,
    /// Liquidator
    pub liquidator: AccountId,
    /// Collateral asset
    pub asset: AssetId,
    /// Debt repaid by the liquidator
    pub debt_repaid: u128,
    /// Collateral paid to the liquidator
    pub collateral_seized: u128,
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
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when residual debt is written off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadDebtWrittenOffEvent {
    /// Position identifier
    pub position_id: PositionId,
    /// Owner of the position
    pub owner: AccountId,
    /// Debt removed
    pub amount: u128,
    /// Protocol-wide bad debt after this write-off
    pub total_bad_debt: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BOOST / YIELD / REVENUE EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted on stake or unstake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeChangedEvent {
    /// Staker
    pub account: AccountId,
    /// Amount staked or unstaked
    pub amount: u128,
    /// Stake afterwards
    pub new_stake: u128,
    /// Collateral-factor bonus afterwards
    pub new_bonus: Wad,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when yield repays debt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldAppliedEvent {
    /// Position identifier
    pub position_id: PositionId,
    /// Keeper that relayed the yield
    pub keeper: AccountId,
    /// Yield reported by the keeper
    pub requested: u128,
    /// Debt actually reduced
    pub applied: u128,
    /// New total debt
    pub new_debt: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a keeper harvests collateral yield for a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldHarvestedEvent {
    /// Position the harvest was applied to
    pub position_id: PositionId,
    /// Keeper that triggered the harvest
    pub keeper: AccountId,
    /// Collateral asset whose yield was claimed
    pub asset: AssetId,
    /// Amount claimed into the router
    pub claimed: u128,
    /// Part of the claim applied to debt; the rest stays with the router
    pub applied: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when fees are split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeesCollectedEvent {
    /// Fee asset
    pub asset: AssetId,
    /// Account the fees were pulled from
    pub payer: AccountId,
    /// Gross amount
    pub amount: u128,
    /// Routed to the disbursement pool
    pub disbursement_share: u128,
    /// Routed to the staker reward pool
    pub reward_share: u128,
    /// Reward share waiting for stakers
    pub undistributed: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a staker claims rewards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardClaimedEvent {
    /// Claimant
    pub account: AccountId,
    /// Reward asset
    pub asset: AssetId,
    /// Amount paid
    pub amount: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when the disbursement pool pays out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeesDisbursedEvent {
    /// Asset paid
    pub asset: AssetId,
    /// Whitelisted recipient
    pub recipient: AccountId,
    /// Amount paid
    pub amount: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADMIN EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when an admin setting changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterChangedEvent {
    /// Parameter name
    pub parameter: String,
    /// New value, rendered
    pub value: String,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when engines are wired
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredEvent {
    /// Yield router identity
    pub yield_router: AccountId,
    /// Liquidation engine identity
    pub liquidation_engine: AccountId,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Collection of events from an operation or block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn push(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get the number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Merge another event log into this one
    pub fn merge(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Digest over the ordered event hashes
    pub fn digest(&self) -> Hash {
        let mut data = Vec::with_capacity(self.events.len() * 32);
        for event in &self.events {
            data.extend_from_slice(event.hash().as_bytes());
        }
        Hash::sha256(&data)
    }
}

impl IntoIterator for EventLog {
    type Item = ProtocolEvent;
    type IntoIter = std::vec::IntoIter<ProtocolEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
