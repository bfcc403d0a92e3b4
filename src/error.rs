//! Error types for the boostlend protocol.
//!
//! Every precondition violation surfaces as its own variant so callers can
//! react to the exact failure instead of parsing messages.

use thiserror::Error;

/// Result type alias for boostlend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the boostlend protocol
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Position Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Position id was never allocated
    #[error("Position not found: {0}")]
    PositionNotFound(u64),

    /// Position exists but has been closed
    #[error("Position is not active: {0}")]
    PositionNotActive(u64),

    /// Borrow would leave the position below the health threshold
    #[error("Insufficient health factor: {health_factor} below threshold {threshold}")]
    InsufficientHealthFactor {
        /// Post-borrow health factor (Wad, raw)
        health_factor: u128,
        /// Required threshold (Wad, raw)
        threshold: u128,
    },

    /// Withdrawal would leave an indebted position below the threshold
    #[error("Withdrawal would violate health factor: {health_factor} below threshold {threshold}")]
    WithdrawalViolatesHealthFactor {
        /// Post-withdrawal health factor (Wad, raw)
        health_factor: u128,
        /// Required threshold (Wad, raw)
        threshold: u128,
    },

    /// Requested more collateral than the position holds
    #[error("Insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral {
        /// Requested amount
        required: u128,
        /// Collateral held by the position
        available: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Liquidation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Position is at or above the threshold and cannot be liquidated
    #[error("Loan is healthy: position {position_id} has health factor {health_factor}")]
    LoanIsHealthy {
        /// Position that was targeted
        position_id: u64,
        /// Current health factor (Wad, raw)
        health_factor: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Oracle Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Quote is older than the allowed age
    #[error("Price for {asset} is stale: age {age}s, max allowed {max_age}s")]
    StalePrice {
        /// Asset whose quote is stale
        asset: String,
        /// Age of the quote in seconds
        age: u64,
        /// Maximum allowed age in seconds
        max_age: u64,
    },

    /// Collateral asset has no yield source to harvest from
    #[error("No yield source configured for {0}")]
    NoYieldSource(String),

    /// No feed configured for the asset
    #[error("No price feed configured for {0}")]
    NoFeedConfigured(String),

    /// Feed reported a non-positive or unrepresentable price
    #[error("Invalid price for {asset}: {reason}")]
    InvalidPrice {
        /// Asset whose price is invalid
        asset: String,
        /// Why the price was rejected
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Caller lacks the required role
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Disbursement recipient is not on the allow-list
    #[error("Recipient not whitelisted: {0}")]
    RecipientNotWhitelisted(String),

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Asset has no collateral configuration or is not a registered reward asset
    #[error("Unsupported asset: {0}")]
    UnsupportedAsset(String),

    /// Unstake more than the account has staked
    #[error("Insufficient stake: requested {requested}, staked {staked}")]
    InsufficientStake {
        /// Requested unstake amount
        requested: u128,
        /// Current stake
        staked: u128,
    },

    /// Unstake would push an open position below the threshold
    #[error("Unstake would violate health factor of position {position_id}: {health_factor}")]
    UnstakeViolatesHealthFactor {
        /// First position found below the threshold
        position_id: u64,
        /// Its health factor under the reduced bonus (Wad, raw)
        health_factor: u128,
    },

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Protocol Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Engine wiring has not been configured yet
    #[error("Protocol is not configured")]
    NotConfigured,

    /// Engine wiring was already configured
    #[error("Protocol is already configured")]
    AlreadyConfigured,

    /// Asset ledger refused a transfer
    #[error("Transfer of {amount} {asset} failed: {reason}")]
    TransferFailed {
        /// Asset being moved
        asset: String,
        /// Amount being moved
        amount: u128,
        /// Ledger-reported reason
        reason: String,
    },

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // ═══════════════════════════════════════════════════════════════════
    // Serialization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the caller can fix the condition and retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientHealthFactor { .. }
                | Error::WithdrawalViolatesHealthFactor { .. }
                | Error::UnstakeViolatesHealthFactor { .. }
                | Error::InsufficientCollateral { .. }
                | Error::InsufficientStake { .. }
                | Error::StalePrice { .. }
                | Error::TransferFailed { .. }
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation(_)
                | Error::Internal(_)
                | Error::Overflow { .. }
                | Error::Underflow { .. }
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Position errors: 1xxx
            Error::PositionNotFound(_) => 1001,
            Error::PositionNotActive(_) => 1002,
            Error::InsufficientHealthFactor { .. } => 1003,
            Error::WithdrawalViolatesHealthFactor { .. } => 1004,
            Error::InsufficientCollateral { .. } => 1005,

            // Liquidation errors: 2xxx
            Error::LoanIsHealthy { .. } => 2001,

            // Oracle errors: 3xxx
            Error::StalePrice { .. } => 3001,
            Error::NoFeedConfigured(_) => 3002,
            Error::InvalidPrice { .. } => 3003,
            Error::NoYieldSource(_) => 3004,

            // Authorization errors: 4xxx
            Error::NotAuthorized(_) => 4001,
            Error::RecipientNotWhitelisted(_) => 4002,

            // Validation errors: 5xxx
            Error::InvalidParameter { .. } => 5001,
            Error::ZeroAmount => 5002,
            Error::UnsupportedAsset(_) => 5003,
            Error::InsufficientStake { .. } => 5004,
            Error::UnstakeViolatesHealthFactor { .. } => 5005,
            Error::Overflow { .. } => 5006,
            Error::Underflow { .. } => 5007,

            // Protocol errors: 6xxx
            Error::NotConfigured => 6001,
            Error::AlreadyConfigured => 6002,
            Error::TransferFailed { .. } => 6003,
            Error::InvariantViolation(_) => 6004,

            // Serialization errors: 7xxx
            Error::Serialization(_) => 7001,
            Error::Deserialization(_) => 7002,

            // Internal errors: 9xxx
            Error::Internal(_) => 9001,
        }
    }
}
