//! # boostlend
//!
//! Risk core of an over-collateralized lending protocol with a staking
//! boost, keeper-routed yield repayment and a fee revenue splitter.
//!
//! ## Architecture
//!
//! - **Core**: Assets, positions, collateral registry, parameters and access control
//! - **Oracle**: Price feed rounds normalized into a fresh, per-operation snapshot
//! - **Ledger**: Asset balances and the rollback journal used for settlement
//! - **Risk**: Health factor math (collateral rounds down, debt rounds up)
//! - **Boost**: Stake ledger raising the borrower's collateral factor
//! - **Lending**: Deposit, borrow, repay, withdraw and keeper yield routing
//! - **Liquidation**: Detection and seizure of unhealthy positions
//! - **Revenue**: Fee split between a disbursement pool and staker rewards
//! - **Protocol**: State machine running every operation atomically
//!
//! ## Example
//!
//! ```rust,ignore
//! use boostlend::prelude::*;
//!
//! let mut machine = ProtocolStateMachine::new(admin, ProtocolParams::default(), feeds, ledger)?;
//! machine.register_asset(&admin, AssetId::new("bUSD")?, 18)?;
//! machine.configure(&admin)?;
//!
//! let id = machine.deposit_collateral(alice, wbtc, 100_000_000)?;
//! let hf = machine.borrow(alice, id, 40_000 * WAD)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod boost;
pub mod cli;
pub mod core;
pub mod error;
pub mod ledger;
pub mod lending;
pub mod liquidation;
pub mod oracle;
pub mod protocol;
pub mod revenue;
pub mod risk;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::boost::BoostLedger;
    pub use crate::core::{
        asset::AssetId,
        config::ProtocolParams,
        position::{Position, PositionId, PositionStatus},
        registry::CollateralRegistry,
    };
    pub use crate::error::{Error, Result};
    pub use crate::ledger::{AssetLedger, InMemoryLedger};
    pub use crate::lending::{HarvestRecord, LendingEngine, YieldRouter, YieldSource, YieldVaults};
    pub use crate::liquidation::{LiquidationEngine, LiquidationRecord};
    pub use crate::oracle::{PriceFeedRegistry, PriceOracle, PriceSnapshot};
    pub use crate::protocol::{EventLog, Operation, OperationOutcome, ProtocolEvent, ProtocolStateMachine};
    pub use crate::revenue::{FeeSplit, RevenueSplitter};
    pub use crate::risk::{HealthEngine, HealthReport};
    pub use crate::utils::{
        constants::WAD,
        crypto::{AccountId, Hash},
        math::Wad,
    };
}

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "boostlend";
