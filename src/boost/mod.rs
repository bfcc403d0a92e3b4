//! Staking-based collateral boost.

pub mod ledger;

pub use ledger::*;
