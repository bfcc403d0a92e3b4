//! Asset custody seam and per-operation settlement.

pub mod asset_ledger;
pub mod settlement;

pub use asset_ledger::*;
pub use settlement::*;
