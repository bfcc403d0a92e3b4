//! Fee revenue: disbursement pool and staker rewards.

pub mod rewards;
pub mod splitter;

pub use rewards::*;
pub use splitter::*;
