//! Liquidation module.
//!
//! Detection and execution of liquidations for positions whose health
//! factor fell below the threshold.

pub mod engine;

pub use engine::*;
