//! Position solvency.

pub mod health;

pub use health::*;
