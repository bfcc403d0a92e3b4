//! Utility modules for the boostlend protocol.
//!
//! This module contains shared utilities used across the protocol:
//! - Hashes and account identifiers
//! - Fixed-point arithmetic
//! - Validation helpers
//! - Constants

pub mod constants;
pub mod crypto;
pub mod math;
pub mod validation;

pub use constants::*;
pub use crypto::*;
pub use math::*;
pub use validation::*;
