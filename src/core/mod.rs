//! Core modules for the boostlend protocol.
//!
//! This module contains the fundamental building blocks:
//! - Asset identifiers and configuration
//! - Collateral registry
//! - Position ledger
//! - Access control and engine wiring

pub mod access;
pub mod asset;
pub mod config;
pub mod position;
pub mod registry;

pub use access::*;
pub use asset::*;
pub use config::*;
pub use position::*;
pub use registry::*;
