//! Protocol module - Core state machine and orchestration.
//!
//! This module provides the central state machine that runs every
//! boostlend operation as a whole-operation transaction.

pub mod context;
pub mod events;
pub mod operations;
pub mod state_machine;

pub use context::*;
pub use events::*;
pub use operations::*;
pub use state_machine::*;
