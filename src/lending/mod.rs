//! Lending module - position operations and yield repayment.

pub mod engine;
pub mod yield_router;

pub use engine::*;
pub use yield_router::*;
