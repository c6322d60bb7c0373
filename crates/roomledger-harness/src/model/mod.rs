//! Reference model for model-based testing.
//!
//! The model is a simplified implementation that captures the rules of the
//! ledger without its data structures. It serves as the oracle against which
//! the real implementation is verified.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Rules, not structure: Captures WHAT, not HOW
//! - Deterministic: Same inputs produce same outputs

pub mod operation;
mod world;

pub use operation::{
    ClientId, ModelRoomId, NULL_CLIENT, Operation, OperationError, OperationResult, SmallText,
    caller_id,
};
pub use world::{ModelMessage, ModelRoom, ModelWorld, ObservableState};
