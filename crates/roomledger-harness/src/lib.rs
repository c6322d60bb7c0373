//! Deterministic test harness for the room ledger.
//!
//! Provides a simulated [`Environment`](roomledger_core::Environment) with a
//! manual clock and a seeded RNG, so service-level scenarios replay exactly.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for model-based
//! testing. Operations are applied to both the model and real implementation,
//! and their observable states are compared. [`LedgerDriver`] applies the
//! same operations to the real `Ledger`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
pub mod model;
pub mod sim_env;

pub use driver::LedgerDriver;
pub use model::{
    ClientId, ModelMessage, ModelRoom, ModelRoomId, ModelWorld, NULL_CLIENT, ObservableState,
    Operation, OperationError, OperationResult, SmallText, caller_id,
};
pub use sim_env::{SIM_EPOCH, SimEnv};
