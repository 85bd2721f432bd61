//! Shared primitives for the vmsys workspace.

pub mod state_machine;

pub use state_machine::{InvalidTransition, Lifecycle, StateMachine};
