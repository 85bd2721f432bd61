//! # Shell Module
//!
//! Main entry point and CLI logic for the `vmsys` binary.

pub mod cli;

pub use cli::{Cli, Command, run};
