//! Test helper utilities for vmsys.
//!
//! Reusable helpers for unit and integration tests: a store with injectable
//! persistence faults and a fixture that scaffolds a worktree, a library
//! cache and a template. These APIs are intended for test-only code paths.

pub mod fixture;
pub mod stores;

pub use fixture::*;
pub use stores::*;

pub use crate::utils::logging::init_test_logging;
