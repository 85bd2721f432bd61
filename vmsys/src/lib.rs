//! # vmsys
//!
//! A session-oriented JavaScript runtime service. Templates describe how a
//! runtime is provisioned; sessions are long-lived runtimes bound to a
//! worktree directory; executions are REPL snippets or worktree files run
//! inside a session, each producing an ordered, persisted event stream.
//!
//! ## Architecture
//!
//! ### One thread per session
//!
//! Every session owns a dedicated OS thread holding its script context. Work
//! is shipped to that thread as closures (`runtime::ScriptRuntime::run`), and
//! only plain data crosses back. A per-session mutex serializes executions;
//! a second caller gets `SESSION_BUSY` instead of queueing.
//!
//! ### Worktree scoping
//!
//! File access from startup files, run-file and the `fs` module goes through
//! `sandbox::WorktreeRoot`, which canonicalizes both sides and rejects any
//! path that resolves outside the root, symlinks included.
//!
//! ### Events
//!
//! Each execution records `input_echo`, any `console` lines, then a final
//! `value` or `exception`, with `seq` starting at 1 and no gaps. A failed
//! event write fails the execution with `PERSISTENCE_FAILED` rather than
//! leaving a silent hole.
//!
//! ## Modules
//!
//! - **`control`**: Template, session and execution services plus `Core`.
//! - **`session`**: Session lifecycle, startup files and stale-session GC.
//! - **`execution`**: The execution pipeline and event recorder.
//! - **`runtime`**: The per-session script thread, console capture and value
//!   conversion.
//! - **`modules`**: Native modules exposed through `require()`.
//! - **`sandbox`**: Worktree path resolution.
//! - **`store`**: Storage traits, the in-memory store and the library cache.

// Public modules
pub mod config;
pub mod control;
pub mod error;
pub mod execution;
pub mod models;
pub mod modules;
pub mod runtime;
pub mod sandbox;
pub mod session;
pub mod shell;
pub mod store;
pub mod utils;

// Test utilities
pub mod test_utils;

// Re-export main types for easier use
pub use control::Core;
pub use error::VmError;
pub use session::SessionManager;
