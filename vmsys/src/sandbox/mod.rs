//! # Worktree Path Sandbox
//!
//! Every file a session touches (startup files, run-file targets, the `fs`
//! native module) is addressed relative to the session's worktree and resolved
//! here. Resolution happens in two stages:
//!
//! 1. **Lexical**: [`RelWorktreePath::parse`] rejects empty, absolute and
//!    `..`-prefixed input after normalization.
//! 2. **Symlink-aware**: [`WorktreeRoot::resolve`] canonicalizes the joined
//!    path (when it exists) and re-checks that it still lives under the
//!    canonical root. A link inside the tree that points outside is rejected.

mod core;
mod error;
mod scopes;
mod types;

pub use core::WorktreeRoot;
pub use error::SandboxError;
pub use scopes::normalize_path_lexically;
pub use types::{RelWorktreePath, ResolvedWorktreePath};

/// Parse a relative path and resolve it against `root` in one step.
pub fn resolve_relative(root: &WorktreeRoot, path: &str) -> Result<ResolvedWorktreePath, SandboxError> {
    let rel = RelWorktreePath::parse(path)?;
    root.resolve(&rel)
}
