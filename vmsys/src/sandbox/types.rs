use std::fmt;
use std::path::{Path, PathBuf};

use super::core::WorktreeRoot;

/// A validated, lexically normalized path relative to a worktree root.
///
/// Never empty, never absolute, never starting with `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelWorktreePath(pub(super) PathBuf);

impl RelWorktreePath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for RelWorktreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A relative path joined to its root with symlinks resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWorktreePath {
    pub(super) root: WorktreeRoot,
    pub(super) relative: PathBuf,
    pub(super) absolute: PathBuf,
}

impl ResolvedWorktreePath {
    pub fn root(&self) -> &WorktreeRoot {
        &self.root
    }

    /// Path relative to the canonical root, after symlink rewriting.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn absolute(&self) -> &Path {
        &self.absolute
    }
}
