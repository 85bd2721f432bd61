use std::path::PathBuf;

/// Errors produced while validating or resolving worktree paths.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("invalid worktree root '{path:?}': {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("worktree root '{path:?}' is not a directory")]
    RootNotDirectory { path: PathBuf },

    #[error("empty relative path")]
    EmptyRelativePath,

    #[error("absolute path '{path}' is not allowed")]
    AbsoluteRelativePath { path: String },

    #[error("path traversal is not allowed: '{path}'")]
    TraversalRelativePath { path: String },

    #[error("resolved path '{path}' escapes worktree root{}", format_root(.root))]
    PathEscapesRoot { path: String, root: PathBuf },

    #[error("failed to resolve '{path}': {source}")]
    ResolveFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SandboxError {
    /// True for the lexical and symlink escape kinds, which callers report as
    /// traversal rather than as plain resolution failures.
    pub fn is_traversal(&self) -> bool {
        matches!(
            self,
            SandboxError::EmptyRelativePath
                | SandboxError::AbsoluteRelativePath { .. }
                | SandboxError::TraversalRelativePath { .. }
                | SandboxError::PathEscapesRoot { .. }
        )
    }
}

fn format_root(root: &std::path::Path) -> String {
    if root.as_os_str().is_empty() {
        String::new()
    } else {
        format!(" '{}'", root.display())
    }
}
