//! The `VmError` taxonomy shared by the session manager, the execution
//! pipeline and the service layer.
//!
//! Script failures inside an execution are not errors here: they finish the
//! execution with `status = error`. Everything in this enum is a failure of the
//! call itself.

use std::io;

use crate::models::{IdError, SessionStatus};
use crate::sandbox::SandboxError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("template not found: {id}")]
    TemplateNotFound { id: String },

    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    #[error("execution not found: {id}")]
    ExecutionNotFound { id: String },

    #[error("session not ready: {id} is {status}")]
    SessionNotReady { id: String, status: SessionStatus },

    #[error("session busy: {id} is already running an execution")]
    SessionBusy { id: String },

    #[error("path traversal is not allowed: {path}")]
    PathTraversal {
        path: String,
        #[source]
        source: SandboxError,
    },

    #[error("startup mode is not supported: {mode}")]
    StartupModeUnsupported { mode: String },

    #[error("module not allowed: {reason}")]
    ModuleNotAllowed { reason: String },

    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("import resolution failed: {specifier}")]
    ImportResolutionFailed { specifier: String },

    #[error("failed to execute startup file {path}: {message}")]
    StartupFailed { path: String, message: String },

    /// Reserved. Nothing in this crate enforces a deadline.
    #[error("execution timeout")]
    ExecutionTimeout,

    #[error("output limit exceeded: {detail}")]
    OutputLimitExceeded { detail: String },

    #[error("internal runtime error: {0}")]
    InternalRuntime(String),

    #[error("library {name} not available: {source}")]
    LibraryUnavailable {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to load library {name}: {message}")]
    LibraryLoadFailed { name: String, message: String },

    #[error("invalid worktree: {0}")]
    InvalidWorktree(#[source] SandboxError),

    #[error("invalid {field} config: {source}")]
    InvalidConfig {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported engine: {engine}")]
    UnsupportedEngine { engine: String },

    #[error(transparent)]
    InvalidId(#[from] IdError),

    #[error("{context}: {source}")]
    Persistence {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VmError {
    /// Stable machine-readable code for transports.
    pub fn code(&self) -> &'static str {
        match self {
            VmError::TemplateNotFound { .. } => "TEMPLATE_NOT_FOUND",
            VmError::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            VmError::ExecutionNotFound { .. } => "EXECUTION_NOT_FOUND",
            VmError::SessionNotReady { .. } => "SESSION_NOT_READY",
            VmError::SessionBusy { .. } => "SESSION_BUSY",
            VmError::PathTraversal { .. } => "PATH_TRAVERSAL",
            VmError::StartupModeUnsupported { .. } => "STARTUP_MODE_UNSUPPORTED",
            VmError::ModuleNotAllowed { .. } => "MODULE_NOT_ALLOWED",
            VmError::FileNotFound { .. } => "FILE_NOT_FOUND",
            VmError::ImportResolutionFailed { .. } => "IMPORT_RESOLUTION_FAILED",
            VmError::StartupFailed { .. } => "STARTUP_FAILED",
            VmError::ExecutionTimeout => "EXECUTION_TIMEOUT",
            VmError::OutputLimitExceeded { .. } => "OUTPUT_LIMIT_EXCEEDED",
            VmError::InternalRuntime(_) => "INTERNAL_VM_ERROR",
            VmError::LibraryUnavailable { .. } => "LIBRARY_UNAVAILABLE",
            VmError::LibraryLoadFailed { .. } => "LIBRARY_LOAD_FAILED",
            VmError::InvalidWorktree(_) => "INVALID_WORKTREE",
            VmError::InvalidConfig { .. } => "INVALID_CONFIG",
            VmError::UnsupportedEngine { .. } => "UNSUPPORTED_ENGINE",
            VmError::InvalidId(_) => "INVALID_ID",
            VmError::Persistence { .. } => "PERSISTENCE_FAILED",
            VmError::Io(_) => "IO_ERROR",
        }
    }

    pub(crate) fn persistence(context: &'static str) -> impl FnOnce(StoreError) -> VmError {
        move |source| VmError::Persistence { context, source }
    }

    /// Classify a sandbox failure for `path`: escapes become
    /// [`VmError::PathTraversal`], anything else a plain I/O-flavoured error.
    pub(crate) fn from_sandbox(path: &str, source: SandboxError) -> VmError {
        match source {
            source if source.is_traversal() => VmError::PathTraversal {
                path: path.to_string(),
                source,
            },
            SandboxError::ResolveFailed { source, .. } => VmError::Io(source),
            other => VmError::InvalidWorktree(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(VmError::SessionBusy { id: "s".into() }.code(), "SESSION_BUSY");
        assert_eq!(VmError::ExecutionTimeout.code(), "EXECUTION_TIMEOUT");
        assert_eq!(VmError::InternalRuntime("x".into()).code(), "INTERNAL_VM_ERROR");
    }

    #[test]
    fn test_sandbox_traversal_keeps_source() {
        let err = VmError::from_sandbox(
            "../x",
            SandboxError::TraversalRelativePath {
                path: "../x".to_string(),
            },
        );
        assert_eq!(err.code(), "PATH_TRAVERSAL");
        assert!(err.to_string().contains("../x"));
        let source = err.source().expect("sandbox source kept");
        assert!(source.to_string().contains("path traversal"));
    }

    #[test]
    fn test_persistence_message_prefix() {
        let err = VmError::persistence("failed to persist event")(StoreError::Backend(
            "disk full".to_string(),
        ));
        assert_eq!(err.to_string(), "failed to persist event: storage backend error: disk full");
    }
}
