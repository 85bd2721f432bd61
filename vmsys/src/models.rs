//! Records, status enums, event payloads and typed identifiers.
//!
//! Records are plain serde structs. Template settings keep their three
//! configuration blobs as opaque JSON; `crate::config` decodes them at the
//! point of use.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::SystemTime;

use uuid::Uuid;

/// Rejected identifier input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id: {reason}")]
pub struct IdError {
    pub kind: &'static str,
    pub reason: String,
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// A fresh random (v4) identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Trim and validate `raw` as a UUID, returning its canonical
            /// hyphenated lowercase form.
            pub fn parse(raw: &str) -> Result<Self, IdError> {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(IdError {
                        kind: $kind,
                        reason: "empty".to_string(),
                    });
                }
                Uuid::parse_str(trimmed)
                    .map(|uuid| Self(uuid.to_string()))
                    .map_err(|e| IdError {
                        kind: $kind,
                        reason: e.to_string(),
                    })
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(
    /// Identifier of a [`Template`].
    TemplateId,
    "template"
);
typed_id!(
    /// Identifier of a session, shared by the live session and its record.
    SessionId,
    "session"
);
typed_id!(
    /// Identifier of an [`Execution`].
    ExecutionId,
    "execution"
);

/// A named configuration bundle sessions are created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    /// Must be `boa` for a session to be created from the template.
    pub engine: String,
    pub is_active: bool,
    #[serde(default)]
    pub exposed_modules: Vec<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(with = "crate::utils::time")]
    pub created_at: SystemTime,
    #[serde(with = "crate::utils::time")]
    pub updated_at: SystemTime,
}

/// Raw settings blobs of a template. See [`crate::config::TemplateSettings`]
/// for the decoded form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSettingsRecord {
    pub template_id: TemplateId,
    #[serde(default)]
    pub limits: Value,
    #[serde(default)]
    pub resolver: Value,
    #[serde(default)]
    pub runtime: Value,
}

/// A script run once during session construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupFile {
    pub id: String,
    pub template_id: TemplateId,
    /// Worktree-relative path.
    pub path: String,
    pub order_index: i64,
    /// `eval` (or empty). Anything else is rejected at startup.
    #[serde(default)]
    pub mode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Ready,
    Crashed,
    Closed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Starting => "starting",
            SessionStatus::Ready => "ready",
            SessionStatus::Crashed => "crashed",
            SessionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub template_id: TemplateId,
    pub workspace_id: String,
    pub base_commit_ref: String,
    pub worktree_path: String,
    pub status: SessionStatus,
    #[serde(with = "crate::utils::time")]
    pub created_at: SystemTime,
    #[serde(
        with = "crate::utils::time::option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub closed_at: Option<SystemTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_meta: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    Startup,
    RunFile,
    Repl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Ok,
    Error,
    /// Reserved; never produced by the pipeline.
    Timeout,
    /// Reserved; never produced by the pipeline.
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

/// One REPL snippet or file run.
///
/// `result` is set only when `status` is `ok`, `error` only when it is `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub session_id: SessionId,
    pub kind: ExecutionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub args: Value,
    pub env: Value,
    pub status: ExecutionStatus,
    #[serde(with = "crate::utils::time")]
    pub started_at: SystemTime,
    #[serde(
        with = "crate::utils::time::option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ended_at: Option<SystemTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    pub metrics: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Stdout,
    Stderr,
    Console,
    Value,
    Exception,
    System,
    InputEcho,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub execution_id: ExecutionId,
    pub seq: u64,
    #[serde(with = "crate::utils::time")]
    pub ts: SystemTime,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

impl ConsoleLevel {
    pub const ALL: [ConsoleLevel; 5] = [
        ConsoleLevel::Log,
        ConsoleLevel::Info,
        ConsoleLevel::Warn,
        ConsoleLevel::Error,
        ConsoleLevel::Debug,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Error => "error",
            ConsoleLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolePayload {
    pub level: ConsoleLevel,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEchoPayload {
    pub text: String,
}

/// Describes a successfully evaluated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuePayload {
    /// JavaScript `typeof`, with `"null"` for null.
    #[serde(rename = "type")]
    pub type_name: String,
    pub preview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemPayload {
    pub message: String,
    pub level: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_parse_normalizes_case_and_whitespace() {
        let id = SessionId::parse("  6F9619FF-8B86-D011-B42D-00C04FC964FF ").unwrap();
        assert_eq!(id.as_str(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");
    }

    #[test]
    fn test_id_parse_rejects_empty_and_garbage() {
        let err = TemplateId::parse("   ").unwrap_err();
        assert_eq!(err.to_string(), "invalid template id: empty");
        assert!(ExecutionId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_new_ids_are_valid_and_distinct() {
        let a = ExecutionId::new();
        let b = ExecutionId::new();
        assert_ne!(a, b);
        assert_eq!(ExecutionId::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn test_status_enums_use_snake_case() {
        assert_eq!(serde_json::to_value(ExecutionKind::RunFile).unwrap(), json!("run_file"));
        assert_eq!(serde_json::to_value(EventType::InputEcho).unwrap(), json!("input_echo"));
        assert_eq!(serde_json::to_value(SessionStatus::Crashed).unwrap(), json!("crashed"));
        assert_eq!(SessionStatus::Ready.to_string(), "ready");
    }

    #[test]
    fn test_value_payload_omits_missing_json() {
        let payload = ValuePayload {
            type_name: "undefined".to_string(),
            preview: "undefined".to_string(),
            json: None,
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"type": "undefined", "preview": "undefined"})
        );
    }

    #[test]
    fn test_execution_status_terminality() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Ok.is_terminal());
        assert!(ExecutionStatus::Error.is_terminal());
    }
}
