//! # Storage Port
//!
//! Narrow traits the session manager, execution pipeline and services persist
//! through. Every method is synchronous and every implementation must be
//! `Send + Sync`; callers share stores as `Arc<dyn ...>`.
//!
//! Two adapters ship with the crate: [`MemoryStore`] (all record traits) and
//! [`LibraryCache`] (library sources from a directory).

mod libraries;
mod memory;

pub use libraries::LibraryCache;
pub use memory::MemoryStore;

use crate::models::{
    Execution, ExecutionEvent, ExecutionId, SessionId, SessionRecord, SessionStatus, StartupFile,
    Template, TemplateId, TemplateSettingsRecord,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {id}")]
    Conflict { entity: &'static str, id: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Template reads needed to build a session.
pub trait TemplateStore: Send + Sync {
    fn get_template(&self, id: &TemplateId) -> StoreResult<Template>;
    fn get_settings(&self, id: &TemplateId) -> StoreResult<TemplateSettingsRecord>;
    /// Startup files of a template, ascending by `order_index`.
    fn list_startup_files(&self, id: &TemplateId) -> StoreResult<Vec<StartupFile>>;
}

/// Administrative template writes.
pub trait TemplateWriter: TemplateStore {
    fn create_template(&self, template: &Template) -> StoreResult<()>;
    fn update_template(&self, template: &Template) -> StoreResult<()>;
    fn list_templates(&self) -> StoreResult<Vec<Template>>;
    fn set_settings(&self, settings: &TemplateSettingsRecord) -> StoreResult<()>;
    fn add_startup_file(&self, file: &StartupFile) -> StoreResult<()>;
}

pub trait SessionStore: Send + Sync {
    fn create_session(&self, session: &SessionRecord) -> StoreResult<()>;
    fn get_session(&self, id: &SessionId) -> StoreResult<SessionRecord>;
    fn update_session(&self, session: &SessionRecord) -> StoreResult<()>;
    /// Newest first. `None` lists every status.
    fn list_sessions(&self, status: Option<SessionStatus>) -> StoreResult<Vec<SessionRecord>>;
}

pub trait ExecutionStore: Send + Sync {
    fn create_execution(&self, execution: &Execution) -> StoreResult<()>;
    fn update_execution(&self, execution: &Execution) -> StoreResult<()>;
    fn get_execution(&self, id: &ExecutionId) -> StoreResult<Execution>;
    /// Newest first, at most `limit` entries.
    fn list_executions(&self, session: &SessionId, limit: usize) -> StoreResult<Vec<Execution>>;
    /// Rejects an event whose `(execution_id, seq)` already exists.
    fn append_event(&self, event: &ExecutionEvent) -> StoreResult<()>;
    /// Events with `seq > after_seq`, ascending.
    fn list_events(&self, execution: &ExecutionId, after_seq: u64) -> StoreResult<Vec<ExecutionEvent>>;
}

/// Cached library script sources, by configured library name.
pub trait LibrarySource: Send + Sync {
    fn load(&self, name: &str) -> StoreResult<Vec<u8>>;
}
