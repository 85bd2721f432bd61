//! [`FailingStore`]: a [`MemoryStore`] that fails chosen writes on demand.

use std::sync::Mutex;

use crate::models::{
    EventType, Execution, ExecutionEvent, ExecutionId, SessionId, SessionRecord, SessionStatus,
    StartupFile, Template, TemplateId, TemplateSettingsRecord,
};
use crate::store::{
    ExecutionStore, MemoryStore, SessionStore, StoreError, StoreResult, TemplateStore,
    TemplateWriter,
};

/// An operation that [`FailingStore`] rejects while armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    CreateSession,
    UpdateSession,
    CreateExecution,
    UpdateExecution,
    /// Every event with `seq >= n`.
    EventAt(u64),
    EventType(EventType),
    ListEvents,
}

#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    faults: Mutex<Vec<Fault>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, fault: Fault) -> Self {
        self.arm(fault);
        self
    }

    /// Arm a fault after setup, e.g. once a session is ready.
    pub fn arm(&self, fault: Fault) {
        self.lock().push(fault);
    }

    pub fn disarm_all(&self) {
        self.lock().clear();
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Fault>> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, op: &str, hit: impl Fn(&Fault) -> bool) -> StoreResult<()> {
        if self.lock().iter().any(hit) {
            return Err(StoreError::Backend(format!("injected fault: {op}")));
        }
        Ok(())
    }
}

impl TemplateStore for FailingStore {
    fn get_template(&self, id: &TemplateId) -> StoreResult<Template> {
        self.inner.get_template(id)
    }

    fn get_settings(&self, id: &TemplateId) -> StoreResult<TemplateSettingsRecord> {
        self.inner.get_settings(id)
    }

    fn list_startup_files(&self, id: &TemplateId) -> StoreResult<Vec<StartupFile>> {
        self.inner.list_startup_files(id)
    }
}

impl TemplateWriter for FailingStore {
    fn create_template(&self, template: &Template) -> StoreResult<()> {
        self.inner.create_template(template)
    }

    fn update_template(&self, template: &Template) -> StoreResult<()> {
        self.inner.update_template(template)
    }

    fn list_templates(&self) -> StoreResult<Vec<Template>> {
        self.inner.list_templates()
    }

    fn set_settings(&self, settings: &TemplateSettingsRecord) -> StoreResult<()> {
        self.inner.set_settings(settings)
    }

    fn add_startup_file(&self, file: &StartupFile) -> StoreResult<()> {
        self.inner.add_startup_file(file)
    }
}

impl SessionStore for FailingStore {
    fn create_session(&self, session: &SessionRecord) -> StoreResult<()> {
        self.check("create_session", |f| *f == Fault::CreateSession)?;
        self.inner.create_session(session)
    }

    fn get_session(&self, id: &SessionId) -> StoreResult<SessionRecord> {
        self.inner.get_session(id)
    }

    fn update_session(&self, session: &SessionRecord) -> StoreResult<()> {
        self.check("update_session", |f| *f == Fault::UpdateSession)?;
        self.inner.update_session(session)
    }

    fn list_sessions(&self, status: Option<SessionStatus>) -> StoreResult<Vec<SessionRecord>> {
        self.inner.list_sessions(status)
    }
}

impl ExecutionStore for FailingStore {
    fn create_execution(&self, execution: &Execution) -> StoreResult<()> {
        self.check("create_execution", |f| *f == Fault::CreateExecution)?;
        self.inner.create_execution(execution)
    }

    fn update_execution(&self, execution: &Execution) -> StoreResult<()> {
        self.check("update_execution", |f| *f == Fault::UpdateExecution)?;
        self.inner.update_execution(execution)
    }

    fn get_execution(&self, id: &ExecutionId) -> StoreResult<Execution> {
        self.inner.get_execution(id)
    }

    fn list_executions(&self, session: &SessionId, limit: usize) -> StoreResult<Vec<Execution>> {
        self.inner.list_executions(session, limit)
    }

    fn append_event(&self, event: &ExecutionEvent) -> StoreResult<()> {
        self.check("append_event", |f| match f {
            Fault::EventAt(n) => event.seq >= *n,
            Fault::EventType(t) => *t == event.event_type,
            _ => false,
        })?;
        self.inner.append_event(event)
    }

    fn list_events(&self, execution: &ExecutionId, after_seq: u64) -> StoreResult<Vec<ExecutionEvent>> {
        self.check("list_events", |f| *f == Fault::ListEvents)?;
        self.inner.list_events(execution, after_seq)
    }
}
