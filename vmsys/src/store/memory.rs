use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    ExecutionStore, SessionStore, StoreError, StoreResult, TemplateStore, TemplateWriter,
};
use crate::models::{
    Execution, ExecutionEvent, ExecutionId, SessionId, SessionRecord, SessionStatus, StartupFile,
    Template, TemplateId, TemplateSettingsRecord,
};

#[derive(Debug, Default)]
struct Tables {
    templates: HashMap<TemplateId, Template>,
    template_order: Vec<TemplateId>,
    settings: HashMap<TemplateId, TemplateSettingsRecord>,
    startup_files: HashMap<TemplateId, Vec<StartupFile>>,
    sessions: HashMap<SessionId, SessionRecord>,
    session_order: Vec<SessionId>,
    executions: HashMap<ExecutionId, Execution>,
    execution_order: Vec<ExecutionId>,
    events: HashMap<ExecutionId, Vec<ExecutionEvent>>,
}

/// Thread-safe in-memory implementation of every record store trait.
///
/// "Newest first" listings follow insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

impl TemplateStore for MemoryStore {
    fn get_template(&self, id: &TemplateId) -> StoreResult<Template> {
        self.read()
            .templates
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("template", id))
    }

    fn get_settings(&self, id: &TemplateId) -> StoreResult<TemplateSettingsRecord> {
        self.read()
            .settings
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("template settings", id))
    }

    fn list_startup_files(&self, id: &TemplateId) -> StoreResult<Vec<StartupFile>> {
        let mut files = self.read().startup_files.get(id).cloned().unwrap_or_default();
        files.sort_by_key(|f| f.order_index);
        Ok(files)
    }
}

impl TemplateWriter for MemoryStore {
    fn create_template(&self, template: &Template) -> StoreResult<()> {
        let mut tables = self.write();
        if tables.templates.contains_key(&template.id) {
            return Err(StoreError::Conflict {
                entity: "template",
                id: template.id.to_string(),
            });
        }
        tables.template_order.push(template.id.clone());
        tables.templates.insert(template.id.clone(), template.clone());
        Ok(())
    }

    fn update_template(&self, template: &Template) -> StoreResult<()> {
        let mut tables = self.write();
        let slot = tables
            .templates
            .get_mut(&template.id)
            .ok_or_else(|| not_found("template", &template.id))?;
        *slot = template.clone();
        Ok(())
    }

    fn list_templates(&self) -> StoreResult<Vec<Template>> {
        let tables = self.read();
        Ok(tables
            .template_order
            .iter()
            .rev()
            .filter_map(|id| tables.templates.get(id).cloned())
            .collect())
    }

    fn set_settings(&self, settings: &TemplateSettingsRecord) -> StoreResult<()> {
        let mut tables = self.write();
        if !tables.templates.contains_key(&settings.template_id) {
            return Err(not_found("template", &settings.template_id));
        }
        tables
            .settings
            .insert(settings.template_id.clone(), settings.clone());
        Ok(())
    }

    fn add_startup_file(&self, file: &StartupFile) -> StoreResult<()> {
        let mut tables = self.write();
        if !tables.templates.contains_key(&file.template_id) {
            return Err(not_found("template", &file.template_id));
        }
        let files = tables.startup_files.entry(file.template_id.clone()).or_default();
        if files.iter().any(|f| f.id == file.id) {
            return Err(StoreError::Conflict {
                entity: "startup file",
                id: file.id.clone(),
            });
        }
        files.push(file.clone());
        Ok(())
    }
}

impl SessionStore for MemoryStore {
    fn create_session(&self, session: &SessionRecord) -> StoreResult<()> {
        let mut tables = self.write();
        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict {
                entity: "session",
                id: session.id.to_string(),
            });
        }
        tables.session_order.push(session.id.clone());
        tables.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn get_session(&self, id: &SessionId) -> StoreResult<SessionRecord> {
        self.read()
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("session", id))
    }

    fn update_session(&self, session: &SessionRecord) -> StoreResult<()> {
        let mut tables = self.write();
        let slot = tables
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| not_found("session", &session.id))?;
        *slot = session.clone();
        Ok(())
    }

    fn list_sessions(&self, status: Option<SessionStatus>) -> StoreResult<Vec<SessionRecord>> {
        let tables = self.read();
        Ok(tables
            .session_order
            .iter()
            .rev()
            .filter_map(|id| tables.sessions.get(id))
            .filter(|s| status.is_none_or(|wanted| s.status == wanted))
            .cloned()
            .collect())
    }
}

impl ExecutionStore for MemoryStore {
    fn create_execution(&self, execution: &Execution) -> StoreResult<()> {
        let mut tables = self.write();
        if tables.executions.contains_key(&execution.id) {
            return Err(StoreError::Conflict {
                entity: "execution",
                id: execution.id.to_string(),
            });
        }
        tables.execution_order.push(execution.id.clone());
        tables.executions.insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    fn update_execution(&self, execution: &Execution) -> StoreResult<()> {
        let mut tables = self.write();
        let slot = tables
            .executions
            .get_mut(&execution.id)
            .ok_or_else(|| not_found("execution", &execution.id))?;
        *slot = execution.clone();
        Ok(())
    }

    fn get_execution(&self, id: &ExecutionId) -> StoreResult<Execution> {
        self.read()
            .executions
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("execution", id))
    }

    fn list_executions(&self, session: &SessionId, limit: usize) -> StoreResult<Vec<Execution>> {
        let tables = self.read();
        Ok(tables
            .execution_order
            .iter()
            .rev()
            .filter_map(|id| tables.executions.get(id))
            .filter(|e| &e.session_id == session)
            .take(limit)
            .cloned()
            .collect())
    }

    fn append_event(&self, event: &ExecutionEvent) -> StoreResult<()> {
        let mut tables = self.write();
        if !tables.executions.contains_key(&event.execution_id) {
            return Err(not_found("execution", &event.execution_id));
        }
        let events = tables.events.entry(event.execution_id.clone()).or_default();
        match events.binary_search_by_key(&event.seq, |e| e.seq) {
            Ok(_) => Err(StoreError::Conflict {
                entity: "execution event",
                id: format!("{}#{}", event.execution_id, event.seq),
            }),
            Err(pos) => {
                events.insert(pos, event.clone());
                Ok(())
            }
        }
    }

    fn list_events(&self, execution: &ExecutionId, after_seq: u64) -> StoreResult<Vec<ExecutionEvent>> {
        let tables = self.read();
        if !tables.executions.contains_key(execution) {
            return Err(not_found("execution", execution));
        }
        Ok(tables
            .events
            .get(execution)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.seq > after_seq)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventType, ExecutionKind, ExecutionStatus};
    use serde_json::json;
    use std::time::SystemTime;

    fn execution(session: &SessionId) -> Execution {
        Execution {
            id: ExecutionId::new(),
            session_id: session.clone(),
            kind: ExecutionKind::Repl,
            input: Some("1".to_string()),
            path: None,
            args: json!([]),
            env: json!({}),
            status: ExecutionStatus::Running,
            started_at: SystemTime::now(),
            ended_at: None,
            result: None,
            error: None,
            metrics: json!({}),
        }
    }

    fn event(execution: &ExecutionId, seq: u64) -> ExecutionEvent {
        ExecutionEvent {
            execution_id: execution.clone(),
            seq,
            ts: SystemTime::now(),
            event_type: EventType::System,
            payload: json!({"seq": seq}),
        }
    }

    #[test]
    fn test_append_event_rejects_duplicate_seq() {
        let store = MemoryStore::new();
        let exec = execution(&SessionId::new());
        store.create_execution(&exec).unwrap();

        store.append_event(&event(&exec.id, 1)).unwrap();
        let err = store.append_event(&event(&exec.id, 1)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn test_list_events_after_seq_is_ascending() {
        let store = MemoryStore::new();
        let exec = execution(&SessionId::new());
        store.create_execution(&exec).unwrap();
        for seq in [3, 1, 2, 4] {
            store.append_event(&event(&exec.id, seq)).unwrap();
        }

        let seqs: Vec<u64> = store
            .list_events(&exec.id, 1)
            .unwrap()
            .iter()
            .map(|e| e.seq)
            .collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[test]
    fn test_list_executions_newest_first_with_limit() {
        let store = MemoryStore::new();
        let session = SessionId::new();
        let first = execution(&session);
        let second = execution(&session);
        let other = execution(&SessionId::new());
        for e in [&first, &second, &other] {
            store.create_execution(e).unwrap();
        }

        let listed = store.list_executions(&session, 10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(store.list_executions(&session, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_records_are_not_found() {
        let store = MemoryStore::new();
        assert!(store.get_template(&TemplateId::new()).unwrap_err().is_not_found());
        assert!(store.get_session(&SessionId::new()).unwrap_err().is_not_found());
        assert!(store.list_events(&ExecutionId::new(), 0).unwrap_err().is_not_found());
        assert!(store.list_startup_files(&TemplateId::new()).unwrap().is_empty());
    }
}
