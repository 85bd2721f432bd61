//! # Service Layer
//!
//! Transport-agnostic façade over the session manager and the execution
//! pipeline. [`Core`] wires one of each service around shared stores; an HTTP
//! or CLI front end only ever talks to these types.
//!
//! - [`TemplateService`]: template CRUD plus module, library and startup-file
//!   policy.
//! - [`SessionService`]: session lifecycle, returning durable records.
//! - [`ExecutionService`]: REPL and run-file with the template's output limits
//!   checked after the run.
//! - [`Core::runtime_summary`]: which sessions are live in this process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{LimitsConfig, TemplateSettings, decode_blob};
use crate::error::VmError;
use crate::execution::ExecutionPipeline;
use crate::models::{
    Execution, ExecutionEvent, ExecutionId, SessionId, SessionRecord, SessionStatus, StartupFile,
    Template, TemplateId,
};
use crate::modules;
use crate::session::{self, SessionManager};
use crate::store::{ExecutionStore, LibrarySource, SessionStore, StoreError, TemplateStore, TemplateWriter};

pub const DEFAULT_ENGINE: &str = crate::runtime::ENGINE;

fn template_error(id: &TemplateId, context: &'static str) -> impl FnOnce(StoreError) -> VmError {
    let id = id.to_string();
    move |e| {
        if e.is_not_found() {
            VmError::TemplateNotFound { id }
        } else {
            VmError::Persistence { context, source: e }
        }
    }
}

fn session_error(id: &SessionId, context: &'static str) -> impl FnOnce(StoreError) -> VmError {
    let id = id.to_string();
    move |e| {
        if e.is_not_found() {
            VmError::SessionNotFound { id }
        } else {
            VmError::Persistence { context, source: e }
        }
    }
}

/// Template CRUD and policy.
pub struct TemplateService {
    store: Arc<dyn TemplateWriter>,
}

impl TemplateService {
    pub fn new(store: Arc<dyn TemplateWriter>) -> Self {
        Self { store }
    }

    /// Create an active template with the stock settings. `engine` defaults
    /// to `boa`.
    pub fn create(&self, name: &str, engine: Option<&str>) -> Result<Template, VmError> {
        let now = SystemTime::now();
        let template = Template {
            id: TemplateId::new(),
            name: name.to_string(),
            engine: engine
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .unwrap_or(DEFAULT_ENGINE)
                .to_string(),
            is_active: true,
            exposed_modules: Vec::new(),
            libraries: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store
            .create_template(&template)
            .map_err(VmError::persistence("failed to create template"))?;
        self.set_settings(&template.id, &TemplateSettings::defaults())?;

        info!(template_id = %template.id, name, "template created");
        Ok(template)
    }

    pub fn get(&self, id: &TemplateId) -> Result<Template, VmError> {
        self.store
            .get_template(id)
            .map_err(template_error(id, "failed to load template"))
    }

    pub fn list(&self) -> Result<Vec<Template>, VmError> {
        self.store
            .list_templates()
            .map_err(VmError::persistence("failed to list templates"))
    }

    pub fn get_settings(&self, id: &TemplateId) -> Result<TemplateSettings, VmError> {
        let record = self
            .store
            .get_settings(id)
            .map_err(template_error(id, "failed to load template settings"))?;
        TemplateSettings::decode(&record)
    }

    pub fn set_settings(&self, id: &TemplateId, settings: &TemplateSettings) -> Result<(), VmError> {
        let record = settings.to_record(id)?;
        self.store
            .set_settings(&record)
            .map_err(template_error(id, "failed to store template settings"))
    }

    pub fn list_modules(&self, id: &TemplateId) -> Result<Vec<String>, VmError> {
        Ok(self.get(id)?.exposed_modules)
    }

    /// Add a native module to the template's allowlist. Adding a module that
    /// is already listed is a no-op.
    pub fn add_module(&self, id: &TemplateId, name: &str) -> Result<(), VmError> {
        let name = modules::validate_configured_module_name(name)?;
        let mut template = self.get(id)?;
        if template.exposed_modules.contains(&name) {
            return Ok(());
        }
        template.exposed_modules.push(name);
        self.update(template)
    }

    pub fn remove_module(&self, id: &TemplateId, name: &str) -> Result<(), VmError> {
        let mut template = self.get(id)?;
        let before = template.exposed_modules.len();
        template.exposed_modules.retain(|m| m != name);
        if template.exposed_modules.len() == before {
            return Ok(());
        }
        self.update(template)
    }

    pub fn list_libraries(&self, id: &TemplateId) -> Result<Vec<String>, VmError> {
        Ok(self.get(id)?.libraries)
    }

    pub fn add_library(&self, id: &TemplateId, name: &str) -> Result<(), VmError> {
        let mut template = self.get(id)?;
        if template.libraries.iter().any(|l| l == name) {
            return Ok(());
        }
        template.libraries.push(name.to_string());
        self.update(template)
    }

    pub fn remove_library(&self, id: &TemplateId, name: &str) -> Result<(), VmError> {
        let mut template = self.get(id)?;
        let before = template.libraries.len();
        template.libraries.retain(|l| l != name);
        if template.libraries.len() == before {
            return Ok(());
        }
        self.update(template)
    }

    /// Register a startup file. The mode is trimmed and lowercased; empty
    /// means `eval`, and `eval` is the only supported mode.
    pub fn add_startup_file(
        &self,
        id: &TemplateId,
        path: &str,
        order_index: i64,
        mode: &str,
    ) -> Result<StartupFile, VmError> {
        let mode = match mode.trim().to_lowercase().as_str() {
            "" | "eval" => "eval".to_string(),
            other => {
                return Err(VmError::StartupModeUnsupported {
                    mode: other.to_string(),
                });
            }
        };
        self.get(id)?;

        let file = StartupFile {
            id: uuid::Uuid::new_v4().to_string(),
            template_id: id.clone(),
            path: path.to_string(),
            order_index,
            mode,
        };
        self.store
            .add_startup_file(&file)
            .map_err(template_error(id, "failed to add startup file"))?;
        Ok(file)
    }

    pub fn list_startup_files(&self, id: &TemplateId) -> Result<Vec<StartupFile>, VmError> {
        self.store
            .list_startup_files(id)
            .map_err(template_error(id, "failed to list startup files"))
    }

    fn update(&self, mut template: Template) -> Result<(), VmError> {
        template.updated_at = SystemTime::now();
        let id = template.id.clone();
        self.store
            .update_template(&template)
            .map_err(template_error(&id, "failed to update template"))
    }
}

/// Input for [`SessionService::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionInput {
    pub template_id: TemplateId,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(default)]
    pub base_commit_ref: String,
    pub worktree_path: PathBuf,
}

/// Session lifecycle. Reads go to the durable store; the manager keeps the
/// in-memory view.
pub struct SessionService {
    manager: Arc<SessionManager>,
    store: Arc<dyn SessionStore>,
}

impl SessionService {
    pub fn new(manager: Arc<SessionManager>, store: Arc<dyn SessionStore>) -> Self {
        Self { manager, store }
    }

    pub fn create(&self, input: &CreateSessionInput) -> Result<SessionRecord, VmError> {
        let session = self.manager.create_session(
            &input.template_id,
            &input.workspace_id,
            &input.base_commit_ref,
            &input.worktree_path,
        )?;
        self.get(session.id())
    }

    pub fn get(&self, id: &SessionId) -> Result<SessionRecord, VmError> {
        self.store
            .get_session(id)
            .map_err(session_error(id, "failed to load session"))
    }

    pub fn list(&self, status: Option<SessionStatus>) -> Result<Vec<SessionRecord>, VmError> {
        self.store
            .list_sessions(status)
            .map_err(VmError::persistence("failed to list sessions"))
    }

    pub fn close(&self, id: &SessionId) -> Result<SessionRecord, VmError> {
        self.manager.close_session(id)?;
        self.get(id)
    }
}

/// Input for [`ExecutionService::execute_run_file`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFileInput {
    pub session_id: SessionId,
    pub path: String,
    #[serde(default)]
    pub args: Option<Value>,
    #[serde(default)]
    pub env: Option<Value>,
}

/// REPL and run-file, plus output limit checks.
///
/// Limits are checked after the execution completes, against what was
/// recorded: more events than `max_events` or more payload bytes than
/// `max_output_kb` fails the call with `OutputLimitExceeded`. The execution
/// and its events stay stored. A zero limit disables that check.
pub struct ExecutionService {
    pipeline: Arc<ExecutionPipeline>,
    sessions: Arc<dyn SessionStore>,
    templates: Arc<dyn TemplateStore>,
}

impl ExecutionService {
    pub fn new(
        pipeline: Arc<ExecutionPipeline>,
        sessions: Arc<dyn SessionStore>,
        templates: Arc<dyn TemplateStore>,
    ) -> Self {
        Self {
            pipeline,
            sessions,
            templates,
        }
    }

    pub fn execute_repl(&self, session_id: &SessionId, input: &str) -> Result<Execution, VmError> {
        let execution = self.pipeline.execute_repl(session_id, input)?;
        self.enforce_limits(&execution)?;
        Ok(execution)
    }

    pub fn execute_run_file(&self, input: &RunFileInput) -> Result<Execution, VmError> {
        let execution = self.pipeline.execute_run_file(
            &input.session_id,
            &input.path,
            input.args.clone(),
            input.env.clone(),
        )?;
        self.enforce_limits(&execution)?;
        Ok(execution)
    }

    pub fn get(&self, id: &ExecutionId) -> Result<Execution, VmError> {
        self.pipeline.get_execution(id)
    }

    pub fn list(&self, session_id: &SessionId, limit: usize) -> Result<Vec<Execution>, VmError> {
        self.pipeline.list_executions(session_id, limit)
    }

    pub fn events(&self, id: &ExecutionId, after_seq: u64) -> Result<Vec<ExecutionEvent>, VmError> {
        self.pipeline.get_events(id, after_seq)
    }

    fn enforce_limits(&self, execution: &Execution) -> Result<(), VmError> {
        let Some(limits) = self.limits_for(&execution.session_id) else {
            return Ok(());
        };
        let events = match self.pipeline.get_events(&execution.id, 0) {
            Ok(events) => events,
            Err(e) => {
                debug!(execution_id = %execution.id, error = %e, "skipping limit checks");
                return Ok(());
            }
        };
        check_limits(&limits, &events)
    }

    /// Limits of the session's template. Missing records skip enforcement.
    fn limits_for(&self, session_id: &SessionId) -> Option<LimitsConfig> {
        let session = self.sessions.get_session(session_id).ok()?;
        let settings = self.templates.get_settings(&session.template_id).ok()?;
        match decode_blob::<LimitsConfig>("limits", &settings.limits) {
            Ok(limits) => Some(limits),
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "skipping limit checks");
                None
            }
        }
    }
}

pub fn check_limits(limits: &LimitsConfig, events: &[ExecutionEvent]) -> Result<(), VmError> {
    let count = events.len() as u64;
    if limits.max_events > 0 && count > limits.max_events {
        return Err(VmError::OutputLimitExceeded {
            detail: format!("{count} events exceeds max_events {}", limits.max_events),
        });
    }

    if limits.max_output_kb > 0 {
        let bytes: u64 = events
            .iter()
            .map(|e| e.payload.to_string().len() as u64)
            .sum();
        if bytes > limits.max_output_kb * 1024 {
            return Err(VmError::OutputLimitExceeded {
                detail: format!(
                    "{bytes} payload bytes exceeds max_output_kb {}",
                    limits.max_output_kb
                ),
            });
        }
    }
    Ok(())
}

/// Live sessions in this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSummary {
    pub active_sessions: usize,
    pub active_session_ids: Vec<SessionId>,
}

/// All services over one set of stores.
pub struct Core {
    pub templates: TemplateService,
    pub sessions: SessionService,
    pub executions: ExecutionService,
    manager: Arc<SessionManager>,
}

impl Core {
    pub fn new<S>(store: Arc<S>, libraries: Arc<dyn LibrarySource>) -> Self
    where
        S: TemplateWriter + SessionStore + ExecutionStore + 'static,
    {
        let template_store: Arc<dyn TemplateStore> = store.clone();
        let session_store: Arc<dyn SessionStore> = store.clone();
        let execution_store: Arc<dyn ExecutionStore> = store.clone();
        let template_writer: Arc<dyn TemplateWriter> = store;

        let manager = Arc::new(SessionManager::new(
            template_store.clone(),
            session_store.clone(),
            libraries,
        ));
        let pipeline = Arc::new(ExecutionPipeline::new(manager.clone(), execution_store));

        Self {
            templates: TemplateService::new(template_writer),
            sessions: SessionService::new(manager.clone(), session_store.clone()),
            executions: ExecutionService::new(pipeline, session_store, template_store),
            manager,
        }
    }

    /// Close sessions left over from a previous process, then build the
    /// services.
    pub fn bootstrap<S>(store: Arc<S>, libraries: Arc<dyn LibrarySource>) -> Result<Self, VmError>
    where
        S: TemplateWriter + SessionStore + ExecutionStore + 'static,
    {
        session::close_stale_sessions(&*store)?;
        Ok(Self::new(store, libraries))
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    pub fn runtime_summary(&self) -> RuntimeSummary {
        let mut ids: Vec<SessionId> = self
            .manager
            .list_sessions()
            .iter()
            .map(|s| s.id().clone())
            .collect();
        ids.sort();
        RuntimeSummary {
            active_sessions: ids.len(),
            active_session_ids: ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;
    use serde_json::json;

    fn events(payloads: &[Value]) -> Vec<ExecutionEvent> {
        let id = ExecutionId::new();
        payloads
            .iter()
            .enumerate()
            .map(|(i, p)| ExecutionEvent {
                execution_id: id.clone(),
                seq: i as u64 + 1,
                ts: SystemTime::now(),
                event_type: EventType::Console,
                payload: p.clone(),
            })
            .collect()
    }

    #[test]
    fn test_check_limits_event_count() {
        let limits = LimitsConfig {
            max_events: 2,
            ..LimitsConfig::default()
        };
        assert!(check_limits(&limits, &events(&[json!(1), json!(2)])).is_ok());
        let err = check_limits(&limits, &events(&[json!(1), json!(2), json!(3)])).unwrap_err();
        assert_eq!(err.code(), "OUTPUT_LIMIT_EXCEEDED");
    }

    #[test]
    fn test_check_limits_output_bytes() {
        let limits = LimitsConfig {
            max_output_kb: 1,
            ..LimitsConfig::default()
        };
        let big = json!({"text": "x".repeat(1100)});
        let err = check_limits(&limits, &events(&[big])).unwrap_err();
        assert!(err.to_string().contains("max_output_kb"));
    }

    #[test]
    fn test_zero_limits_disable_checks() {
        let limits = LimitsConfig {
            max_events: 0,
            max_output_kb: 0,
            ..LimitsConfig::default()
        };
        let many: Vec<Value> = (0..10).map(|i| json!(i)).collect();
        assert!(check_limits(&limits, &events(&many)).is_ok());
    }
}
