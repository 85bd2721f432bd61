//! # Session Manager
//!
//! Owns the in-memory table of live sessions. Creating a session builds a
//! dedicated script runtime, enables the template's native modules, loads its
//! libraries and runs its startup files before the session becomes `ready`.
//!
//! ## Lifecycle
//!
//! `starting -> ready` on success, `starting -> crashed` when any setup step
//! fails, `ready -> closed` on explicit close. The edges are enforced by a
//! [`StateMachine`]; nothing else is reachable.
//!
//! A session is inserted into the table right before its startup files run,
//! so concurrent readers can see it while it is still `starting`. A startup
//! failure leaves the crashed session in the table until it is closed.
//! Failures before that point (runtime, modules, libraries) are persisted as
//! crashed but never become visible in memory, and a session whose `ready`
//! record cannot be written is removed again.

mod gc;
mod startup;

pub use gc::{SESSION_STARTUP_GC_MESSAGE, close_stale_sessions};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::time::SystemTime;

use tracing::{info, warn};
use vmsys_common::{Lifecycle, StateMachine};

use crate::config::TemplateSettings;
use crate::error::VmError;
use crate::models::{SessionId, SessionRecord, SessionStatus, Template, TemplateId, TemplateSettingsRecord};
use crate::modules;
use crate::runtime::{ENGINE, ScriptRuntime, console};
use crate::sandbox::WorktreeRoot;
use crate::store::{LibrarySource, SessionStore, TemplateStore};

impl Lifecycle for SessionStatus {
    fn can_transition(from: Self, to: Self) -> bool {
        matches!(
            (from, to),
            (SessionStatus::Starting, SessionStatus::Ready)
                | (SessionStatus::Starting, SessionStatus::Crashed)
                | (SessionStatus::Ready, SessionStatus::Closed)
        )
    }
}

/// A live session and its runtime.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    template_id: TemplateId,
    workspace_id: String,
    base_commit_ref: String,
    worktree_path: PathBuf,
    worktree: WorktreeRoot,
    status: StateMachine<SessionStatus>,
    runtime: Mutex<ScriptRuntime>,
    created_at: SystemTime,
    last_error: Mutex<Option<String>>,
}

/// Exclusive access to a session's runtime. Dropping it releases the
/// session's execution lock.
pub struct RuntimeGuard<'a> {
    runtime: MutexGuard<'a, ScriptRuntime>,
}

impl RuntimeGuard<'_> {
    pub fn runtime(&self) -> &ScriptRuntime {
        &self.runtime
    }
}

impl Session {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn template_id(&self) -> &TemplateId {
        &self.template_id
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn base_commit_ref(&self) -> &str {
        &self.base_commit_ref
    }

    /// The worktree path as supplied by the caller.
    pub fn worktree_path(&self) -> &Path {
        &self.worktree_path
    }

    pub fn worktree(&self) -> &WorktreeRoot {
        &self.worktree
    }

    pub fn status(&self) -> SessionStatus {
        self.status.current()
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take the execution lock without waiting.
    ///
    /// Fails with `SessionNotReady` unless the session is `ready`, and with
    /// `SessionBusy` while another execution holds the lock.
    pub fn try_lock_runtime(&self) -> Result<RuntimeGuard<'_>, VmError> {
        let status = self.status();
        if status != SessionStatus::Ready {
            return Err(VmError::SessionNotReady {
                id: self.id.to_string(),
                status,
            });
        }

        let runtime = match self.runtime.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(VmError::SessionBusy {
                    id: self.id.to_string(),
                });
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        Ok(RuntimeGuard { runtime })
    }

    fn lock_runtime(&self) -> MutexGuard<'_, ScriptRuntime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, to: SessionStatus) -> Result<SessionStatus, VmError> {
        self.status
            .try_transition(to)
            .map_err(|e| VmError::InternalRuntime(format!("session {}: {e}", self.id)))
    }

    fn set_last_error(&self, message: String) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }
}

/// Creates, tracks and closes sessions.
pub struct SessionManager {
    templates: Arc<dyn TemplateStore>,
    store: Arc<dyn SessionStore>,
    libraries: Arc<dyn LibrarySource>,
    active: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        store: Arc<dyn SessionStore>,
        libraries: Arc<dyn LibrarySource>,
    ) -> Self {
        Self {
            templates,
            store,
            libraries,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Build a session from `template_id` bound to `worktree_path`.
    pub fn create_session(
        &self,
        template_id: &TemplateId,
        workspace_id: &str,
        base_commit_ref: &str,
        worktree_path: impl AsRef<Path>,
    ) -> Result<Arc<Session>, VmError> {
        let worktree_path = worktree_path.as_ref();

        let template = self.templates.get_template(template_id).map_err(|e| {
            if e.is_not_found() {
                VmError::TemplateNotFound {
                    id: template_id.to_string(),
                }
            } else {
                VmError::Persistence {
                    context: "failed to load template",
                    source: e,
                }
            }
        })?;
        let settings = match self.templates.get_settings(template_id) {
            Ok(settings) => settings,
            Err(e) if e.is_not_found() => TemplateSettingsRecord {
                template_id: template_id.clone(),
                limits: serde_json::Value::Null,
                resolver: serde_json::Value::Null,
                runtime: serde_json::Value::Null,
            },
            Err(e) => return Err(VmError::persistence("failed to load template settings")(e)),
        };

        if !template.engine.eq_ignore_ascii_case(ENGINE) {
            return Err(VmError::UnsupportedEngine {
                engine: template.engine.clone(),
            });
        }

        let worktree = WorktreeRoot::new(worktree_path).map_err(VmError::InvalidWorktree)?;

        let mut record = SessionRecord {
            id: SessionId::new(),
            template_id: template_id.clone(),
            workspace_id: workspace_id.to_string(),
            base_commit_ref: base_commit_ref.to_string(),
            worktree_path: worktree_path.to_string_lossy().into_owned(),
            status: SessionStatus::Starting,
            created_at: SystemTime::now(),
            closed_at: None,
            last_error: None,
            runtime_meta: None,
        };
        self.store
            .create_session(&record)
            .map_err(VmError::persistence("failed to create session"))?;

        let runtime = match self.prepare_runtime(&record.id, &template, &settings, &worktree) {
            Ok(runtime) => runtime,
            Err(err) => {
                record.status = SessionStatus::Crashed;
                record.last_error = Some(format!("startup failed: {err}"));
                self.persist_best_effort(&record);
                warn!(session_id = %record.id, template_id = %template_id, error = %err, "session setup failed");
                return Err(err);
            }
        };

        let session = Arc::new(Session {
            id: record.id.clone(),
            template_id: template_id.clone(),
            workspace_id: record.workspace_id.clone(),
            base_commit_ref: record.base_commit_ref.clone(),
            worktree_path: worktree_path.to_path_buf(),
            worktree,
            status: StateMachine::new(SessionStatus::Starting),
            runtime: Mutex::new(runtime),
            created_at: record.created_at,
            last_error: Mutex::new(None),
        });

        self.write_table().insert(session.id.clone(), session.clone());

        if let Err(err) = self.run_startup(&session) {
            let message = format!("startup failed: {err}");
            session.transition(SessionStatus::Crashed)?;
            session.set_last_error(message.clone());
            record.status = SessionStatus::Crashed;
            record.last_error = Some(message);
            self.persist_best_effort(&record);
            warn!(session_id = %session.id, template_id = %template_id, error = %err, "session startup failed");
            return Err(err);
        }

        // Held until `ready` is durable so a concurrent close sees either
        // `starting` or the persisted `ready`.
        let mut table = self.write_table();
        if !table.contains_key(&session.id) {
            return Err(VmError::SessionNotFound {
                id: session.id.to_string(),
            });
        }
        session.transition(SessionStatus::Ready)?;
        record.status = SessionStatus::Ready;
        if let Err(e) = self.store.update_session(&record) {
            // Durable record still says `starting`.
            table.remove(&session.id);
            return Err(VmError::persistence("failed to update session status")(e));
        }
        drop(table);

        info!(session_id = %session.id, template_id = %template_id, "session ready");
        Ok(session)
    }

    /// In-memory lookup.
    pub fn get_session(&self, id: &SessionId) -> Result<Arc<Session>, VmError> {
        self.read_table()
            .get(id)
            .cloned()
            .ok_or_else(|| VmError::SessionNotFound { id: id.to_string() })
    }

    /// Snapshot of every session in the table, crashed ones included.
    pub fn list_sessions(&self) -> Vec<Arc<Session>> {
        self.read_table().values().cloned().collect()
    }

    /// Remove a session from the table and record the close.
    ///
    /// A `ready` session moves to `closed`. A `crashed` one keeps its status
    /// in the durable record, which only gains `closed_at`. A session still
    /// running startup is rejected with `SessionNotReady` and stays in the
    /// table.
    pub fn close_session(&self, id: &SessionId) -> Result<(), VmError> {
        let session = {
            let mut table = self.write_table();
            let status = table
                .get(id)
                .map(|s| s.status())
                .ok_or_else(|| VmError::SessionNotFound { id: id.to_string() })?;
            if status == SessionStatus::Starting {
                return Err(VmError::SessionNotReady {
                    id: id.to_string(),
                    status,
                });
            }
            table
                .remove(id)
                .ok_or_else(|| VmError::SessionNotFound { id: id.to_string() })?
        };

        let mut record = self
            .store
            .get_session(id)
            .map_err(VmError::persistence("failed to load session"))?;

        if session.transition(SessionStatus::Closed).is_ok() {
            record.status = SessionStatus::Closed;
        }
        record.closed_at = Some(SystemTime::now());
        self.store
            .update_session(&record)
            .map_err(VmError::persistence("failed to close session"))?;

        info!(session_id = %id, status = %record.status, "session closed");
        Ok(())
    }

    fn prepare_runtime(
        &self,
        id: &SessionId,
        template: &Template,
        settings: &TemplateSettingsRecord,
        worktree: &WorktreeRoot,
    ) -> Result<ScriptRuntime, VmError> {
        let runtime = ScriptRuntime::spawn(id, worktree.clone())?;
        let settings = TemplateSettings::decode(settings)?;

        let configured = template.exposed_modules.clone();
        runtime.run(move |context| modules::enable_configured_modules(context, configured.as_slice()))??;

        if settings.runtime.console {
            runtime
                .run(|context| console::install(context).map_err(|e| e.to_string()))?
                .map_err(|e| VmError::InternalRuntime(format!("failed to install console: {e}")))?;
        }

        for name in &template.libraries {
            let source = self
                .libraries
                .load(name)
                .map_err(|source| VmError::LibraryUnavailable {
                    name: name.clone(),
                    source,
                })?;
            let source = String::from_utf8_lossy(&source).into_owned();
            runtime
                .eval(source)?
                .map_err(|exception| VmError::LibraryLoadFailed {
                    name: name.clone(),
                    message: exception.message,
                })?;
            info!(session_id = %id, template_id = %template.id, library = %name, "loaded library into runtime session");
        }

        Ok(runtime)
    }

    fn run_startup(&self, session: &Session) -> Result<(), VmError> {
        let files = self
            .templates
            .list_startup_files(&session.template_id)
            .map_err(VmError::persistence("failed to list startup files"))?;
        let runtime = session.lock_runtime();
        startup::run_startup_files(&runtime, &session.worktree, files)
    }

    fn persist_best_effort(&self, record: &SessionRecord) {
        if let Err(e) = self.store.update_session(record) {
            warn!(session_id = %record.id, error = %e, "failed to persist session state");
        }
    }

    fn read_table(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.active.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_edges() {
        use SessionStatus::*;
        let allowed = [(Starting, Ready), (Starting, Crashed), (Ready, Closed)];
        for from in [Starting, Ready, Crashed, Closed] {
            for to in [Starting, Ready, Crashed, Closed] {
                assert_eq!(
                    SessionStatus::can_transition(from, to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }
}
