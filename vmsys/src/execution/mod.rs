//! # Execution Pipeline
//!
//! Runs one REPL snippet or one worktree file against a ready session.
//!
//! 1. **Acquire**: find the session, require `ready`, take its execution lock
//!    without waiting (`SessionBusy` otherwise).
//! 2. **Record**: create the execution row in `running`.
//! 3. **Setup**: REPL emits `input_echo`; run-file resolves and reads the
//!    file through the path sandbox *before* the row exists, so a rejected
//!    path leaves nothing behind.
//! 4. **Run**: evaluate on the session runtime while console calls are
//!    captured as `console` events.
//! 5. **Outcome**: a `value` event and `ok`, or an `exception` event and
//!    `error`. A failed event write fails the whole call instead.
//!
//! Script errors are a normal outcome. Only infrastructure failures are
//! returned as `Err`.

mod recorder;

pub use recorder::EventRecorder;

use std::sync::Arc;
use std::time::SystemTime;

use boa_engine::JsValue;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::VmError;
use crate::models::{
    ConsolePayload, EventType, ExceptionPayload, Execution, ExecutionEvent, ExecutionId,
    ExecutionKind, ExecutionStatus, InputEchoPayload, SessionId, ValuePayload,
};
use crate::runtime::{self, console, value};
use crate::sandbox::RelWorktreePath;
use crate::session::{Session, SessionManager};
use crate::store::{ExecutionStore, StoreError};

type RunOutcome = Result<ValuePayload, ExceptionPayload>;

/// Executes code in sessions owned by a [`SessionManager`].
pub struct ExecutionPipeline {
    sessions: Arc<SessionManager>,
    store: Arc<dyn ExecutionStore>,
}

impl ExecutionPipeline {
    pub fn new(sessions: Arc<SessionManager>, store: Arc<dyn ExecutionStore>) -> Self {
        Self { sessions, store }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn execute_repl(&self, session_id: &SessionId, input: &str) -> Result<Execution, VmError> {
        let session = self.sessions.get_session(session_id)?;
        let guard = session.try_lock_runtime()?;

        let mut execution = self.start(
            &session,
            ExecutionKind::Repl,
            Some(input.to_string()),
            None,
            json!([]),
            json!({}),
        )?;
        let recorder = Arc::new(EventRecorder::new(self.store.clone(), execution.id.clone()));

        recorder.emit_payload(
            EventType::InputEcho,
            &InputEchoPayload {
                text: input.to_string(),
            },
        );
        if let Some(err) = recorder.take_failure() {
            return Err(err);
        }

        let source = input.to_string();
        let outcome = guard
            .runtime()
            .run(run_captured(recorder.clone(), source, Vec::new()))?;

        self.finish(&mut execution, &recorder, outcome)?;
        Ok(execution)
    }

    /// Run a worktree-relative file. `args` defaults to `[]` and `env` to `{}`;
    /// both are exposed to the script as `__ARGS__` and `__ENV__`.
    pub fn execute_run_file(
        &self,
        session_id: &SessionId,
        path: &str,
        args: Option<Value>,
        env: Option<Value>,
    ) -> Result<Execution, VmError> {
        let session = self.sessions.get_session(session_id)?;
        let guard = session.try_lock_runtime()?;

        let rel = RelWorktreePath::parse(path).map_err(|e| VmError::from_sandbox(path, e))?;
        let resolved = session
            .worktree()
            .resolve(&rel)
            .map_err(|e| VmError::from_sandbox(path, e))?;
        let content = match std::fs::read(resolved.absolute()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VmError::FileNotFound {
                    path: path.to_string(),
                });
            }
            Err(e) => return Err(VmError::Io(e)),
        };

        let args = args.filter(|v| !v.is_null()).unwrap_or_else(|| json!([]));
        let env = env.filter(|v| !v.is_null()).unwrap_or_else(|| json!({}));

        let mut execution = self.start(
            &session,
            ExecutionKind::RunFile,
            None,
            Some(rel.to_string()),
            args.clone(),
            env.clone(),
        )?;
        let recorder = Arc::new(EventRecorder::new(self.store.clone(), execution.id.clone()));

        let globals = vec![("__ARGS__", args), ("__ENV__", env)];
        let outcome = guard
            .runtime()
            .run(run_captured(recorder.clone(), content, globals))?;

        self.finish(&mut execution, &recorder, outcome)?;
        Ok(execution)
    }

    pub fn get_execution(&self, id: &ExecutionId) -> Result<Execution, VmError> {
        self.store
            .get_execution(id)
            .map_err(|e| execution_lookup_error(id, e, "failed to load execution"))
    }

    pub fn list_executions(&self, session_id: &SessionId, limit: usize) -> Result<Vec<Execution>, VmError> {
        self.store
            .list_executions(session_id, limit)
            .map_err(VmError::persistence("failed to list executions"))
    }

    /// Events with `seq > after_seq`, ascending.
    pub fn get_events(&self, id: &ExecutionId, after_seq: u64) -> Result<Vec<ExecutionEvent>, VmError> {
        self.store
            .list_events(id, after_seq)
            .map_err(|e| execution_lookup_error(id, e, "failed to list events"))
    }

    fn start(
        &self,
        session: &Session,
        kind: ExecutionKind,
        input: Option<String>,
        path: Option<String>,
        args: Value,
        env: Value,
    ) -> Result<Execution, VmError> {
        let execution = Execution {
            id: ExecutionId::new(),
            session_id: session.id().clone(),
            kind,
            input,
            path,
            args,
            env,
            status: ExecutionStatus::Running,
            started_at: SystemTime::now(),
            ended_at: None,
            result: None,
            error: None,
            metrics: json!({}),
        };
        self.store
            .create_execution(&execution)
            .map_err(VmError::persistence("failed to create execution"))?;
        debug!(execution_id = %execution.id, session_id = %session.id(), kind = ?kind, "execution started");
        Ok(execution)
    }

    fn finish(
        &self,
        execution: &mut Execution,
        recorder: &EventRecorder,
        outcome: RunOutcome,
    ) -> Result<(), VmError> {
        if let Some(err) = recorder.take_failure() {
            return Err(err);
        }

        let (event_type, payload) = match &outcome {
            Ok(value) => (EventType::Value, to_payload(value)?),
            Err(exception) => (EventType::Exception, to_payload(exception)?),
        };
        recorder.emit(event_type, payload.clone());
        if let Some(err) = recorder.take_failure() {
            return Err(err);
        }

        execution.ended_at = Some(SystemTime::now());
        let context = match outcome {
            Ok(_) => {
                execution.status = ExecutionStatus::Ok;
                execution.result = Some(payload);
                "failed to persist successful execution"
            }
            Err(_) => {
                execution.status = ExecutionStatus::Error;
                execution.error = Some(payload);
                "failed to persist failed execution"
            }
        };
        self.store
            .update_execution(execution)
            .map_err(VmError::persistence(context))?;

        info!(
            execution_id = %execution.id,
            session_id = %execution.session_id,
            status = ?execution.status,
            events = recorder.recorded(),
            "execution finished"
        );
        Ok(())
    }
}

/// Job that evaluates `source` with console output captured into `recorder`
/// and `globals` defined first. Executions always get a console, whatever the
/// template's `runtime.console` says about setup.
fn run_captured(
    recorder: Arc<EventRecorder>,
    source: String,
    globals: Vec<(&'static str, Value)>,
) -> impl FnOnce(&mut boa_engine::Context) -> RunOutcome + Send + 'static {
    move |context| {
        if let Err(e) = console::install(context) {
            return Err(value::describe_error(&e, context));
        }
        for (name, payload) in &globals {
            let installed = JsValue::from_json(payload, context)
                .and_then(|js| runtime::set_global(context, name, js));
            if let Err(e) = installed {
                return Err(value::describe_error(&e, context));
            }
        }

        let sink = recorder.clone();
        let _capture = console::ConsoleCapture::install(move |level, text| {
            sink.emit_payload(
                EventType::Console,
                &ConsolePayload {
                    level,
                    text: text.to_string(),
                },
            );
        });
        value::eval(context, &source)
    }
}

fn to_payload<T: serde::Serialize>(payload: &T) -> Result<Value, VmError> {
    serde_json::to_value(payload)
        .map_err(|e| VmError::InternalRuntime(format!("unserializable payload: {e}")))
}

fn execution_lookup_error(id: &ExecutionId, err: StoreError, context: &'static str) -> VmError {
    if err.is_not_found() {
        VmError::ExecutionNotFound { id: id.to_string() }
    } else {
        VmError::Persistence {
            context,
            source: err,
        }
    }
}
