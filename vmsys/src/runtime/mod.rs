//! # Script Runtime
//!
//! A `boa_engine::Context` cannot leave the thread that created it, so every
//! session gets a dedicated OS thread that owns its context for the session's
//! whole life. [`ScriptRuntime`] is the handle to that thread: work is sent as
//! closures over a channel and runs with `&mut Context`, one job at a time, in
//! submission order.
//!
//! The handle itself is `Send` and is stored behind the session's execution
//! mutex. Dropping it closes the channel; the thread finishes the job it is on
//! and exits, dropping the context.
//!
//! JavaScript values never cross the channel. Jobs convert results into plain
//! payloads ([`value::describe_value`], [`value::describe_error`]) before
//! returning.

pub mod console;
pub mod value;

use std::cell::RefCell;
use std::sync::mpsc;
use std::thread;

use boa_engine::{Context, JsResult, JsString, JsValue};
use tracing::{debug, info_span};

use crate::error::VmError;
use crate::models::{ExceptionPayload, SessionId, ValuePayload};
use crate::sandbox::WorktreeRoot;

/// The only engine a template may name.
pub const ENGINE: &str = "boa";

const RUNTIME_STACK_SIZE: usize = 8 * 1024 * 1024;

type Job = Box<dyn FnOnce(&mut Context) + Send>;

thread_local! {
    /// Worktree the current runtime thread's session is bound to.
    static WORKTREE: RefCell<Option<WorktreeRoot>> = const { RefCell::new(None) };
}

/// Run `f` with the worktree of the session owning the current thread.
///
/// Returns `None` on threads that are not session runtimes.
pub fn with_worktree<R>(f: impl FnOnce(&WorktreeRoot) -> R) -> Option<R> {
    WORKTREE.with(|slot| slot.borrow().as_ref().map(f))
}

/// Handle to a session's runtime thread.
#[derive(Debug)]
pub struct ScriptRuntime {
    session_id: SessionId,
    jobs: mpsc::Sender<Job>,
}

impl ScriptRuntime {
    /// Start the runtime thread for `session_id`, bound to `worktree`.
    pub fn spawn(session_id: &SessionId, worktree: WorktreeRoot) -> Result<Self, VmError> {
        let (jobs, inbox) = mpsc::channel::<Job>();
        let span_session = session_id.to_string();

        thread::Builder::new()
            .name(format!("vm-session-{session_id}"))
            .stack_size(RUNTIME_STACK_SIZE)
            .spawn(move || {
                let span = info_span!("session_runtime", session_id = %span_session);
                let _entered = span.enter();

                WORKTREE.with(|slot| *slot.borrow_mut() = Some(worktree));
                let mut context = Context::default();
                debug!("runtime thread started");

                while let Ok(job) = inbox.recv() {
                    job(&mut context);
                }

                debug!("runtime thread stopping");
            })
            .map_err(|e| {
                VmError::InternalRuntime(format!("failed to start runtime thread: {e}"))
            })?;

        Ok(Self {
            session_id: session_id.clone(),
            jobs,
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Run `job` on the runtime thread and wait for its result.
    pub fn run<F, R>(&self, job: F) -> Result<R, VmError>
    where
        F: FnOnce(&mut Context) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, result) = mpsc::sync_channel(1);
        let job: Job = Box::new(move |context| {
            let _ = reply.send(job(context));
        });

        self.jobs.send(job).map_err(|_| self.stopped())?;
        result.recv().map_err(|_| self.stopped())
    }

    /// Evaluate `source` as a script.
    pub fn eval(&self, source: impl Into<String>) -> Result<Result<ValuePayload, ExceptionPayload>, VmError> {
        let source = source.into();
        self.run(move |context| value::eval(context, &source))
    }

    fn stopped(&self) -> VmError {
        VmError::InternalRuntime(format!(
            "runtime thread for session {} has stopped",
            self.session_id
        ))
    }
}

/// Define (or replace) a writable global.
pub fn set_global(context: &mut Context, name: &str, value: JsValue) -> JsResult<()> {
    let global = context.global_object();
    global.set(JsString::from(name), value, true, context)?;
    Ok(())
}
