use std::time::SystemTime;

use tracing::warn;

use crate::error::VmError;
use crate::models::SessionStatus;
use crate::store::SessionStore;

pub const SESSION_STARTUP_GC_MESSAGE: &str =
    "garbage collected on daemon startup: runtime state does not survive process restarts";

/// Close every persisted `starting` or `ready` session.
///
/// Runtimes live in process memory, so after a restart those records point at
/// nothing. Run once before serving traffic. Crashed and closed records are
/// left alone; an existing `closed_at` or `last_error` is kept.
///
/// Returns the number of sessions closed.
pub fn close_stale_sessions(store: &dyn SessionStore) -> Result<usize, VmError> {
    let sessions = store
        .list_sessions(None)
        .map_err(VmError::persistence("failed to list sessions"))?;

    let now = SystemTime::now();
    let mut closed = 0;
    for mut session in sessions {
        if !matches!(session.status, SessionStatus::Starting | SessionStatus::Ready) {
            continue;
        }

        session.status = SessionStatus::Closed;
        session.closed_at.get_or_insert(now);
        if session.last_error.as_deref().is_none_or(str::is_empty) {
            session.last_error = Some(SESSION_STARTUP_GC_MESSAGE.to_string());
        }

        store
            .update_session(&session)
            .map_err(VmError::persistence("failed to close stale session"))?;
        closed += 1;
    }

    if closed > 0 {
        warn!(closed_sessions = closed, "closed stale persisted sessions on startup");
    }
    Ok(closed)
}
