use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::VmError;
use crate::models::{EventType, ExecutionEvent, ExecutionId};
use crate::store::ExecutionStore;

#[derive(Debug)]
struct RecorderState {
    next_seq: u64,
    failure: Option<VmError>,
}

/// Issues sequence numbers for one execution and persists its events.
///
/// A number is consumed only when the store accepts the event, so stored
/// sequences are exactly `1..=N`. After the first failed write the recorder
/// keeps the error and drops every later event; the pipeline reports it
/// through [`EventRecorder::take_failure`].
pub struct EventRecorder {
    store: Arc<dyn ExecutionStore>,
    execution_id: ExecutionId,
    state: Mutex<RecorderState>,
}

impl EventRecorder {
    pub fn new(store: Arc<dyn ExecutionStore>, execution_id: ExecutionId) -> Self {
        Self {
            store,
            execution_id,
            state: Mutex::new(RecorderState {
                next_seq: 1,
                failure: None,
            }),
        }
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    /// Persist one event. Returns its sequence number, or `None` when it was
    /// not stored.
    pub fn emit(&self, event_type: EventType, payload: Value) -> Option<u64> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.failure.is_some() {
            return None;
        }

        let seq = state.next_seq;
        let event = ExecutionEvent {
            execution_id: self.execution_id.clone(),
            seq,
            ts: SystemTime::now(),
            event_type,
            payload,
        };

        match self.store.append_event(&event) {
            Ok(()) => {
                state.next_seq += 1;
                Some(seq)
            }
            Err(source) => {
                warn!(execution_id = %self.execution_id, seq, error = %source, "failed to persist event");
                state.failure = Some(VmError::Persistence {
                    context: "failed to persist event",
                    source,
                });
                None
            }
        }
    }

    pub fn emit_payload<T: Serialize>(&self, event_type: EventType, payload: &T) -> Option<u64> {
        match serde_json::to_value(payload) {
            Ok(value) => self.emit(event_type, value),
            Err(e) => {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                state
                    .failure
                    .get_or_insert(VmError::InternalRuntime(format!("unserializable event payload: {e}")));
                None
            }
        }
    }

    /// Number of events stored so far.
    pub fn recorded(&self) -> u64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).next_seq - 1
    }

    pub fn has_failed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failure
            .is_some()
    }

    pub fn take_failure(&self) -> Option<VmError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failure
            .take()
    }
}
