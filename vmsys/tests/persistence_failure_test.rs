use anyhow::Result;
use vmsys::models::{EventType, ExecutionStatus, SessionStatus};
use vmsys::store::ExecutionStore;
use vmsys::test_utils::{Fault, Fixture};

#[test]
fn test_create_execution_failure_releases_session() -> Result<()> {
    let fixture = Fixture::new()?;
    let core = fixture.core();
    let session = core.sessions.create(&fixture.session_input())?;

    fixture.store().arm(Fault::CreateExecution);
    let err = core.executions.execute_repl(&session.id, "1").unwrap_err();
    assert_eq!(err.code(), "PERSISTENCE_FAILED");
    assert!(err.to_string().starts_with("failed to create execution"));

    fixture.store().disarm_all();
    let execution = core.executions.execute_repl(&session.id, "1")?;
    assert_eq!(execution.status, ExecutionStatus::Ok);
    Ok(())
}

#[test]
fn test_input_echo_failure_stops_before_running() -> Result<()> {
    let fixture = Fixture::new()?;
    let core = fixture.core();
    let session = core.sessions.create(&fixture.session_input())?;

    fixture.store().arm(Fault::EventType(EventType::InputEcho));
    let err = core
        .executions
        .execute_repl(&session.id, "var touched = true;")
        .unwrap_err();
    assert_eq!(err.code(), "PERSISTENCE_FAILED");

    fixture.store().disarm_all();
    let execution = core.executions.execute_repl(&session.id, "typeof touched")?;
    assert_eq!(execution.result.unwrap()["preview"], "undefined");
    Ok(())
}

#[test]
fn test_value_event_failure_fails_call() -> Result<()> {
    let fixture = Fixture::new()?;
    let core = fixture.core();
    let session = core.sessions.create(&fixture.session_input())?;

    fixture.store().arm(Fault::EventType(EventType::Value));
    let err = core.executions.execute_repl(&session.id, "40 + 2").unwrap_err();
    assert_eq!(err.code(), "PERSISTENCE_FAILED");
    assert!(err.to_string().starts_with("failed to persist event"));

    // The row is left running with only the echo stored.
    let executions = core.executions.list(&session.id, 10)?;
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Running);
    let events = fixture.store().list_events(&executions[0].id, 0)?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::InputEcho);
    Ok(())
}

#[test]
fn test_console_event_failure_drops_later_events() -> Result<()> {
    let fixture = Fixture::new()?;
    let core = fixture.core();
    let session = core.sessions.create(&fixture.session_input())?;

    fixture.store().arm(Fault::EventAt(3));
    let err = core
        .executions
        .execute_repl(&session.id, "console.log('a'); console.log('b'); console.log('c'); 1")
        .unwrap_err();
    assert_eq!(err.code(), "PERSISTENCE_FAILED");

    let id = core.executions.list(&session.id, 1)?[0].id.clone();
    let seqs: Vec<u64> = fixture
        .store()
        .list_events(&id, 0)?
        .iter()
        .map(|e| e.seq)
        .collect();
    assert_eq!(seqs, vec![1, 2]);
    Ok(())
}

#[test]
fn test_final_update_failure() -> Result<()> {
    let fixture = Fixture::new()?;
    let core = fixture.core();
    let session = core.sessions.create(&fixture.session_input())?;

    fixture.store().arm(Fault::UpdateExecution);
    let err = core.executions.execute_repl(&session.id, "1").unwrap_err();
    assert!(err.to_string().starts_with("failed to persist successful execution"));

    let err = core
        .executions
        .execute_repl(&session.id, "throw new Error('x')")
        .unwrap_err();
    assert!(err.to_string().starts_with("failed to persist failed execution"));
    Ok(())
}

#[test]
fn test_session_create_failure_registers_nothing() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.store().arm(Fault::CreateSession);
    let core = fixture.core();

    let err = core.sessions.create(&fixture.session_input()).unwrap_err();
    assert_eq!(err.code(), "PERSISTENCE_FAILED");
    assert_eq!(core.runtime_summary().active_sessions, 0);
    assert!(core.sessions.list(None)?.is_empty());
    Ok(())
}

#[test]
fn test_ready_update_failure_is_reported() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.store().arm(Fault::UpdateSession);
    let core = fixture.core();

    let err = core.sessions.create(&fixture.session_input()).unwrap_err();
    assert!(err.to_string().starts_with("failed to update session status"));
    assert_eq!(core.runtime_summary().active_sessions, 0);

    // The durable record never left `starting`.
    let records = core.sessions.list(None)?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, SessionStatus::Starting);
    Ok(())
}
