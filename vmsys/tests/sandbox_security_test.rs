use anyhow::Result;
use vmsys::control::RunFileInput;
use vmsys::models::{EventType, ExecutionStatus};
use vmsys::test_utils::Fixture;

fn run_file(path: &str, session_id: &vmsys::models::SessionId) -> RunFileInput {
    RunFileInput {
        session_id: session_id.clone(),
        path: path.to_string(),
        args: None,
        env: None,
    }
}

#[test]
fn test_fs_module_is_scoped_to_worktree() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.write_file("data/input.txt", "payload")?;
    fixture.templates().add_module(fixture.template_id(), "fs")?;
    let core = fixture.core();
    let session = core.sessions.create(&fixture.session_input())?;

    let execution = core.executions.execute_repl(
        &session.id,
        "var fs = require('fs'); fs.writeFileSync('data/out.txt', fs.readFileSync('data/input.txt') + '!'); fs.existsSync('data/out.txt')",
    )?;
    assert_eq!(execution.result.unwrap()["json"], true);
    assert_eq!(
        std::fs::read_to_string(fixture.worktree().join("data/out.txt"))?,
        "payload!"
    );

    let execution = core
        .executions
        .execute_repl(&session.id, "require('fs').readFileSync('../../etc/passwd')")?;
    assert_eq!(execution.status, ExecutionStatus::Error);
    let message = execution.error.unwrap()["message"].as_str().unwrap().to_string();
    assert!(message.contains("fs:"), "{message}");
    Ok(())
}

#[test]
fn test_require_only_serves_configured_modules() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.templates().add_module(fixture.template_id(), "path")?;
    let core = fixture.core();
    let session = core.sessions.create(&fixture.session_input())?;

    let execution = core
        .executions
        .execute_repl(&session.id, "require(' PATH ').join('a', 'b', 'c.js')")?;
    assert_eq!(execution.result.unwrap()["preview"], "a/b/c.js");

    for name in ["fs", "exec", "console"] {
        let execution = core
            .executions
            .execute_repl(&session.id, &format!("require('{name}')"))?;
        assert_eq!(execution.status, ExecutionStatus::Error);
        let message = execution.error.unwrap()["message"].as_str().unwrap().to_string();
        assert!(message.contains(&format!("module not allowed: {name}")), "{message}");
    }
    Ok(())
}

#[test]
fn test_builtins_available_without_configuration() -> Result<()> {
    let fixture = Fixture::new()?;
    let core = fixture.core();
    let session = core.sessions.create(&fixture.session_input())?;

    let execution = core.executions.execute_repl(
        &session.id,
        "JSON.stringify({max: Math.max(1, 9), upper: 'x'.toUpperCase(), arr: Array.isArray([])})",
    )?;
    assert_eq!(
        execution.result.unwrap()["preview"],
        r#"{"max":9,"upper":"X","arr":true}"#
    );
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_symlink_out_of_worktree_is_rejected() -> Result<()> {
    let outside = tempfile::TempDir::new()?;
    std::fs::write(outside.path().join("secret.js"), "'leaked'")?;

    let fixture = Fixture::new()?;
    std::os::unix::fs::symlink(
        outside.path().join("secret.js"),
        fixture.worktree().join("link.js"),
    )?;
    std::os::unix::fs::symlink(outside.path(), fixture.worktree().join("escape"))?;
    fixture.templates().add_module(fixture.template_id(), "fs")?;
    let core = fixture.core();
    let session = core.sessions.create(&fixture.session_input())?;

    for path in ["link.js", "escape/secret.js", "escape/new.js"] {
        let err = core
            .executions
            .execute_run_file(&run_file(path, &session.id))
            .unwrap_err();
        assert_eq!(err.code(), "PATH_TRAVERSAL", "{path}");
    }

    let execution = core
        .executions
        .execute_repl(&session.id, "require('fs').writeFileSync('escape/planted.txt', 'x')")?;
    assert_eq!(execution.status, ExecutionStatus::Error);
    assert!(!outside.path().join("planted.txt").exists());
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_symlink_inside_worktree_is_followed() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.write_file("real/lib.js", "'inside'")?;
    std::os::unix::fs::symlink(
        fixture.worktree().join("real"),
        fixture.worktree().join("alias"),
    )?;
    let core = fixture.core();
    let session = core.sessions.create(&fixture.session_input())?;

    let execution = core
        .executions
        .execute_run_file(&run_file("alias/lib.js", &session.id))?;
    assert_eq!(execution.result.unwrap()["preview"], "inside");
    Ok(())
}

#[test]
fn test_rejected_run_file_records_nothing() -> Result<()> {
    let fixture = Fixture::new()?;
    let core = fixture.core();
    let session = core.sessions.create(&fixture.session_input())?;

    let err = core
        .executions
        .execute_run_file(&run_file("a/../../b.js", &session.id))
        .unwrap_err();
    assert_eq!(err.code(), "PATH_TRAVERSAL");
    assert!(core.executions.list(&session.id, 10)?.is_empty());

    // The session is still usable afterwards.
    let execution = core.executions.execute_repl(&session.id, "'ok'")?;
    let events = core.executions.events(&execution.id, 0)?;
    assert_eq!(events.last().unwrap().event_type, EventType::Value);
    Ok(())
}
