//! `exec`: run an external command with the session worktree as its working
//! directory.

use std::process::Command;

use boa_engine::{
    Context, JsObject, JsResult, JsString, JsValue, NativeFunction, js_string,
    object::ObjectInitializer,
};
use tracing::debug;

use super::{js_error, string_arg};
use crate::runtime;

pub(super) const FUNCTIONS: &[&str] = &["run"];

pub(super) fn load(context: &mut Context) -> JsObject {
    ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(run), js_string!("run"), 1)
        .build()
}

/// `run(command, args?)`: returns stdout, throws on spawn failure or a
/// non-zero exit.
fn run(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let command = string_arg(args, 0, "command", context)?;
    let command_args = match args.get(1) {
        Some(value) if !value.is_undefined() && !value.is_null() => argv(value, context)?,
        _ => Vec::new(),
    };

    let cwd = runtime::with_worktree(|root| root.canonical().to_path_buf())
        .ok_or_else(|| js_error("exec is unavailable outside a session runtime".to_string()))?;

    debug!(command = %command, args = ?command_args, "exec.run");
    let output = Command::new(&command)
        .args(&command_args)
        .current_dir(&cwd)
        .output()
        .map_err(|e| js_error(format!("exec: failed to start {command}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(js_error(format!(
            "exec: {command} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(JsValue::from(JsString::from(&*stdout)))
}

fn argv(value: &JsValue, context: &mut Context) -> JsResult<Vec<String>> {
    let json = value
        .to_json(context)
        .map_err(|_| js_error("exec: args must be an array of strings".to_string()))?;
    let Some(items) = json.as_array() else {
        return Err(js_error("exec: args must be an array of strings".to_string()));
    };
    Ok(items
        .iter()
        .map(|item| match item {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect())
}
