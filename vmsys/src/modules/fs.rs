//! `fs`: worktree-scoped file access.
//!
//! Every path argument is worktree-relative and is resolved through the path
//! sandbox of the session that owns the runtime thread.

use boa_engine::{
    Context, JsObject, JsResult, JsString, JsValue, NativeFunction, js_string,
    object::ObjectInitializer,
};

use super::{js_error, string_arg};
use crate::runtime;
use crate::sandbox::{ResolvedWorktreePath, resolve_relative};

pub(super) const FUNCTIONS: &[&str] = &["readFileSync", "writeFileSync", "existsSync"];

pub(super) fn load(context: &mut Context) -> JsObject {
    ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(read_file_sync), js_string!("readFileSync"), 1)
        .function(NativeFunction::from_fn_ptr(write_file_sync), js_string!("writeFileSync"), 2)
        .function(NativeFunction::from_fn_ptr(exists_sync), js_string!("existsSync"), 1)
        .build()
}

fn resolve(path: &str) -> JsResult<ResolvedWorktreePath> {
    runtime::with_worktree(|root| resolve_relative(root, path))
        .ok_or_else(|| js_error("fs is unavailable outside a session runtime".to_string()))?
        .map_err(|e| js_error(format!("fs: {e}")))
}

fn read_file_sync(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, "path", context)?;
    let resolved = resolve(&path)?;
    let bytes = std::fs::read(resolved.absolute())
        .map_err(|e| js_error(format!("fs: cannot read {path}: {e}")))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(JsValue::from(JsString::from(&*text)))
}

fn write_file_sync(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, "path", context)?;
    let data = match args.get(1) {
        Some(value) if !value.is_undefined() => value.to_string(context)?.to_std_string_escaped(),
        _ => String::new(),
    };
    let resolved = resolve(&path)?;
    std::fs::write(resolved.absolute(), data.as_bytes())
        .map_err(|e| js_error(format!("fs: cannot write {path}: {e}")))?;
    Ok(JsValue::undefined())
}

fn exists_sync(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, "path", context)?;
    let resolved = resolve(&path)?;
    Ok(JsValue::from(resolved.absolute().exists()))
}
