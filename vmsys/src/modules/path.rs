//! `path`: lexical helpers. No filesystem access.

use std::path::Path;

use boa_engine::{
    Context, JsObject, JsResult, JsString, JsValue, NativeFunction, js_string,
    object::ObjectInitializer,
};

use super::string_arg;
use crate::sandbox::normalize_path_lexically;

pub(super) const FUNCTIONS: &[&str] = &["join", "basename", "dirname", "extname"];

pub(super) fn load(context: &mut Context) -> JsObject {
    ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(join), js_string!("join"), 0)
        .function(NativeFunction::from_fn_ptr(basename), js_string!("basename"), 1)
        .function(NativeFunction::from_fn_ptr(dirname), js_string!("dirname"), 1)
        .function(NativeFunction::from_fn_ptr(extname), js_string!("extname"), 1)
        .build()
}

fn string_value(text: &str) -> JsValue {
    JsValue::from(JsString::from(text))
}

pub(crate) fn join_segments<S: AsRef<str>>(segments: &[S]) -> String {
    let joined = segments
        .iter()
        .map(|s| s.as_ref())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    let normalized = normalize_path_lexically(Path::new(&joined));
    match normalized.to_string_lossy().as_ref() {
        "" => ".".to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn basename_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub(crate) fn dirname_of(path: &str) -> String {
    match Path::new(path).parent() {
        Some(parent) if parent.as_os_str().is_empty() => ".".to_string(),
        Some(parent) => parent.to_string_lossy().into_owned(),
        None if path.starts_with('/') => "/".to_string(),
        None => ".".to_string(),
    }
}

pub(crate) fn extname_of(path: &str) -> String {
    let name = basename_of(path);
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => name[idx..].to_string(),
    }
}

fn join(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let mut segments = Vec::with_capacity(args.len());
    for index in 0..args.len() {
        segments.push(string_arg(args, index, "path segment", context)?);
    }
    Ok(string_value(&join_segments(&segments)))
}

fn basename(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, "path", context)?;
    Ok(string_value(&basename_of(&path)))
}

fn dirname(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, "path", context)?;
    Ok(string_value(&dirname_of(&path)))
}

fn extname(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, "path", context)?;
    Ok(string_value(&extname_of(&path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_normalizes() {
        assert_eq!(join_segments(&["a", "b/../c", "d.js"]), "a/c/d.js");
        assert_eq!(join_segments(&["a", ".."]), ".");
        assert_eq!(join_segments(&["", "x"]), "x");
        assert_eq!(join_segments(&["..", "x"]), "../x");
    }

    #[test]
    fn test_basename_dirname_extname() {
        assert_eq!(basename_of("src/lib/util.test.js"), "util.test.js");
        assert_eq!(dirname_of("src/lib/util.js"), "src/lib");
        assert_eq!(dirname_of("util.js"), ".");
        assert_eq!(dirname_of("/"), "/");
        assert_eq!(extname_of("src/util.test.js"), ".js");
        assert_eq!(extname_of(".bashrc"), "");
        assert_eq!(extname_of("Makefile"), "");
    }
}
