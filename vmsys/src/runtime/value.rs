use boa_engine::{Context, JsError, JsValue, Source, js_string};

use crate::models::{ExceptionPayload, ValuePayload};

/// Evaluate `source` as a classic script and describe the outcome.
///
/// Pending promise jobs are drained before the value is described, so
/// `.then` callbacks queued by the snippet run inside the same call.
pub fn eval(context: &mut Context, source: &str) -> Result<ValuePayload, ExceptionPayload> {
    match context.eval(Source::from_bytes(source)) {
        Ok(value) => {
            let _ = context.run_jobs();
            Ok(describe_value(&value, context))
        }
        Err(err) => Err(describe_error(&err, context)),
    }
}

pub fn describe_value(value: &JsValue, context: &mut Context) -> ValuePayload {
    let type_name = if value.is_null() {
        "null".to_string()
    } else {
        value.type_of().to_string()
    };

    ValuePayload {
        type_name,
        preview: preview(value, context),
        json: export_json(value, context),
    }
}

/// `ToString` of the value, or its debug display when `ToString` throws
/// (symbols, objects with a throwing `toString`).
pub fn preview(value: &JsValue, context: &mut Context) -> String {
    match value.to_string(context) {
        Ok(text) => text.to_std_string_escaped(),
        Err(_) => value.display().to_string(),
    }
}

/// JSON form of the value when it has one.
pub fn export_json(value: &JsValue, context: &mut Context) -> Option<serde_json::Value> {
    if value.is_undefined() || value.is_symbol() || value.is_callable() {
        return None;
    }
    value.to_json(context).ok()
}

pub fn describe_error(err: &JsError, context: &mut Context) -> ExceptionPayload {
    let message = match err.try_native(context) {
        Ok(native) => native.to_string(),
        Err(_) => match err.as_opaque() {
            Some(value) => preview(value, context),
            None => err.to_string(),
        },
    };

    ExceptionPayload {
        message,
        stack: stack_of(err, context),
    }
}

fn stack_of(err: &JsError, context: &mut Context) -> Option<String> {
    let object = err.as_opaque()?.as_object()?.clone();
    let stack = object.get(js_string!("stack"), context).ok()?;
    if !stack.is_string() {
        return None;
    }
    let text = stack.to_string(context).ok()?.to_std_string_escaped();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval_fresh(source: &str) -> Result<ValuePayload, ExceptionPayload> {
        let mut context = Context::default();
        eval(&mut context, source)
    }

    #[test]
    fn test_number_value() {
        let value = eval_fresh("20 + 22").unwrap();
        assert_eq!(value.type_name, "number");
        assert_eq!(value.preview, "42");
        assert_eq!(value.json, Some(json!(42)));
    }

    #[test]
    fn test_object_value_exports_json() {
        let value = eval_fresh("({a: 1, b: [true, 'x']})").unwrap();
        assert_eq!(value.type_name, "object");
        assert_eq!(value.preview, "[object Object]");
        assert_eq!(value.json, Some(json!({"a": 1, "b": [true, "x"]})));
    }

    #[test]
    fn test_undefined_and_null() {
        let undefined = eval_fresh("var x = 1;").unwrap();
        assert_eq!(undefined.type_name, "undefined");
        assert_eq!(undefined.preview, "undefined");
        assert_eq!(undefined.json, None);

        let null = eval_fresh("null").unwrap();
        assert_eq!(null.type_name, "null");
        assert_eq!(null.json, Some(serde_json::Value::Null));
    }

    #[test]
    fn test_functions_have_no_json() {
        let value = eval_fresh("(function f() {})").unwrap();
        assert_eq!(value.type_name, "function");
        assert_eq!(value.json, None);
    }

    #[test]
    fn test_thrown_error_message() {
        let err = eval_fresh("throw new Error('boom')").unwrap_err();
        assert!(err.message.contains("boom"), "message was {}", err.message);
    }

    #[test]
    fn test_thrown_primitive_message() {
        let err = eval_fresh("throw 'plain failure'").unwrap_err();
        assert!(err.message.contains("plain failure"), "message was {}", err.message);
        assert_eq!(err.stack, None);
    }

    #[test]
    fn test_syntax_error_is_exception() {
        let err = eval_fresh("let = ;").unwrap_err();
        assert!(!err.message.is_empty());
    }
}
