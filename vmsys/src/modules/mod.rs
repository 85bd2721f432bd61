//! # Capability Registry
//!
//! Sessions get native modules only through an explicit per-template
//! allowlist. The JavaScript built-ins (`console`, `Math`, `JSON`, ...) are
//! always present and are not part of that surface: naming one in a template
//! is rejected.
//!
//! [`enable_configured_modules`] validates the whole list before touching the
//! runtime, then builds a fresh module object per entry and installs a
//! `require()` that serves exactly those objects.

mod exec;
mod fs;
mod path;

use std::collections::HashSet;

use boa_engine::{
    Context, JsObject, JsString, JsValue, Source, object::ObjectInitializer, property::Attribute,
};
use tracing::debug;

use crate::error::VmError;

/// Engine built-ins that can never be configured per template.
pub const BUILTIN_MODULES: &[&str] = &[
    "console", "math", "json", "date", "array", "string", "object", "promise",
];

/// One entry of the native module catalog.
#[derive(Debug, Clone, Copy)]
pub struct NativeModule {
    pub name: &'static str,
    pub description: &'static str,
    pub functions: &'static [&'static str],
    loader: fn(&mut Context) -> JsObject,
}

static NATIVE_MODULES: &[NativeModule] = &[
    NativeModule {
        name: "exec",
        description: "Run external commands in the session worktree",
        functions: exec::FUNCTIONS,
        loader: exec::load,
    },
    NativeModule {
        name: "fs",
        description: "Read and write files inside the session worktree",
        functions: fs::FUNCTIONS,
        loader: fs::load,
    },
    NativeModule {
        name: "path",
        description: "Lexical path manipulation",
        functions: path::FUNCTIONS,
        loader: path::load,
    },
];

const REQUIRE_FACTORY: &str = r#"(function (registry) {
    return function require(name) {
        var key = String(name).trim().toLowerCase();
        if (Object.prototype.hasOwnProperty.call(registry, key)) {
            return registry[key];
        }
        throw new Error("module not allowed: " + key);
    };
})"#;

fn normalize_module_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn is_builtin_module(name: &str) -> bool {
    BUILTIN_MODULES.contains(&normalize_module_name(name).as_str())
}

pub fn native_module(name: &str) -> Option<&'static NativeModule> {
    let name = normalize_module_name(name);
    NATIVE_MODULES.iter().find(|m| m.name == name)
}

/// The native module catalog (`exec`, `fs`, `path`), sorted by name.
pub fn catalog() -> Vec<&'static NativeModule> {
    let mut modules: Vec<_> = NATIVE_MODULES.iter().collect();
    modules.sort_by_key(|m| m.name);
    modules
}

pub fn registered_module_names() -> Vec<&'static str> {
    catalog().into_iter().map(|m| m.name).collect()
}

/// Normalize a template-supplied module name and check it against policy.
pub fn validate_configured_module_name(name: &str) -> Result<String, VmError> {
    let normalized = normalize_module_name(name);
    if normalized.is_empty() {
        return Err(VmError::ModuleNotAllowed {
            reason: "module name is required".to_string(),
        });
    }
    if is_builtin_module(&normalized) {
        return Err(VmError::ModuleNotAllowed {
            reason: format!(
                "{normalized:?} is a JavaScript built-in and cannot be configured per template"
            ),
        });
    }
    if native_module(&normalized).is_none() {
        return Err(VmError::ModuleNotAllowed {
            reason: format!("{normalized:?} is not a registered native module"),
        });
    }
    Ok(normalized)
}

/// Validate every name, then enable the de-duplicated set on `context` and
/// install `require()`. Nothing is installed when any name is rejected.
///
/// Returns the enabled names in first-seen order.
pub fn enable_configured_modules<S: AsRef<str>>(
    context: &mut Context,
    configured: &[S],
) -> Result<Vec<String>, VmError> {
    let mut seen = HashSet::new();
    let mut enabled = Vec::new();
    for raw in configured {
        let name = validate_configured_module_name(raw.as_ref())?;
        if seen.insert(name.clone()) {
            enabled.push(name);
        }
    }

    let mut modules = Vec::with_capacity(enabled.len());
    for name in &enabled {
        let module = native_module(name).ok_or_else(|| VmError::ModuleNotAllowed {
            reason: format!("{name:?} is not a registered native module"),
        })?;
        modules.push((module.name, (module.loader)(context)));
    }

    let registry = {
        let mut registry = ObjectInitializer::new(context);
        for (name, object) in modules {
            registry.property(JsString::from(name), object, Attribute::all());
        }
        registry.build()
    };

    install_require(context, registry).map_err(|e| {
        VmError::InternalRuntime(format!("failed to install require(): {e}"))
    })?;

    debug!(modules = ?enabled, "enabled native modules");
    Ok(enabled)
}

fn install_require(context: &mut Context, registry: JsObject) -> boa_engine::JsResult<()> {
    let factory = context.eval(Source::from_bytes(REQUIRE_FACTORY))?;
    let factory = factory.as_callable().cloned().ok_or_else(|| {
        boa_engine::JsNativeError::typ().with_message("require factory is not callable")
    })?;
    let require = factory.call(&JsValue::undefined(), &[registry.into()], context)?;
    crate::runtime::set_global(context, "require", require)
}

/// First argument as a Rust string, or a `TypeError` naming `what`.
fn string_arg(args: &[JsValue], index: usize, what: &str, context: &mut Context) -> boa_engine::JsResult<String> {
    match args.get(index) {
        Some(value) if !value.is_undefined() && !value.is_null() => {
            Ok(value.to_string(context)?.to_std_string_escaped())
        }
        _ => Err(boa_engine::JsNativeError::typ()
            .with_message(format!("{what} is required"))
            .into()),
    }
}

fn js_error(message: String) -> boa_engine::JsError {
    boa_engine::JsNativeError::error()
        .with_message(message)
        .into()
}
