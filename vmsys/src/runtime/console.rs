//! The `console` global.
//!
//! Every level is a plain native function. Where its text goes is decided by
//! the capture scope active on the runtime thread at call time: an execution
//! installs a [`ConsoleCapture`] that turns calls into `console` events, and
//! with no capture the text is logged through `tracing` inside the session's
//! span. References to `console.log` kept across executions therefore report
//! into whichever execution is running when they are called.

use std::cell::RefCell;

use boa_engine::{
    Context, JsResult, JsValue, NativeFunction, js_string, object::ObjectInitializer,
};
use tracing::{debug, error, info, warn};

use crate::models::ConsoleLevel;

type Sink = Box<dyn FnMut(ConsoleLevel, &str)>;

thread_local! {
    static SINK: RefCell<Option<Sink>> = const { RefCell::new(None) };
}

/// Routes console calls on this thread to a sink until dropped.
///
/// Scopes nest; dropping restores the previous sink.
pub struct ConsoleCapture {
    previous: Option<Sink>,
}

impl ConsoleCapture {
    pub fn install(sink: impl FnMut(ConsoleLevel, &str) + 'static) -> Self {
        let previous = SINK.with(|slot| slot.borrow_mut().replace(Box::new(sink)));
        Self { previous }
    }
}

impl Drop for ConsoleCapture {
    fn drop(&mut self) {
        let previous = self.previous.take();
        SINK.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Install (or replace) the `console` global on `context`.
pub fn install(context: &mut Context) -> JsResult<()> {
    let console = ObjectInitializer::new(context)
        .function(NativeFunction::from_fn_ptr(console_log), js_string!("log"), 0)
        .function(NativeFunction::from_fn_ptr(console_info), js_string!("info"), 0)
        .function(NativeFunction::from_fn_ptr(console_warn), js_string!("warn"), 0)
        .function(NativeFunction::from_fn_ptr(console_error), js_string!("error"), 0)
        .function(NativeFunction::from_fn_ptr(console_debug), js_string!("debug"), 0)
        .build();

    super::set_global(context, "console", console.into())
}

fn console_log(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    write(ConsoleLevel::Log, args, context)
}

fn console_info(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    write(ConsoleLevel::Info, args, context)
}

fn console_warn(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    write(ConsoleLevel::Warn, args, context)
}

fn console_error(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    write(ConsoleLevel::Error, args, context)
}

fn console_debug(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    write(ConsoleLevel::Debug, args, context)
}

fn write(level: ConsoleLevel, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let text = format_args(args, context);

    // The sink is taken out while it runs so a sink that reaches back into
    // the console cannot double-borrow the slot.
    let sink = SINK.with(|slot| slot.borrow_mut().take());
    match sink {
        Some(mut sink) => {
            sink(level, &text);
            SINK.with(|slot| {
                let mut slot = slot.borrow_mut();
                if slot.is_none() {
                    *slot = Some(sink);
                }
            });
        }
        None => log_to_tracing(level, &text),
    }

    Ok(JsValue::undefined())
}

/// Join arguments with a single space. Objects and arrays are rendered as
/// JSON; everything else uses `ToString`.
pub fn format_args(args: &[JsValue], context: &mut Context) -> String {
    args.iter()
        .map(|arg| format_arg(arg, context))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_arg(arg: &JsValue, context: &mut Context) -> String {
    if arg.is_object()
        && !arg.is_callable()
        && let Ok(json) = arg.to_json(context)
    {
        return json.to_string();
    }
    super::value::preview(arg, context)
}

fn log_to_tracing(level: ConsoleLevel, text: &str) {
    match level {
        ConsoleLevel::Log | ConsoleLevel::Info => info!(level = level.as_str(), "{text}"),
        ConsoleLevel::Warn => warn!(level = level.as_str(), "{text}"),
        ConsoleLevel::Error => error!(level = level.as_str(), "{text}"),
        ConsoleLevel::Debug => debug!(level = level.as_str(), "{text}"),
    }
}
