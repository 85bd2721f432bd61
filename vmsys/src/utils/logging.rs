//! # Logging Initialization
//!
//! One call at process start installs a global `tracing` subscriber.
//!
//! - **Filter**: `RUST_LOG` wins when set. Otherwise the caller's level is used
//!   for every crate and `vmsys` itself logs at `debug`.
//! - **File output** (`log_to_file = true`): a daily rolling file named
//!   `vmsys.log` in the platform cache directory (via `directories`), written
//!   through a non-blocking `tracing_appender` worker without ANSI colours.
//! - **Stderr output**: used when requested, and as the fallback when the cache
//!   directory is missing or not writable.
//!
//! Session runtime threads enter a `session_runtime` span, so console output
//! from startup files and libraries carries its `session_id`.

use anyhow::Result;
use directories::ProjectDirs;
use std::{io::stderr, path::Path, sync::Once};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

/// Trace-level stderr logging for tests.
pub fn init_test_logging() {
    // Idempotent; returns Ok on every call after the first.
    let _ = init_logging("trace", false);
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_logging(log_level: &str, log_to_file: bool) -> Result<()> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},vmsys=debug")));

        if log_to_file
            && let Some(proj_dirs) = ProjectDirs::from("dev", "Vmsys", "vmsys")
            && can_write(proj_dirs.cache_dir())
        {
            // rolling::daily panics on permission errors, checked above.
            let file_appender = tracing_appender::rolling::daily(proj_dirs.cache_dir(), "vmsys.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer().with_writer(non_blocking).with_ansi(false))
                .init();
            // Leaked so buffered lines are flushed on exit.
            Box::leak(Box::new(guard));
            return;
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .init();
    });

    Ok(())
}

fn can_write(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }

    let probe = dir.join(".vmsys_log_probe");
    match std::fs::write(&probe, "probe") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
