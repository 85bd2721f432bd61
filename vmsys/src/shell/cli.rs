//! # vmsys CLI
//!
//! Command-line interface definition and main entry point. Each invocation
//! provisions a throwaway template and session over an in-memory store, runs
//! one execution and prints it with its events as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::CliConfig;
use crate::control::{CreateSessionInput, Core, RunFileInput};
use crate::models::{Execution, ExecutionEvent, SessionId};
use crate::modules;
use crate::store::{LibraryCache, MemoryStore};
use crate::utils::logging::init_logging;

/// vmsys: session-oriented JavaScript runtimes bound to a worktree.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a TOML settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (overrides the settings file)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log to the rolling log file instead of stderr
    #[arg(long, global = true)]
    pub log_to_file: bool,

    /// Directory of cached `<name>.js` libraries (overrides the settings file)
    #[arg(long, global = true)]
    pub library_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the native modules a template may expose
    Modules,
    /// Evaluate a snippet in a fresh session
    Eval {
        snippet: String,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Run a worktree file in a fresh session
    Run {
        /// Path relative to the worktree
        path: String,
        /// JSON value exposed as `__ARGS__`
        #[arg(long)]
        args: Option<String>,
        /// JSON object exposed as `__ENV__`
        #[arg(long)]
        env: Option<String>,
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Worktree directory the session is bound to
    #[arg(long, default_value = ".")]
    pub worktree: PathBuf,

    /// Native module to expose through require(); repeatable
    #[arg(long = "module")]
    pub modules: Vec<String>,

    /// Cached library to load at startup; repeatable
    #[arg(long = "library")]
    pub libraries: Vec<String>,

    /// Worktree file to evaluate at startup, in the order given; repeatable
    #[arg(long = "startup")]
    pub startup: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ExecutionReport {
    pub execution: Execution,
    pub events: Vec<ExecutionEvent>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => CliConfig::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => CliConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        settings.log_level = level.clone();
    }
    if cli.log_to_file {
        settings.log_to_file = true;
    }
    if let Some(dir) = &cli.library_dir {
        settings.library_dir = dir.clone();
    }

    init_logging(&settings.log_level, settings.log_to_file)?;

    match cli.command {
        Command::Modules => {
            let catalog: Vec<Value> = modules::catalog()
                .into_iter()
                .map(|m| {
                    json!({
                        "name": m.name,
                        "description": m.description,
                        "functions": m.functions,
                    })
                })
                .collect();
            print_json(&catalog)
        }
        Command::Eval { snippet, session } => {
            let (core, session_id) = provision(&settings, &session)?;
            let execution = core.executions.execute_repl(&session_id, &snippet)?;
            report(&core, execution)
        }
        Command::Run {
            path,
            args,
            env,
            session,
        } => {
            let args = parse_json_arg("--args", args.as_deref())?;
            let env = parse_json_arg("--env", env.as_deref())?;
            let (core, session_id) = provision(&settings, &session)?;
            let execution = core.executions.execute_run_file(&RunFileInput {
                session_id,
                path,
                args,
                env,
            })?;
            report(&core, execution)
        }
    }
}

/// Template and ready session for one invocation.
fn provision(settings: &CliConfig, args: &SessionArgs) -> Result<(Core, SessionId)> {
    let store = Arc::new(MemoryStore::new());
    let libraries = Arc::new(LibraryCache::new(&settings.library_dir));
    let core = Core::bootstrap(store, libraries)?;

    let template = core.templates.create("cli", None)?;
    for module in &args.modules {
        core.templates.add_module(&template.id, module)?;
    }
    for library in &args.libraries {
        core.templates.add_library(&template.id, library)?;
    }
    for (index, path) in args.startup.iter().enumerate() {
        core.templates
            .add_startup_file(&template.id, path, index as i64, "eval")?;
    }

    let worktree = std::path::absolute(&args.worktree)
        .with_context(|| format!("invalid worktree {}", args.worktree.display()))?;
    let session = core.sessions.create(&CreateSessionInput {
        template_id: template.id,
        workspace_id: "cli".to_string(),
        base_commit_ref: String::new(),
        worktree_path: worktree,
    })?;
    Ok((core, session.id))
}

fn report(core: &Core, execution: Execution) -> Result<()> {
    let events = core.executions.events(&execution.id, 0)?;
    print_json(&ExecutionReport { execution, events })
}

pub fn parse_json_arg(flag: &str, raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|s| serde_json::from_str(s).with_context(|| format!("{flag} is not valid JSON")))
        .transpose()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
