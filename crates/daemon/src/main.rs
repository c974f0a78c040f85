//! suterm - front end for a privileged shell helper
//!
//! One-shot commands (`run`, `shell`, `status`, `deps`) and a long-running
//! `watch` mode with periodic status polling.

mod commands;
mod config;
mod console;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use suterm_core::application::{Engine, EngineDeps, GatePolicy};
use suterm_core::domain::LogFilter;
use suterm_core::port::id_provider::UuidProvider;
use suterm_core::port::time_provider::SystemTimeProvider;
use suterm_core::port::{event_channel, EventSink};
use suterm_infra_system::{
    detect_privilege_wrapper, SubprocessRunner, SysinfoResourceProbe, ROOT_METHODS,
};

use crate::config::AppConfig;
use crate::console::Console;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "suterm")]
#[command(about = "Run a privileged shell helper and watch device status", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: <config_dir>/suterm/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Helper script path
    #[arg(long, global = true)]
    helper: Option<String>,

    /// What a busy privileged slot does to a new request
    #[arg(long, global = true, value_parser = clap::value_parser!(GatePolicy))]
    policy: Option<GatePolicy>,

    /// Run the helper without the privilege wrapper
    #[arg(long, global = true)]
    no_elevate: bool,

    /// Show only log lines of this level (all, info, warn, error, success)
    #[arg(long, global = true, default_value = "all")]
    filter: LogFilter,

    /// Diagnostics format: pretty or json
    #[arg(long, global = true, env = "SUTERM_LOG_FORMAT")]
    log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a helper subcommand (e.g. `check`, `backup`, `check detail`)
    Run {
        /// Subcommand tokens passed to the helper
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        action: Vec<String>,

        /// Deadline in seconds (default: command_timeout_secs)
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Run an unprivileged shell line
    Shell {
        line: String,
    },

    /// Probe and print device status
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,

        /// Write snapshot and logs to a JSON report
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Poll status periodically and accept commands on stdin
    Watch,

    /// Check that the helper's tools are on PATH
    Deps,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(helper) = &self.helper {
            config.helper_path = helper.clone();
        }
        if let Some(policy) = self.policy {
            config.gate_policy = policy;
        }
        if self.no_elevate {
            config.privilege_wrapper = String::new();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // 1. Configuration
    let mut app_config = AppConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut app_config);

    // 2. Logging
    let _log_guard = logging::init(
        &app_config.log_format,
        &app_config.log_filter,
        app_config.resolved_log_dir().as_deref(),
    )?;
    info!("suterm v{} starting...", VERSION);

    // 3. Event consumer
    let (sink, events) = event_channel();
    let console = Console::new(cli.filter, matches!(cli.command, Commands::Watch));
    let book = console.book();
    let console_task = tokio::spawn(console.run(events));
    let sink: Arc<dyn EventSink> = Arc::new(sink);
    let time_provider = Arc::new(SystemTimeProvider);

    // 4. Engine + command
    let resources = match app_config.resolved_storage_path() {
        Some(path) => SysinfoResourceProbe::new(path),
        None => SysinfoResourceProbe::default(),
    };
    let mut engine_config = app_config.engine_config();
    if app_config.auto_detect_wrapper() {
        let path = std::env::var_os("PATH").unwrap_or_default();
        engine_config.privilege_wrapper =
            detect_privilege_wrapper(ROOT_METHODS, &path, sink.as_ref(), time_provider.as_ref());
    }
    let engine = Engine::start(
        engine_config,
        EngineDeps {
            runner: Arc::new(SubprocessRunner::new(app_config.env_allowlist.clone())),
            resources: Arc::new(resources),
            sink: Arc::clone(&sink),
            time_provider: time_provider.clone(),
            id_provider: Arc::new(UuidProvider),
        },
    )?;
    let outcome =
        commands::dispatch(engine, cli.command, sink.as_ref(), time_provider.as_ref()).await?;

    // 5. Drain: the console ends once the last sink clone is gone
    drop(sink);
    console_task.await?;

    outcome.finish(&book)
}
