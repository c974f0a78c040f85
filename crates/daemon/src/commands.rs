//! Subcommand handlers

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use suterm_core::application::{CommandTicket, Engine, PollOutcome};
use suterm_core::domain::{CommandResult, LogEntry, StatusSnapshot};
use suterm_core::port::{EventSink, TimeProvider};
use suterm_infra_system::{check_dependencies, REQUIRED_TOOLS};

use crate::console::{render_status, render_status_line, SharedLogBook};
use crate::Commands;

/// What is left to do once the event stream is drained
pub struct Outcome {
    success: bool,
    status: Option<StatusView>,
}

struct StatusView {
    snapshot: StatusSnapshot,
    json: bool,
    export: Option<PathBuf>,
}

#[derive(Serialize)]
struct StatusReport<'a> {
    generated_at: chrono::DateTime<chrono::Utc>,
    snapshot: &'a StatusSnapshot,
    logs: &'a [LogEntry],
}

impl Outcome {
    fn done(success: bool) -> Self {
        Self {
            success,
            status: None,
        }
    }

    /// Print or export the status, then map success to the exit code
    pub fn finish(self, book: &SharedLogBook) -> Result<ExitCode> {
        if let Some(view) = self.status {
            if view.json {
                println!("{}", serde_json::to_string_pretty(&view.snapshot)?);
            } else {
                println!("{}", render_status(&view.snapshot));
            }

            if let Some(path) = view.export {
                let book = book.lock().unwrap_or_else(|e| e.into_inner());
                let report = StatusReport {
                    generated_at: chrono::Utc::now(),
                    snapshot: &view.snapshot,
                    logs: book.entries(),
                };
                let json = serde_json::to_string_pretty(&report)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                println!("{} Report exported to {}", "✓".green(), path.display());
            }
        }

        Ok(if self.success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

pub async fn dispatch(
    mut engine: Engine,
    command: Commands,
    sink: &dyn EventSink,
    time_provider: &dyn TimeProvider,
) -> Result<Outcome> {
    let outcome = match command {
        Commands::Run { action, timeout } => {
            let subcommand = action.join(" ");
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or(engine.config().command_timeout);
            let ticket = engine.run_helper_with_timeout(&subcommand, timeout)?;
            let result = wait_interruptible(ticket).await?;
            Outcome::done(result.is_success())
        }

        Commands::Shell { line } => {
            let ticket = engine.run_shell(&line)?;
            let result = wait_interruptible(ticket).await?;
            Outcome::done(result.is_success())
        }

        Commands::Status { json, export } => {
            let success = matches!(engine.refresh_status().await, PollOutcome::Updated { .. });
            Outcome {
                success,
                status: Some(StatusView {
                    snapshot: engine.status(),
                    json,
                    export,
                }),
            }
        }

        Commands::Watch => {
            engine.start_polling();
            watch(&engine).await?;
            Outcome::done(true)
        }

        Commands::Deps => deps(sink, time_provider),
    };

    engine.shutdown().await;
    Ok(outcome)
}

fn deps(sink: &dyn EventSink, time_provider: &dyn TimeProvider) -> Outcome {
    let path = std::env::var_os("PATH").unwrap_or_default();
    let report = check_dependencies(REQUIRED_TOOLS, &path, sink, time_provider);
    Outcome::done(report.is_satisfied())
}

/// Wait for a ticket; Ctrl+C cancels the command and still waits for its result
async fn wait_interruptible(ticket: CommandTicket) -> Result<CommandResult> {
    let cancel = ticket.cancel_handle();
    let id = ticket.id().clone();
    let wait = ticket.wait();
    tokio::pin!(wait);

    tokio::select! {
        result = &mut wait => return Ok(result?),
        _ = tokio::signal::ctrl_c() => {
            warn!(request_id = %id, "Interrupted, cancelling command");
            cancel.cancel();
        }
    }

    Ok(wait.await?)
}

const WATCH_HELP: &str = "commands: run <subcommand> | shell <line> | cancel <id> | \
pause | resume | refresh | status | quit";

/// Interactive loop: stdin lines drive the engine until `quit`, EOF or Ctrl+C
async fn watch(engine: &Engine) -> Result<()> {
    println!("{}", "Watching device status (Ctrl+C to exit)".cyan().bold());
    println!("{}", WATCH_HELP.dimmed());

    let mut lines = spawn_stdin_reader();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                return Ok(());
            }
            line = lines.recv(), if stdin_open => {
                match line {
                    Some(line) => {
                        if !handle_watch_line(engine, line.trim()).await {
                            return Ok(());
                        }
                    }
                    // Keep polling when stdin is closed (e.g. run from a service)
                    None => stdin_open = false,
                }
            }
        }
    }
}

/// Blocking stdin reads on a plain thread, so a pending read never holds up runtime shutdown
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Returns false on `quit`
async fn handle_watch_line(engine: &Engine, line: &str) -> bool {
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let submitted = match verb {
        "" => return true,
        "quit" | "exit" => return false,
        "run" if !rest.is_empty() => engine.run_helper(rest),
        "shell" if !rest.is_empty() => engine.run_shell(rest),
        "cancel" => {
            if !engine.cancel(&rest.to_string()) {
                println!("{} no pending command {}", "✗".red(), rest);
            }
            return true;
        }
        "pause" => {
            engine.polling().disable();
            println!("auto-refresh {}", "off".yellow());
            return true;
        }
        "resume" => {
            engine.polling().enable();
            println!("auto-refresh {}", "on".green());
            return true;
        }
        "refresh" => {
            if matches!(engine.refresh_status().await, PollOutcome::Skipped) {
                println!("{} privileged slot busy, try again later", "⚠".yellow());
            }
            return true;
        }
        "status" => {
            println!("{}", render_status_line(&engine.status()));
            return true;
        }
        _ => {
            println!("{}", WATCH_HELP.dimmed());
            return true;
        }
    };

    match submitted {
        Ok(ticket) => println!("queued {}", ticket.id()),
        Err(e) => println!("{} {}", "✗".red(), e),
    }
    true
}
