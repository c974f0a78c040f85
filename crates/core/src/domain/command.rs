// Command Domain Model - requests submitted to the engine and their terminal results

use super::error::{DomainError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Request ID (UUID v4 in production, see IdProvider)
pub type RequestId = String;

/// What to launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSpec {
    /// Argument tokens, the first one is the program
    Argv(Vec<String>),
    /// A line handed to `sh -c`
    Shell(String),
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandSpec::Argv(tokens) => write!(f, "{}", tokens.join(" ")),
            CommandSpec::Shell(line) => write!(f, "sh -c {:?}", line),
        }
    }
}

/// A command submitted to the engine.
///
/// Immutable once submitted: the queue and the runner only ever borrow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub id: RequestId,
    /// Short human name ("check", "backup", ...), used in logs
    pub label: String,
    pub command: CommandSpec,
    pub timeout: Duration,
    pub requires_privilege: bool,
    /// File that must exist before launch (e.g. the helper script)
    pub required_path: Option<PathBuf>,
}

impl CommandRequest {
    /// Create a request for an argument vector
    pub fn argv(
        id: impl Into<RequestId>,
        tokens: impl IntoIterator<Item = impl Into<String>>,
        timeout: Duration,
    ) -> Self {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let label = tokens.first().cloned().unwrap_or_default();
        Self {
            id: id.into(),
            label,
            command: CommandSpec::Argv(tokens),
            timeout,
            requires_privilege: false,
            required_path: None,
        }
    }

    /// Create a request for a shell line
    pub fn shell(id: impl Into<RequestId>, line: impl Into<String>, timeout: Duration) -> Self {
        let line = line.into();
        Self {
            id: id.into(),
            label: line.clone(),
            command: CommandSpec::Shell(line),
            timeout,
            requires_privilege: false,
            required_path: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn privileged(mut self, requires_privilege: bool) -> Self {
        self.requires_privilege = requires_privilege;
        self
    }

    pub fn requiring_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.required_path = Some(path.into());
        self
    }

    /// Check the request can be handed to a runner
    pub fn validate(&self) -> Result<()> {
        match &self.command {
            CommandSpec::Argv(tokens) if tokens.is_empty() || tokens[0].trim().is_empty() => {
                return Err(DomainError::EmptyCommand);
            }
            CommandSpec::Shell(line) if line.trim().is_empty() => {
                return Err(DomainError::EmptyCommand);
            }
            _ => {}
        }

        if self.timeout.is_zero() {
            return Err(DomainError::InvalidTimeout(
                "timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// How a command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandOutcome {
    /// Exited with status 0
    Success,
    /// Ran to completion with a non-zero (or signal) status
    NonZeroExit,
    /// Killed at the deadline
    TimedOut,
    /// Killed (or never started) on caller request
    Cancelled,
    /// Program or required file missing, spawn refused
    LaunchFailed,
    /// The execution task itself panicked
    Faulted,
}

impl std::fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandOutcome::Success => write!(f, "SUCCESS"),
            CommandOutcome::NonZeroExit => write!(f, "NON_ZERO_EXIT"),
            CommandOutcome::TimedOut => write!(f, "TIMED_OUT"),
            CommandOutcome::Cancelled => write!(f, "CANCELLED"),
            CommandOutcome::LaunchFailed => write!(f, "LAUNCH_FAILED"),
            CommandOutcome::Faulted => write!(f, "FAULTED"),
        }
    }
}

/// Terminal result of one accepted request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub request_id: RequestId,
    pub outcome: CommandOutcome,
    /// None when the process never started or was killed by a signal
    pub exit_code: Option<i32>,
    /// Combined stdout/stderr lines, in arrival order
    pub output: Vec<String>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CommandResult {
    /// Result for a process that was launched and has stopped (by itself or killed)
    pub fn finished(
        request_id: impl Into<RequestId>,
        outcome: CommandOutcome,
        exit_code: Option<i32>,
        output: Vec<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            outcome,
            exit_code,
            output,
            timed_out: outcome == CommandOutcome::TimedOut,
            cancelled: outcome == CommandOutcome::Cancelled,
            started_at,
            finished_at,
        }
    }

    /// Result for a request that never produced a running process
    pub fn not_run(
        request_id: impl Into<RequestId>,
        outcome: CommandOutcome,
        at: DateTime<Utc>,
    ) -> Self {
        Self::finished(request_id, outcome, None, Vec::new(), at, at)
    }

    pub fn is_success(&self) -> bool {
        self.outcome == CommandOutcome::Success
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
