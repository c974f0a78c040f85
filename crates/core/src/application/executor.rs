//! Command executor - turns one runner invocation into log entries and a result
//!
//! The runner streams raw lines into a channel; this side classifies each line
//! and forwards it to the EventSink while the process is still running. The
//! result is built only after the channel is drained, so a command's result
//! always follows all of its own log lines.

use crate::application::cancel::CancelToken;
use crate::application::classifier::classify;
use crate::domain::{CommandOutcome, CommandRequest, CommandResult, LogEntry, Severity};
use crate::port::{EventSink, ProcessExit, ProcessRunner, RunError, Termination, TimeProvider};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct CommandExecutor {
    runner: Arc<dyn ProcessRunner>,
    sink: Arc<dyn EventSink>,
    time_provider: Arc<dyn TimeProvider>,
}

impl CommandExecutor {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        sink: Arc<dyn EventSink>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            runner,
            sink,
            time_provider,
        }
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    pub fn time_provider(&self) -> &Arc<dyn TimeProvider> {
        &self.time_provider
    }

    /// Emit an engine-level log line for a request
    pub fn log(&self, request: &CommandRequest, severity: Severity, text: impl Into<String>) {
        self.sink.on_log_entry(
            LogEntry::new(self.time_provider.now(), severity, text).for_request(request.id.clone()),
        );
    }

    /// Run the request to completion. Never fails: every error becomes a result.
    pub async fn execute(&self, request: &CommandRequest, cancel: CancelToken) -> CommandResult {
        let started_at = self.time_provider.now();

        if let Err(e) = request.validate() {
            self.log(request, Severity::Error, format!("Invalid command: {}", e));
            return CommandResult::not_run(&request.id, CommandOutcome::LaunchFailed, started_at);
        }

        info!(
            request_id = %request.id,
            label = %request.label,
            command = %request.command,
            timeout_ms = request.timeout.as_millis() as u64,
            "Starting command"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let run = self.runner.run(request, tx, cancel);
        let forward = async {
            let mut output = Vec::new();
            while let Some(line) = rx.recv().await {
                let entry = LogEntry::new(self.time_provider.now(), classify(&line), line.clone())
                    .for_request(request.id.clone());
                self.sink.on_log_entry(entry);
                output.push(line);
            }
            output
        };

        // The runner owns the only sender, so `forward` ends once the runner is done
        let (run_result, output) = tokio::join!(run, forward);
        let finished_at = self.time_provider.now();

        let result = match run_result {
            Ok(exit) => {
                let outcome = self.outcome_for(request, &exit);
                CommandResult::finished(
                    &request.id,
                    outcome,
                    exit.exit_code,
                    output,
                    started_at,
                    finished_at,
                )
            }
            Err(RunError::LaunchFailure(msg)) => {
                warn!(request_id = %request.id, error = %msg, "Command failed to launch");
                self.log(request, Severity::Error, format!("Launch failed: {}", msg));
                CommandResult::finished(
                    &request.id,
                    CommandOutcome::LaunchFailed,
                    None,
                    output,
                    started_at,
                    finished_at,
                )
            }
            Err(RunError::Io(msg)) => {
                warn!(request_id = %request.id, error = %msg, "Command IO failure");
                self.log(request, Severity::Error, format!("Command failed: {}", msg));
                CommandResult::finished(
                    &request.id,
                    CommandOutcome::NonZeroExit,
                    None,
                    output,
                    started_at,
                    finished_at,
                )
            }
        };

        info!(
            request_id = %request.id,
            outcome = %result.outcome,
            exit_code = ?result.exit_code,
            duration_ms = result.duration_ms(),
            lines = result.output.len(),
            "Command finished"
        );

        result
    }

    fn outcome_for(&self, request: &CommandRequest, exit: &ProcessExit) -> CommandOutcome {
        match exit.termination {
            Termination::Exited if exit.exit_code == Some(0) => CommandOutcome::Success,
            Termination::Exited => CommandOutcome::NonZeroExit,
            Termination::TimedOut => {
                self.log(
                    request,
                    Severity::Warn,
                    format!("Command timed out after {}s", request.timeout.as_secs_f64()),
                );
                CommandOutcome::TimedOut
            }
            Termination::Cancelled => {
                self.log(request, Severity::Warn, "Command cancelled");
                CommandOutcome::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::event_sink::mocks::RecordingEventSink;
    use crate::port::process_runner::mocks::{MockBehavior, MockProcessRunner};
    use crate::port::time_provider::SystemTimeProvider;
    use crate::application::cancel::cancel_channel;
    use std::time::Duration;

    fn executor(behavior: MockBehavior) -> (CommandExecutor, Arc<RecordingEventSink>) {
        let sink = Arc::new(RecordingEventSink::new());
        let executor = CommandExecutor::new(
            Arc::new(MockProcessRunner::new(behavior)),
            sink.clone(),
            Arc::new(SystemTimeProvider),
        );
        (executor, sink)
    }

    fn request(timeout: Duration) -> CommandRequest {
        CommandRequest::argv("req-1", ["helper", "check"], timeout).with_label("check")
    }

    #[tokio::test]
    async fn test_success_classifies_each_line_in_order() {
        let (executor, sink) = executor(MockBehavior::success(&[
            "Root access: Granted",
            "WARN selinux permissive",
            "✓ su binary ok",
            "ERROR busybox missing",
        ]));

        let result = executor
            .execute(&request(Duration::from_secs(5)), CancelToken::never())
            .await;

        assert_eq!(result.outcome, CommandOutcome::Success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.output.len(), 4);

        let logs = sink.logs();
        let severities: Vec<Severity> = logs.iter().map(|e| e.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Info, Severity::Warn, Severity::Success, Severity::Error]
        );
        assert!(logs.iter().all(|e| e.request_id.as_deref() == Some("req-1")));
        let texts: Vec<&str> = logs.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, result.output.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let (executor, _sink) = executor(MockBehavior::fail(3, &["ERROR: backup dir unwritable"]));
        let result = executor
            .execute(&request(Duration::from_secs(5)), CancelToken::never())
            .await;

        assert_eq!(result.outcome, CommandOutcome::NonZeroExit);
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_timeout_emits_single_warn() {
        let (executor, sink) = executor(MockBehavior::Hang {
            lines: vec!["starting".to_string()],
        });
        let result = executor
            .execute(&request(Duration::from_millis(50)), CancelToken::never())
            .await;

        assert!(result.timed_out);
        assert_eq!(result.outcome, CommandOutcome::TimedOut);
        let warns = sink.logs_with(Severity::Warn);
        assert_eq!(warns.len(), 1);
        assert!(warns[0].text.contains("timed out"));
    }

    #[tokio::test]
    async fn test_launch_failure_emits_error() {
        let (executor, sink) = executor(MockBehavior::LaunchFailure(
            "Superuser_main not found".to_string(),
        ));
        let result = executor
            .execute(&request(Duration::from_secs(5)), CancelToken::never())
            .await;

        assert_eq!(result.outcome, CommandOutcome::LaunchFailed);
        assert!(!result.is_success());
        let errors = sink.logs_with(Severity::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].text.contains("Superuser_main not found"));
    }

    #[tokio::test]
    async fn test_cancel_marks_result_cancelled() {
        let (executor, _sink) = executor(MockBehavior::Hang { lines: vec![] });
        let (handle, token) = cancel_channel();

        let req = request(Duration::from_secs(30));
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        };
        let (result, _) = tokio::join!(executor.execute(&req, token), canceller);

        assert!(result.cancelled);
        assert!(!result.timed_out);
        assert_eq!(result.outcome, CommandOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_runner() {
        let sink = Arc::new(RecordingEventSink::new());
        let runner = Arc::new(MockProcessRunner::new(MockBehavior::success(&[])));
        let executor = CommandExecutor::new(runner.clone(), sink.clone(), Arc::new(SystemTimeProvider));

        let req = CommandRequest::shell("bad", "  ", Duration::from_secs(1));
        let result = executor.execute(&req, CancelToken::never()).await;

        assert_eq!(result.outcome, CommandOutcome::LaunchFailed);
        assert_eq!(runner.call_count(), 0);
        assert_eq!(sink.logs_with(Severity::Error).len(), 1);
    }
}
