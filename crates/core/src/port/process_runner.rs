// Process Runner Port
// Abstraction for launching one external command and streaming its output

use crate::application::cancel::CancelToken;
use crate::domain::CommandRequest;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Channel the runner pushes raw output lines into, in production order
pub type LineSender = mpsc::UnboundedSender<String>;

/// Why the process stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own
    Exited,
    /// Killed at the request deadline
    TimedOut,
    /// Killed on caller request
    Cancelled,
}

/// What the runner observed once the process is gone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub termination: Termination,
    /// None if the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl ProcessExit {
    pub fn exited(exit_code: Option<i32>) -> Self {
        Self {
            termination: Termination::Exited,
            exit_code,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            termination: Termination::TimedOut,
            exit_code: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            termination: Termination::Cancelled,
            exit_code: None,
        }
    }
}

/// Runner errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Program or required file missing, spawn refused. Never retried.
    #[error("Launch failed: {0}")]
    LaunchFailure(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Process Runner trait
///
/// Implementations:
/// - SubprocessRunner (infra-system): spawns a real child process
/// - MockProcessRunner (below): scripted behavior for tests
///
/// Contract:
/// - every output line goes into `lines` before `run` returns
/// - the deadline is `request.timeout`; on expiry the process is killed and
///   `Termination::TimedOut` returned
/// - once `cancel` fires the process is killed and `Termination::Cancelled` returned
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Launch the request and wait until the process is gone
    ///
    /// # Errors
    /// - RunError::LaunchFailure if the process cannot be started
    /// - RunError::Io if waiting on the child fails
    async fn run(
        &self,
        request: &CommandRequest,
        lines: LineSender,
        cancel: CancelToken,
    ) -> Result<ProcessExit, RunError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock runner behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Print lines, stay alive for `delay`, then exit with `code`
        Exit {
            lines: Vec<String>,
            code: i32,
            delay: Duration,
        },
        /// Print lines, then never exit on its own
        Hang { lines: Vec<String> },
        /// Refuse to launch
        LaunchFailure(String),
        /// Panic inside the runner (fault isolation testing)
        Panic(String),
    }

    impl MockBehavior {
        pub fn success(lines: &[&str]) -> Self {
            MockBehavior::Exit {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                code: 0,
                delay: Duration::ZERO,
            }
        }

        pub fn slow(lines: &[&str], delay: Duration) -> Self {
            MockBehavior::Exit {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                code: 0,
                delay,
            }
        }

        pub fn fail(code: i32, lines: &[&str]) -> Self {
            MockBehavior::Exit {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                code,
                delay: Duration::ZERO,
            }
        }
    }

    /// Mock Process Runner for testing
    ///
    /// Behavior is picked by request label, falling back to the default.
    /// Tracks how many runs overlap so gate tests can assert exclusivity.
    pub struct MockProcessRunner {
        default_behavior: Mutex<MockBehavior>,
        by_label: Mutex<HashMap<String, MockBehavior>>,
        call_count: AtomicUsize,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    impl MockProcessRunner {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                default_behavior: Mutex::new(behavior),
                by_label: Mutex::new(HashMap::new()),
                call_count: AtomicUsize::new(0),
                active: Arc::new(AtomicUsize::new(0)),
                max_active: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn with_label(self, label: impl Into<String>, behavior: MockBehavior) -> Self {
            self.by_label.lock().unwrap().insert(label.into(), behavior);
            self
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.default_behavior.lock().unwrap() = behavior;
        }

        pub fn set_label_behavior(&self, label: impl Into<String>, behavior: MockBehavior) {
            self.by_label.lock().unwrap().insert(label.into(), behavior);
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn active(&self) -> usize {
            self.active.load(Ordering::SeqCst)
        }

        /// Highest number of runs observed in flight at the same instant
        pub fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }

        fn behavior_for(&self, label: &str) -> MockBehavior {
            if let Some(behavior) = self.by_label.lock().unwrap().get(label) {
                return behavior.clone();
            }
            self.default_behavior.lock().unwrap().clone()
        }
    }

    /// Decrements the active counter even if the run panics
    struct ActiveGuard(Arc<AtomicUsize>);

    impl ActiveGuard {
        fn enter(active: &Arc<AtomicUsize>, max_active: &AtomicUsize) -> Self {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            max_active.fetch_max(now, Ordering::SeqCst);
            Self(Arc::clone(active))
        }
    }

    impl Drop for ActiveGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ProcessRunner for MockProcessRunner {
        async fn run(
            &self,
            request: &CommandRequest,
            lines: LineSender,
            mut cancel: CancelToken,
        ) -> Result<ProcessExit, RunError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let behavior = self.behavior_for(&request.label);
            let _active = ActiveGuard::enter(&self.active, &self.max_active);

            let (output, code, delay) = match behavior {
                MockBehavior::LaunchFailure(msg) => return Err(RunError::LaunchFailure(msg)),
                MockBehavior::Panic(msg) => panic!("{}", msg),
                MockBehavior::Exit {
                    lines: out,
                    code,
                    delay,
                } => (out, Some(code), Some(delay)),
                MockBehavior::Hang { lines: out } => (out, None, None),
            };

            for line in output {
                let _ = lines.send(line);
            }

            let exit = async move {
                match delay {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = exit => Ok(ProcessExit::exited(code)),
                _ = tokio::time::sleep(request.timeout) => Ok(ProcessExit::timed_out()),
                _ = cancel.cancelled() => Ok(ProcessExit::cancelled()),
            }
        }
    }
}
