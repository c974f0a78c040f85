// Engine constants (no magic values in the services)
use std::time::Duration;

/// Interval between status polls (30s)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Delay before the first poll after start (1s)
pub const DEFAULT_INITIAL_POLL_DELAY: Duration = Duration::from_secs(1);

/// Deadline for user-initiated helper commands (10 minutes)
/// Backups and performance tests run for minutes; this is a safety net, not a budget.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Deadline for status probes (15s)
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Deadline for ad-hoc shell lines (30s)
pub const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(30);

/// Time between SIGTERM and SIGKILL when terminating a command (2s)
pub const GRACEFUL_KILL_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to keep draining output readers after the process is gone (1s)
/// Grandchildren that inherited the pipes may keep them open.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Helper subcommand used as the status probe
pub const DEFAULT_PROBE_SUBCOMMAND: &str = "check";

/// Wrapper that elevates helper invocations
pub const DEFAULT_PRIVILEGE_WRAPPER: &str = "sudo";

/// Helper script name, looked up next to the binary when no path is configured
pub const DEFAULT_HELPER_NAME: &str = "Superuser_main";

/// Environment variables passed through to child processes
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "USER", "LANG", "TERM"];
