// Engine configuration (validated once at startup)

use crate::application::constants::*;
use crate::application::gate::GatePolicy;
use crate::application::queue::QueueConfig;
use crate::error::{AppError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path of the privileged helper script
    pub helper_path: PathBuf,

    /// Elevation wrapper (`sudo`), None to run the helper as is
    pub privilege_wrapper: Option<String>,

    /// Helper subcommand used as the status probe
    pub probe_subcommand: String,

    pub command_timeout: Duration,
    pub probe_timeout: Duration,
    pub shell_timeout: Duration,

    pub poll_interval: Duration,
    pub initial_poll_delay: Duration,

    /// Auto-refresh at startup
    pub polling_enabled: bool,

    pub policy: GatePolicy,

    /// Route unprivileged commands through the gate too
    pub route_unprivileged: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            helper_path: PathBuf::from(DEFAULT_HELPER_NAME),
            privilege_wrapper: Some(DEFAULT_PRIVILEGE_WRAPPER.to_string()),
            probe_subcommand: DEFAULT_PROBE_SUBCOMMAND.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            shell_timeout: DEFAULT_SHELL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            initial_poll_delay: DEFAULT_INITIAL_POLL_DELAY,
            polling_enabled: true,
            policy: GatePolicy::Queue,
            route_unprivileged: true,
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.helper_path.as_os_str().is_empty() {
            return Err(AppError::Config("helper path is empty".to_string()));
        }
        if self.probe_subcommand.trim().is_empty() {
            return Err(AppError::Config("probe subcommand is empty".to_string()));
        }
        for (name, value) in [
            ("command timeout", self.command_timeout),
            ("probe timeout", self.probe_timeout),
            ("shell timeout", self.shell_timeout),
            ("poll interval", self.poll_interval),
        ] {
            if value.is_zero() {
                return Err(AppError::Config(format!("{} must be greater than zero", name)));
            }
        }
        if self.probe_timeout > self.poll_interval {
            return Err(AppError::Config(format!(
                "probe timeout ({:?}) must not exceed poll interval ({:?})",
                self.probe_timeout, self.poll_interval
            )));
        }
        Ok(())
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            policy: self.policy,
            route_unprivileged: self.route_unprivileged,
        }
    }
}
