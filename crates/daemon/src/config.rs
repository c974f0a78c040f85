//! Application configuration
//!
//! Layers, lowest priority first:
//! 1. built-in defaults (`AppConfig::default`)
//! 2. TOML file: `--config <path>` or `<config_dir>/suterm/config.toml`
//! 3. `SUTERM_*` environment variables (`SUTERM_POLL_INTERVAL_SECS=10`)
//! 4. command-line flags, applied by the caller
//!
//! ```text
//! helper_path = "~/superuser/Superuser_main"
//! privilege_wrapper = "sudo -n"
//! gate_policy = "reject"
//! poll_interval_secs = 30
//! ```

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use suterm_core::application::constants::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_ENV_ALLOWLIST, DEFAULT_HELPER_NAME,
    DEFAULT_INITIAL_POLL_DELAY, DEFAULT_POLL_INTERVAL, DEFAULT_PRIVILEGE_WRAPPER,
    DEFAULT_PROBE_SUBCOMMAND, DEFAULT_PROBE_TIMEOUT, DEFAULT_SHELL_TIMEOUT,
};
use suterm_core::application::{EngineConfig, GatePolicy};

const ENV_PREFIX: &str = "SUTERM";
const CONFIG_FILE_NAME: &str = "config.toml";
const AUTO_WRAPPER: &str = "auto";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Helper script; empty means `Superuser_main` next to the binary
    pub helper_path: String,
    /// Elevation wrapper; empty or "none" runs the helper directly,
    /// "auto" picks the first of tsu/su/sudo found on PATH
    pub privilege_wrapper: String,
    pub probe_subcommand: String,

    pub command_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub shell_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub initial_poll_delay_ms: u64,
    pub auto_refresh: bool,

    pub gate_policy: GatePolicy,
    pub route_unprivileged: bool,
    pub env_allowlist: Vec<String>,

    /// Filesystem whose free space is reported; unset picks /data or /
    pub storage_path: Option<String>,

    /// `pretty` or `json`
    pub log_format: String,
    /// `tracing` filter used when RUST_LOG is unset
    pub log_filter: String,
    /// Daily rolling log files go here when set
    pub log_dir: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            helper_path: String::new(),
            privilege_wrapper: DEFAULT_PRIVILEGE_WRAPPER.to_string(),
            probe_subcommand: DEFAULT_PROBE_SUBCOMMAND.to_string(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT.as_secs(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
            shell_timeout_secs: DEFAULT_SHELL_TIMEOUT.as_secs(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            initial_poll_delay_ms: DEFAULT_INITIAL_POLL_DELAY.as_millis() as u64,
            auto_refresh: true,
            gate_policy: GatePolicy::Queue,
            route_unprivileged: true,
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            storage_path: None,
            log_format: "pretty".to_string(),
            log_filter: "suterm=info".to_string(),
            log_dir: None,
        }
    }
}

/// `<config_dir>/suterm/config.toml` for this platform
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "suterm").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

impl AppConfig {
    /// Load defaults, then the config file, then the environment
    ///
    /// An explicitly given file must exist; the default location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match explicit {
            Some(path) => {
                builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
            }
            None => {
                if let Some(path) = default_config_path() {
                    builder = builder
                        .add_source(File::from(path.as_path()).format(FileFormat::Toml).required(false));
                }
            }
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("env_allowlist"),
            )
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn resolved_helper_path(&self) -> PathBuf {
        if self.helper_path.trim().is_empty() {
            return std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_HELPER_NAME)))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HELPER_NAME));
        }
        PathBuf::from(shellexpand::tilde(self.helper_path.trim()).into_owned())
    }

    /// `privilege_wrapper = "auto"`: the caller detects the wrapper at startup
    pub fn auto_detect_wrapper(&self) -> bool {
        self.privilege_wrapper.trim().eq_ignore_ascii_case(AUTO_WRAPPER)
    }

    /// The configured wrapper; None for "none", empty and "auto"
    pub fn resolved_privilege_wrapper(&self) -> Option<String> {
        let wrapper = self.privilege_wrapper.trim();
        if wrapper.is_empty() || wrapper.eq_ignore_ascii_case("none") || self.auto_detect_wrapper() {
            None
        } else {
            Some(wrapper.to_string())
        }
    }

    pub fn resolved_storage_path(&self) -> Option<PathBuf> {
        self.storage_path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }

    pub fn resolved_log_dir(&self) -> Option<PathBuf> {
        self.log_dir
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            helper_path: self.resolved_helper_path(),
            privilege_wrapper: self.resolved_privilege_wrapper(),
            probe_subcommand: self.probe_subcommand.clone(),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            shell_timeout: Duration::from_secs(self.shell_timeout_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            initial_poll_delay: Duration::from_millis(self.initial_poll_delay_ms),
            polling_enabled: self.auto_refresh,
            policy: self.gate_policy,
            route_unprivileged: self.route_unprivileged,
        }
    }
}
