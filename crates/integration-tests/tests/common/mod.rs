//! Shared fixture: a fake helper script in a temp dir, run through the real
//! SubprocessRunner with `sh` as the privilege wrapper.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use suterm_core::application::{Engine, EngineConfig, EngineDeps, GatePolicy};
use suterm_core::port::event_sink::mocks::RecordingEventSink;
use suterm_core::port::id_provider::SequentialIdProvider;
use suterm_core::port::time_provider::SystemTimeProvider;
use suterm_infra_system::{SubprocessRunner, SysinfoResourceProbe};
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
    pub helper: PathBuf,
}

impl Fixture {
    /// Helper with the subcommands the scenarios need
    ///
    /// - `check`: prints `Root access: Granted` (or `garbage text` once `garbage` exists)
    /// - `sleep`: records its pid, then sleeps 5s
    /// - `hold`: sleeps 0.5s
    /// - `backup`: fails with `ERROR overlap` if another backup is running
    /// - `fail`: exits 3
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let helper = dir.path().join("Superuser_main");
        let d = dir.path().display();
        let script = format!(
            r#"case "$1" in
  check)
    if [ -f "{d}/garbage" ]; then
      echo "garbage text"
    else
      echo "Root access: Granted"
    fi
    ;;
  sleep)
    echo $$ > "{d}/pid"
    echo "sleeping"
    sleep 5
    ;;
  hold)
    sleep 0.5
    echo "held"
    ;;
  backup)
    if ! mkdir "{d}/backup.lock" 2>/dev/null; then
      echo "ERROR overlap"
      exit 9
    fi
    echo "backup running"
    sleep 0.3
    rmdir "{d}/backup.lock"
    echo "✓ backup done"
    ;;
  fail)
    echo "ERROR something broke" >&2
    exit 3
    ;;
  *)
    echo "unknown action: $1"
    exit 1
    ;;
esac
"#
        );
        std::fs::write(&helper, script).unwrap();
        Self { dir, helper }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn config(&self) -> EngineConfig {
        config_for(&self.helper)
    }

    pub fn engine(&self, config: EngineConfig) -> (Engine, Arc<RecordingEventSink>) {
        start_engine(config)
    }

    pub fn read_pid(&self) -> u32 {
        std::fs::read_to_string(self.path("pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }
}

pub fn config_for(helper: &Path) -> EngineConfig {
    EngineConfig {
        helper_path: helper.to_path_buf(),
        // Interpreter as wrapper: no exec bit needed on the script
        privilege_wrapper: Some("sh".to_string()),
        probe_subcommand: "check".to_string(),
        command_timeout: Duration::from_secs(10),
        probe_timeout: Duration::from_secs(5),
        shell_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_secs(30),
        initial_poll_delay: Duration::ZERO,
        polling_enabled: true,
        policy: GatePolicy::Queue,
        route_unprivileged: true,
    }
}

pub fn start_engine(config: EngineConfig) -> (Engine, Arc<RecordingEventSink>) {
    let sink = Arc::new(RecordingEventSink::new());
    let engine = Engine::start(
        config,
        EngineDeps {
            runner: Arc::new(SubprocessRunner::new(vec!["PATH".to_string()])),
            resources: Arc::new(SysinfoResourceProbe::new("/")),
            sink: sink.clone(),
            time_provider: Arc::new(SystemTimeProvider),
            id_provider: Arc::new(SequentialIdProvider::new("req")),
        },
    )
    .unwrap();
    (engine, sink)
}
