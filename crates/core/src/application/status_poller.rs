// Status Poller - periodic best-effort status probe
//
// State machine: Idle -> Polling -> (Idle | Failed), re-entering Polling on every
// tick while the PollingSwitch is on. A tick that finds the gate busy is skipped,
// never queued, so polling cannot delay a user action.

use crate::application::cancel::CancelToken;
use crate::application::executor::CommandExecutor;
use crate::application::gate::ExclusivityGate;
use crate::application::helper::HelperInvoker;
use crate::application::panic_guard::describe_join_error;
use crate::application::status_parser::{parse_probe_output, ProbeReport};
use crate::application::status_store::{PollingSwitch, StatusStore};
use crate::domain::{CommandResult, LogEntry, ResourceUsage, Severity, StatusSnapshot};
use crate::port::ResourceProbe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

const POLLER_HOLDER: &str = "status-poller";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    /// Last cycle failed; the previous snapshot is still published
    Failed,
}

/// What one poll cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Polling switched off, nothing ran
    Disabled,
    /// Gate busy, cycle skipped
    Skipped,
    /// New snapshot published
    Updated {
        snapshot: StatusSnapshot,
        result: CommandResult,
    },
    /// Probe failed or its output was unreadable; snapshot retained
    Failed(String),
    /// Polling was switched off while the probe ran; result dropped
    Discarded,
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub initial_delay: Duration,
    pub probe_subcommand: String,
    pub probe_timeout: Duration,
}

pub struct StatusPoller {
    executor: Arc<CommandExecutor>,
    gate: ExclusivityGate,
    invoker: Arc<HelperInvoker>,
    resources: Arc<dyn ResourceProbe>,
    store: StatusStore,
    switch: PollingSwitch,
    config: PollerConfig,
    state: Mutex<PollerState>,
}

impl StatusPoller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executor: Arc<CommandExecutor>,
        gate: ExclusivityGate,
        invoker: Arc<HelperInvoker>,
        resources: Arc<dyn ResourceProbe>,
        store: StatusStore,
        switch: PollingSwitch,
        config: PollerConfig,
    ) -> Self {
        Self {
            executor,
            gate,
            invoker,
            resources,
            store,
            switch,
            config,
            state: Mutex::new(PollerState::Idle),
        }
    }

    pub fn state(&self) -> PollerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    pub fn switch(&self) -> &PollingSwitch {
        &self.switch
    }

    /// Run the poll loop until `shutdown` fires
    ///
    /// Should be spawned in tokio::spawn
    pub async fn run(self: Arc<Self>, mut shutdown: CancelToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            probe = %self.config.probe_subcommand,
            "Status poller started"
        );

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Status poller stopped before first poll");
                return;
            }
            _ = sleep(self.config.initial_delay) => {}
        }

        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Status poller stopped");
                    break;
                }
                _ = tick.tick() => {
                    let outcome = self.tick().await;
                    debug!(outcome = ?outcome_name(&outcome), "Poll cycle finished");
                }
            }
        }
    }

    /// One scheduled cycle: honors the switch and skips when the gate is busy
    pub async fn tick(&self) -> PollOutcome {
        if !self.switch.is_enabled() {
            return PollOutcome::Disabled;
        }
        self.cycle(true).await
    }

    /// Manual refresh: ignores the switch, still never queues behind the gate
    pub async fn refresh(&self) -> PollOutcome {
        self.cycle(false).await
    }

    async fn cycle(&self, scheduled: bool) -> PollOutcome {
        let Some(slot) = self.gate.try_acquire(POLLER_HOLDER) else {
            debug!("Privileged slot busy, skipping status poll");
            return PollOutcome::Skipped;
        };

        self.set_state(PollerState::Polling);
        let request = self
            .invoker
            .request(&self.config.probe_subcommand, self.config.probe_timeout);

        // Own task, so a runner panic ends this cycle and not the poll loop
        let executor = Arc::clone(&self.executor);
        let task_request = request.clone();
        let probe =
            tokio::spawn(async move { executor.execute(&task_request, CancelToken::never()).await });

        let (joined, usage) = tokio::join!(probe, self.resources.sample());
        drop(slot);

        let result = match joined {
            Ok(result) => result,
            Err(join_err) => return self.fail(&request.id, describe_join_error(join_err)),
        };

        if scheduled && !self.switch.is_enabled() {
            self.set_state(PollerState::Idle);
            debug!(request_id = %request.id, "Polling disabled during probe, result discarded");
            return PollOutcome::Discarded;
        }

        if !result.is_success() {
            let reason = match result.exit_code {
                Some(code) => format!("{} (exit code {})", result.outcome, code),
                None => result.outcome.to_string(),
            };
            return self.fail(&request.id, reason);
        }

        let report = match parse_probe_output(&result.output) {
            Ok(report) => report,
            Err(e) => return self.fail(&request.id, e.to_string()),
        };

        let snapshot = self.merge(&report, usage, result.finished_at);
        self.store.replace(snapshot.clone());
        self.executor.sink().on_status_snapshot(snapshot.clone());
        self.set_state(PollerState::Idle);

        info!(
            root_granted = snapshot.root_granted,
            device_connected = snapshot.device_connected,
            memory_used_mb = snapshot.memory_used_mb,
            storage_free_bytes = snapshot.storage_free_bytes,
            "Status snapshot published"
        );

        PollOutcome::Updated { snapshot, result }
    }

    /// Build the next snapshot in one go.
    ///
    /// Root/device flags missing from the report keep their previous values;
    /// memory/storage reported by the helper win over the local sample.
    fn merge(
        &self,
        report: &ProbeReport,
        usage: ResourceUsage,
        captured_at: chrono::DateTime<chrono::Utc>,
    ) -> StatusSnapshot {
        let previous = self.store.current();
        let (memory_used_mb, memory_total_mb) = report
            .memory_mb
            .unwrap_or((usage.memory_used_mb, usage.memory_total_mb));

        StatusSnapshot {
            root_granted: report.root_granted.unwrap_or(previous.root_granted),
            device_connected: report.device_connected.unwrap_or(previous.device_connected),
            memory_used_mb,
            memory_total_mb,
            storage_free_bytes: report.storage_free_bytes.unwrap_or(usage.storage_free_bytes),
            captured_at,
        }
    }

    fn fail(&self, request_id: &str, reason: String) -> PollOutcome {
        warn!(request_id = %request_id, reason = %reason, "Status probe failed");
        self.executor.sink().on_log_entry(
            LogEntry::new(
                self.executor.time_provider().now(),
                Severity::Warn,
                format!("Status probe failed: {}", reason),
            )
            .for_request(request_id.to_string()),
        );
        self.set_state(PollerState::Failed);
        PollOutcome::Failed(reason)
    }

    fn set_state(&self, state: PollerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

fn outcome_name(outcome: &PollOutcome) -> &'static str {
    match outcome {
        PollOutcome::Disabled => "disabled",
        PollOutcome::Skipped => "skipped",
        PollOutcome::Updated { .. } => "updated",
        PollOutcome::Failed(_) => "failed",
        PollOutcome::Discarded => "discarded",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cancel::cancel_channel;
    use crate::domain::CommandOutcome;
    use crate::port::event_sink::mocks::RecordingEventSink;
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::process_runner::mocks::{MockBehavior, MockProcessRunner};
    use crate::port::resource_probe::mocks::MockResourceProbe;
    use crate::port::time_provider::SystemTimeProvider;
    use chrono::Utc;

    struct Harness {
        poller: Arc<StatusPoller>,
        runner: Arc<MockProcessRunner>,
        sink: Arc<RecordingEventSink>,
        gate: ExclusivityGate,
    }

    fn harness(behavior: MockBehavior) -> Harness {
        let runner = Arc::new(MockProcessRunner::new(behavior));
        let sink = Arc::new(RecordingEventSink::new());
        let executor = Arc::new(CommandExecutor::new(
            runner.clone(),
            sink.clone(),
            Arc::new(SystemTimeProvider),
        ));
        let gate = ExclusivityGate::new();
        let invoker = Arc::new(HelperInvoker::new(
            "/opt/su/Superuser_main",
            None,
            Arc::new(SequentialIdProvider::new("probe")),
        ));
        let poller = Arc::new(StatusPoller::new(
            executor,
            gate.clone(),
            invoker,
            Arc::new(MockResourceProbe::new(512, 2048, 4096)),
            StatusStore::new(StatusSnapshot::unknown(Utc::now())),
            PollingSwitch::default(),
            PollerConfig {
                interval: Duration::from_millis(40),
                initial_delay: Duration::ZERO,
                probe_subcommand: "check".to_string(),
                probe_timeout: Duration::from_secs(5),
            },
        ));
        Harness {
            poller,
            runner,
            sink,
            gate,
        }
    }

    #[tokio::test]
    async fn test_root_granted_probe_publishes_snapshot() {
        let h = harness(MockBehavior::success(&["Root access: Granted"]));

        let outcome = h.poller.tick().await;
        let PollOutcome::Updated { snapshot, result } = outcome else {
            panic!("expected update, got {:?}", outcome);
        };

        assert_eq!(result.outcome, CommandOutcome::Success);
        assert!(snapshot.root_granted);
        assert!(h.poller.store().root_granted());
        assert_eq!(snapshot.memory_total_mb, 2048);
        assert_eq!(snapshot.storage_free_bytes, 4096);
        assert_eq!(h.sink.logs_with(Severity::Info).len(), 1);
        assert_eq!(h.sink.snapshots(), vec![snapshot]);
        assert_eq!(h.poller.state(), PollerState::Idle);
        assert!(!h.gate.is_busy());
    }

    #[tokio::test]
    async fn test_garbage_output_keeps_previous_snapshot() {
        let h = harness(MockBehavior::success(&["Root access: Granted", "Device: Connected"]));
        h.poller.tick().await;
        let before = h.poller.store().current();

        h.runner.set_behavior(MockBehavior::success(&["garbage text"]));
        let outcome = h.poller.tick().await;

        assert!(matches!(outcome, PollOutcome::Failed(_)));
        assert_eq!(h.poller.store().current(), before);
        assert_eq!(h.sink.logs_with(Severity::Warn).len(), 1);
        assert_eq!(h.sink.snapshots().len(), 1);
        assert_eq!(h.poller.state(), PollerState::Failed);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_probe_failure() {
        let h = harness(MockBehavior::fail(1, &["Root access: Granted"]));
        let before = h.poller.store().current();

        let outcome = h.poller.tick().await;

        assert!(matches!(outcome, PollOutcome::Failed(ref r) if r.contains("exit code 1")));
        assert_eq!(h.poller.store().current(), before);
    }

    #[tokio::test]
    async fn test_busy_gate_skips_cycle() {
        let h = harness(MockBehavior::success(&["Root access: Granted"]));
        let _held = h.gate.try_acquire("user-backup").unwrap();

        assert_eq!(h.poller.tick().await, PollOutcome::Skipped);
        assert_eq!(h.runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_switch_does_nothing_but_refresh_runs() {
        let h = harness(MockBehavior::success(&["Device: Connected"]));
        h.poller.switch().disable();

        assert_eq!(h.poller.tick().await, PollOutcome::Disabled);
        assert_eq!(h.runner.call_count(), 0);

        assert!(matches!(h.poller.refresh().await, PollOutcome::Updated { .. }));
        assert!(h.poller.store().device_connected());
    }

    #[tokio::test]
    async fn test_disable_during_probe_discards_result() {
        let h = harness(MockBehavior::slow(
            &["Root access: Granted"],
            Duration::from_millis(80),
        ));

        let poller = h.poller.clone();
        let cycle = tokio::spawn(async move { poller.tick().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.poller.switch().disable();

        assert_eq!(cycle.await.unwrap(), PollOutcome::Discarded);
        assert!(!h.poller.store().root_granted());
        assert!(h.sink.snapshots().is_empty());
        // Lines of the in-flight probe are still logged
        assert_eq!(h.sink.logs().len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_runner_fails_the_cycle() {
        let h = harness(MockBehavior::Panic("runner blew up".to_string()));
        h.poller.tick().await;
        let before = h.poller.store().current();

        let outcome = h.poller.tick().await;

        assert!(matches!(outcome, PollOutcome::Failed(ref r) if r.contains("runner blew up")));
        assert_eq!(h.poller.state(), PollerState::Failed);
        assert_eq!(h.poller.store().current(), before);
        assert_eq!(h.sink.logs_with(Severity::Warn).len(), 2);
        assert!(!h.gate.is_busy());
    }

    #[tokio::test]
    async fn test_run_loop_survives_runner_panic() {
        let h = harness(MockBehavior::Panic("runner blew up".to_string()));
        let (handle, token) = cancel_channel();

        let task = tokio::spawn(h.poller.clone().run(token));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!task.is_finished());
        assert!(!h.sink.logs_with(Severity::Warn).is_empty());

        h.runner.set_behavior(MockBehavior::success(&["Root access: Granted"]));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(h.poller.store().root_granted());
        assert_eq!(h.poller.state(), PollerState::Idle);

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("poller should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_loop_polls_until_shutdown() {
        let h = harness(MockBehavior::success(&["Root access: Denied"]));
        let (handle, token) = cancel_channel();

        let task = tokio::spawn(h.poller.clone().run(token));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("poller should stop")
            .unwrap();

        assert!(h.runner.call_count() >= 2);
        assert!(!h.sink.snapshots().is_empty());
    }
}
