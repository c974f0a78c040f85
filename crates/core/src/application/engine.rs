// Engine - wires gate, executor, queue and poller behind one handle
//
// Composition of the core services; adapters (runner, probe, sink) come in
// from the outside, the daemon owns the Engine.

use crate::application::cancel::{cancel_channel, CancelHandle};
use crate::application::config::EngineConfig;
use crate::application::executor::CommandExecutor;
use crate::application::gate::ExclusivityGate;
use crate::application::helper::HelperInvoker;
use crate::application::queue::{CommandService, CommandTicket, SubmitError};
use crate::application::status_poller::{PollOutcome, PollerConfig, StatusPoller};
use crate::application::status_store::{PollingSwitch, StatusStore};
use crate::domain::{RequestId, StatusSnapshot};
use crate::error::Result;
use crate::port::{EventSink, IdProvider, ProcessRunner, ResourceProbe, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Outside collaborators the engine runs on
pub struct EngineDeps {
    pub runner: Arc<dyn ProcessRunner>,
    pub resources: Arc<dyn ResourceProbe>,
    pub sink: Arc<dyn EventSink>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub id_provider: Arc<dyn IdProvider>,
}

pub struct Engine {
    config: EngineConfig,
    gate: ExclusivityGate,
    invoker: Arc<HelperInvoker>,
    service: CommandService,
    poller: Arc<StatusPoller>,
    shutdown: CancelHandle,
    queue_task: JoinHandle<()>,
    poller_task: Option<JoinHandle<()>>,
}

impl Engine {
    /// Validate the config and start the queue worker.
    ///
    /// The poll loop is not started here; call `start_polling` for that
    /// (one-shot CLI commands never need it).
    ///
    /// # Errors
    /// AppError::Config if the configuration is invalid
    pub fn start(config: EngineConfig, deps: EngineDeps) -> Result<Self> {
        config.validate()?;

        let executor = Arc::new(CommandExecutor::new(
            deps.runner,
            Arc::clone(&deps.sink),
            Arc::clone(&deps.time_provider),
        ));
        let gate = ExclusivityGate::new();
        let invoker = Arc::new(HelperInvoker::new(
            config.helper_path.clone(),
            config.privilege_wrapper.clone(),
            deps.id_provider,
        ));

        let (service, queue_task) =
            CommandService::spawn(Arc::clone(&executor), gate.clone(), config.queue_config());

        let poller = Arc::new(StatusPoller::new(
            executor,
            gate.clone(),
            Arc::clone(&invoker),
            deps.resources,
            StatusStore::new(StatusSnapshot::unknown(deps.time_provider.now())),
            PollingSwitch::new(config.polling_enabled),
            PollerConfig {
                interval: config.poll_interval,
                initial_delay: config.initial_poll_delay,
                probe_subcommand: config.probe_subcommand.clone(),
                probe_timeout: config.probe_timeout,
            },
        ));

        let (shutdown, _) = cancel_channel();

        info!(
            helper = %config.helper_path.display(),
            policy = ?config.policy,
            "Engine started"
        );

        Ok(Self {
            config,
            gate,
            invoker,
            service,
            poller,
            shutdown,
            queue_task,
            poller_task: None,
        })
    }

    /// Spawn the periodic status poller (idempotent)
    pub fn start_polling(&mut self) {
        if self.poller_task.is_some() {
            return;
        }
        let token = self.shutdown.token();
        self.poller_task = Some(tokio::spawn(Arc::clone(&self.poller).run(token)));
    }

    /// Queue `<wrapper> <helper> <subcommand>` with the command timeout
    pub fn run_helper(&self, subcommand: &str) -> std::result::Result<CommandTicket, SubmitError> {
        self.run_helper_with_timeout(subcommand, self.config.command_timeout)
    }

    pub fn run_helper_with_timeout(
        &self,
        subcommand: &str,
        timeout: Duration,
    ) -> std::result::Result<CommandTicket, SubmitError> {
        self.service.submit(self.invoker.request(subcommand, timeout))
    }

    /// Queue an unprivileged shell line
    pub fn run_shell(&self, line: &str) -> std::result::Result<CommandTicket, SubmitError> {
        self.service.submit(self.invoker.shell(line, self.config.shell_timeout))
    }

    pub fn cancel(&self, request_id: &RequestId) -> bool {
        self.service.cancel(request_id)
    }

    /// Probe status right away (ignores the polling switch)
    pub async fn refresh_status(&self) -> PollOutcome {
        self.poller.refresh().await
    }

    pub fn status(&self) -> StatusSnapshot {
        self.poller.store().current()
    }

    pub fn status_store(&self) -> &StatusStore {
        self.poller.store()
    }

    pub fn polling(&self) -> &PollingSwitch {
        self.poller.switch()
    }

    pub fn service(&self) -> &CommandService {
        &self.service
    }

    pub fn gate(&self) -> &ExclusivityGate {
        &self.gate
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop polling, let queued commands finish, then wait for both tasks
    pub async fn shutdown(self) {
        info!(pending = self.service.pending(), "Engine shutting down");
        self.shutdown.cancel();

        if let Some(task) = self.poller_task {
            if let Err(e) = task.await {
                error!(error = %e, "Status poller task failed");
            }
        }

        drop(self.service);
        drop(self.poller);
        if let Err(e) = self.queue_task.await {
            error!(error = %e, "Queue worker task failed");
        }
        info!("Engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::gate::GatePolicy;
    use crate::domain::{CommandOutcome, Severity};
    use crate::port::event_sink::mocks::RecordingEventSink;
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::process_runner::mocks::{MockBehavior, MockProcessRunner};
    use crate::port::resource_probe::mocks::MockResourceProbe;
    use crate::port::time_provider::SystemTimeProvider;

    fn engine(runner: Arc<MockProcessRunner>, config: EngineConfig) -> (Engine, Arc<RecordingEventSink>) {
        let sink = Arc::new(RecordingEventSink::new());
        let engine = Engine::start(
            config,
            EngineDeps {
                runner,
                resources: Arc::new(MockResourceProbe::new(100, 200, 300)),
                sink: sink.clone(),
                time_provider: Arc::new(SystemTimeProvider),
                id_provider: Arc::new(SequentialIdProvider::new("req")),
            },
        )
        .unwrap();
        (engine, sink)
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = EngineConfig {
            shell_timeout: Duration::ZERO,
            ..Default::default()
        };
        let result = Engine::start(
            config,
            EngineDeps {
                runner: Arc::new(MockProcessRunner::new(MockBehavior::success(&[]))),
                resources: Arc::new(MockResourceProbe::new(0, 0, 0)),
                sink: Arc::new(RecordingEventSink::new()),
                time_provider: Arc::new(SystemTimeProvider),
                id_provider: Arc::new(SequentialIdProvider::new("req")),
            },
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_helper_command_completes_once() {
        let runner = Arc::new(MockProcessRunner::new(MockBehavior::success(&[
            "✓ Backup written",
        ])));
        let (engine, sink) = engine(runner, EngineConfig::default());

        let ticket = engine.run_helper("backup").unwrap();
        let result = ticket.wait().await.unwrap();

        assert_eq!(result.outcome, CommandOutcome::Success);
        assert_eq!(sink.wait_for_completions(1).await.len(), 1);
        assert_eq!(sink.logs_with(Severity::Success).len(), 1);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_updates_status() {
        let runner = Arc::new(MockProcessRunner::new(MockBehavior::success(&[
            "Root access: Granted",
            "Device: Connected",
        ])));
        let (engine, _sink) = engine(runner, EngineConfig::default());

        assert!(!engine.status().root_granted);
        assert!(matches!(engine.refresh_status().await, PollOutcome::Updated { .. }));
        assert!(engine.status().root_granted);
        assert!(engine.status_store().device_connected());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_reject_policy_second_backup_busy() {
        let runner = Arc::new(MockProcessRunner::new(MockBehavior::slow(
            &["backing up"],
            Duration::from_millis(100),
        )));
        let config = EngineConfig {
            policy: GatePolicy::Reject,
            ..Default::default()
        };
        let (engine, _sink) = engine(runner, config);

        let first = engine.run_helper("backup").unwrap();
        assert!(matches!(engine.run_helper("backup"), Err(SubmitError::GateBusy)));
        assert!(first.wait().await.unwrap().is_success());
        assert!(engine.run_helper("backup").is_ok());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_polling_stops_on_shutdown() {
        let runner = Arc::new(MockProcessRunner::new(MockBehavior::success(&[
            "Root access: Denied",
        ])));
        let config = EngineConfig {
            poll_interval: Duration::from_millis(30),
            probe_timeout: Duration::from_millis(30),
            initial_poll_delay: Duration::ZERO,
            ..Default::default()
        };
        let (mut engine, sink) = engine(runner.clone(), config);
        engine.start_polling();

        tokio::time::sleep(Duration::from_millis(80)).await;
        tokio::time::timeout(Duration::from_secs(1), engine.shutdown())
            .await
            .expect("shutdown should not hang");

        assert!(runner.call_count() >= 1);
        assert!(!sink.snapshots().is_empty());
    }
}
