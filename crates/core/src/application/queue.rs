//! Command queue - the front door for user-initiated commands
//!
//! `submit` never blocks: it validates, applies the admission policy and hands
//! the request to a single long-lived worker task. The worker takes gated
//! requests one at a time in submission order, acquires the execution slot,
//! runs the command on its own task (panic isolation) and delivers the result
//! exactly once: to the EventSink and to the caller's `CommandTicket`.

use crate::application::cancel::{cancel_channel, CancelHandle, CancelToken};
use crate::application::executor::CommandExecutor;
use crate::application::gate::{ExclusivityGate, GatePolicy};
use crate::application::panic_guard::describe_join_error;
use crate::domain::{CommandOutcome, CommandRequest, CommandResult, DomainError, RequestId, Severity};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Submission errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Reject policy: another privileged request is queued or running
    #[error("Privileged slot is busy, request rejected")]
    GateBusy,

    /// Another accepted request with the same ID has not finished yet
    #[error("Request {0} is already pending")]
    DuplicateId(RequestId),

    /// The queue worker is gone (engine shut down)
    #[error("Command queue closed")]
    Closed,

    #[error("Invalid request: {0}")]
    Invalid(#[from] DomainError),
}

/// Caller's handle on one accepted request
#[derive(Debug)]
pub struct CommandTicket {
    id: RequestId,
    cancel: CancelHandle,
    result: oneshot::Receiver<CommandResult>,
}

impl CommandTicket {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Request cancellation. Queued requests complete as cancelled without launching.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the terminal result
    pub async fn wait(self) -> Result<CommandResult, SubmitError> {
        self.result.await.map_err(|_| SubmitError::Closed)
    }
}

/// Queue settings
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub policy: GatePolicy,
    /// Route `requires_privilege == false` requests through the gate too
    pub route_unprivileged: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            policy: GatePolicy::Queue,
            route_unprivileged: true,
        }
    }
}

struct QueuedCommand {
    request: CommandRequest,
    cancel: CancelToken,
    reply: oneshot::Sender<CommandResult>,
    /// Holds the reject-policy admission flag
    admitted: bool,
}

/// Shared state between the service handles and the worker
struct QueueState {
    /// Reject policy: a gated request is queued or running
    admitted: AtomicBool,
    pending: Mutex<HashMap<RequestId, CancelHandle>>,
}

impl QueueState {
    fn pending(&self) -> MutexGuard<'_, HashMap<RequestId, CancelHandle>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cloneable handle used by the interface layer to submit and cancel commands
#[derive(Clone)]
pub struct CommandService {
    tx: mpsc::UnboundedSender<QueuedCommand>,
    config: QueueConfig,
    state: Arc<QueueState>,
}

impl CommandService {
    /// Start the queue worker. It stops once every `CommandService` clone is
    /// dropped and the remaining queued requests are finished.
    pub fn spawn(
        executor: Arc<CommandExecutor>,
        gate: ExclusivityGate,
        config: QueueConfig,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState {
            admitted: AtomicBool::new(false),
            pending: Mutex::new(HashMap::new()),
        });

        let worker = QueueWorker {
            executor,
            gate,
            config,
            state: Arc::clone(&state),
        };
        let handle = tokio::spawn(worker.run(rx));

        (Self { tx, config, state }, handle)
    }

    /// Submit a request without waiting for it
    ///
    /// # Errors
    /// - SubmitError::Invalid if the request fails validation
    /// - SubmitError::DuplicateId if a request with the same ID is still pending
    /// - SubmitError::GateBusy under the Reject policy while another gated request is admitted
    /// - SubmitError::Closed if the worker has stopped
    pub fn submit(&self, request: CommandRequest) -> Result<CommandTicket, SubmitError> {
        request.validate()?;

        let gated = self.is_gated(&request);
        let admitted = gated && self.config.policy == GatePolicy::Reject;
        let (cancel_handle, cancel_token) = cancel_channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        let id = request.id.clone();

        {
            // Duplicate check, admission and registration under one lock
            let mut pending = self.state.pending();
            if pending.contains_key(&id) {
                warn!(request_id = %id, label = %request.label, "Rejected: request ID already pending");
                return Err(SubmitError::DuplicateId(id));
            }
            if admitted
                && self
                    .state
                    .admitted
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                warn!(request_id = %id, label = %request.label, "Rejected: privileged slot busy");
                return Err(SubmitError::GateBusy);
            }
            pending.insert(id.clone(), cancel_handle.clone());
        }

        info!(request_id = %id, label = %request.label, gated, "Command queued");

        let queued = QueuedCommand {
            request,
            cancel: cancel_token,
            reply: reply_tx,
            admitted,
        };
        if self.tx.send(queued).is_err() {
            self.state.pending().remove(&id);
            if admitted {
                self.state.admitted.store(false, Ordering::SeqCst);
            }
            return Err(SubmitError::Closed);
        }

        Ok(CommandTicket {
            id,
            cancel: cancel_handle,
            result: reply_rx,
        })
    }

    /// Cancel a queued or running request by ID. Returns false if it is unknown or finished.
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        match self.state.pending().get(request_id) {
            Some(handle) => {
                info!(request_id = %request_id, "Cancelling command");
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Requests accepted but not yet finished
    pub fn pending(&self) -> usize {
        self.state.pending().len()
    }

    fn is_gated(&self, request: &CommandRequest) -> bool {
        request.requires_privilege || self.config.route_unprivileged
    }
}

struct QueueWorker {
    executor: Arc<CommandExecutor>,
    gate: ExclusivityGate,
    config: QueueConfig,
    state: Arc<QueueState>,
}

impl QueueWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<QueuedCommand>) {
        info!(policy = ?self.config.policy, "Command queue worker started");
        let worker = Arc::new(self);

        // Gated requests run one at a time, in submission order, on their own lane
        // so an ungated request is never stuck behind a long privileged one
        let (gated_tx, mut gated_rx) = mpsc::unbounded_channel::<QueuedCommand>();
        let lane_worker = Arc::clone(&worker);
        let lane = tokio::spawn(async move {
            while let Some(queued) = gated_rx.recv().await {
                lane_worker.process(queued).await;
            }
        });

        while let Some(queued) = rx.recv().await {
            let gated = queued.request.requires_privilege || worker.config.route_unprivileged;
            if gated {
                if let Err(mpsc::error::SendError(queued)) = gated_tx.send(queued) {
                    // Lane gone, run inline
                    worker.process(queued).await;
                }
            } else {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move { worker.process(queued).await });
            }
        }

        drop(gated_tx);
        if let Err(e) = lane.await {
            warn!(error = %e, "Gated command lane failed");
        }
        info!("Command queue worker stopped");
    }

    async fn process(&self, queued: QueuedCommand) {
        let QueuedCommand {
            request,
            cancel,
            reply,
            admitted,
        } = queued;

        let gated = request.requires_privilege || self.config.route_unprivileged;
        let result = self.execute(&request, cancel, gated).await;

        // Bookkeeping first so the caller can resubmit as soon as it sees the result
        self.state.pending().remove(&request.id);
        if admitted {
            self.state.admitted.store(false, Ordering::SeqCst);
        }

        self.executor.sink().on_command_complete(&request.id, &result);
        if reply.send(result).is_err() {
            info!(request_id = %request.id, "Ticket dropped before completion, result delivered to sink only");
        }
    }

    async fn execute(
        &self,
        request: &CommandRequest,
        mut cancel: CancelToken,
        gated: bool,
    ) -> CommandResult {
        let now = || self.executor.time_provider().now();

        if cancel.is_cancelled() {
            self.executor
                .log(request, Severity::Warn, "Command cancelled before start");
            return CommandResult::not_run(&request.id, CommandOutcome::Cancelled, now());
        }

        let slot = if gated {
            tokio::select! {
                slot = self.gate.acquire(&request.id) => match slot {
                    Ok(slot) => Some(slot),
                    Err(e) => {
                        self.executor.log(request, Severity::Error, format!("Command not started: {}", e));
                        return CommandResult::not_run(&request.id, CommandOutcome::LaunchFailed, now());
                    }
                },
                _ = cancel.cancelled() => {
                    self.executor
                        .log(request, Severity::Warn, "Command cancelled before start");
                    return CommandResult::not_run(&request.id, CommandOutcome::Cancelled, now());
                }
            }
        } else {
            None
        };

        let executor = Arc::clone(&self.executor);
        let task_request = request.clone();
        let handle = tokio::spawn(async move { executor.execute(&task_request, cancel).await });

        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                let reason = describe_join_error(join_err);
                self.executor
                    .log(request, Severity::Error, format!("Command aborted: {}", reason));
                CommandResult::not_run(&request.id, CommandOutcome::Faulted, now())
            }
        };

        // Released on every path above as well, the slot is a drop guard
        drop(slot);
        result
    }
}
