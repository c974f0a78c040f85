// Event Sink Port
// The only outputs the engine produces toward its caller (the UI layer)

use crate::domain::{CommandResult, LogEntry, RequestId, StatusSnapshot};
use tokio::sync::mpsc;
use tracing::debug;

/// Callback boundary implemented by the presentation layer.
///
/// Methods are called from worker tasks, never from the caller's control path,
/// so implementations must be cheap and thread-safe (typically: forward into a channel).
pub trait EventSink: Send + Sync {
    /// A classified output line or engine message
    fn on_log_entry(&self, entry: LogEntry);

    /// A freshly published status snapshot
    fn on_status_snapshot(&self, snapshot: StatusSnapshot);

    /// The terminal result of a submitted request (called exactly once per request)
    fn on_command_complete(&self, request_id: &RequestId, result: &CommandResult);
}

/// Event as seen by a single consumer loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    Log(LogEntry),
    Status(StatusSnapshot),
    CommandComplete {
        request_id: RequestId,
        result: CommandResult,
    },
}

/// EventSink that marshals every callback into an ordered channel.
///
/// Events from one producer task keep their order; the consumer owns the receiver.
#[derive(Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<CoreEvent>,
}

impl ChannelEventSink {
    fn forward(&self, event: CoreEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event consumer gone, dropping event");
        }
    }
}

impl EventSink for ChannelEventSink {
    fn on_log_entry(&self, entry: LogEntry) {
        self.forward(CoreEvent::Log(entry));
    }

    fn on_status_snapshot(&self, snapshot: StatusSnapshot) {
        self.forward(CoreEvent::Status(snapshot));
    }

    fn on_command_complete(&self, request_id: &RequestId, result: &CommandResult) {
        self.forward(CoreEvent::CommandComplete {
            request_id: request_id.clone(),
            result: result.clone(),
        });
    }
}

/// Create a channel-backed sink and the receiver for the consumer loop
pub fn event_channel() -> (ChannelEventSink, mpsc::UnboundedReceiver<CoreEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelEventSink { tx }, rx)
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::Severity;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Records every event in arrival order
    #[derive(Default)]
    pub struct RecordingEventSink {
        events: Mutex<Vec<CoreEvent>>,
        changed: Notify,
    }

    impl RecordingEventSink {
        pub fn new() -> Self {
            Self::default()
        }

        fn record(&self, event: CoreEvent) {
            self.events.lock().unwrap().push(event);
            self.changed.notify_waiters();
        }

        pub fn events(&self) -> Vec<CoreEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn logs(&self) -> Vec<LogEntry> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    CoreEvent::Log(entry) => Some(entry),
                    _ => None,
                })
                .collect()
        }

        pub fn logs_with(&self, severity: Severity) -> Vec<LogEntry> {
            self.logs()
                .into_iter()
                .filter(|e| e.severity == severity)
                .collect()
        }

        pub fn snapshots(&self) -> Vec<StatusSnapshot> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    CoreEvent::Status(snapshot) => Some(snapshot),
                    _ => None,
                })
                .collect()
        }

        pub fn completions(&self) -> Vec<(RequestId, CommandResult)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    CoreEvent::CommandComplete { request_id, result } => Some((request_id, result)),
                    _ => None,
                })
                .collect()
        }

        /// Wait until at least `n` completions were recorded
        pub async fn wait_for_completions(&self, n: usize) -> Vec<(RequestId, CommandResult)> {
            loop {
                // Registered before the check so a completion in between is not missed
                let changed = self.changed.notified();
                let done = self.completions();
                if done.len() >= n {
                    return done;
                }
                changed.await;
            }
        }
    }

    impl EventSink for RecordingEventSink {
        fn on_log_entry(&self, entry: LogEntry) {
            self.record(CoreEvent::Log(entry));
        }

        fn on_status_snapshot(&self, snapshot: StatusSnapshot) {
            self.record(CoreEvent::Status(snapshot));
        }

        fn on_command_complete(&self, request_id: &RequestId, result: &CommandResult) {
            self.record(CoreEvent::CommandComplete {
                request_id: request_id.clone(),
                result: result.clone(),
            });
        }
    }
}
