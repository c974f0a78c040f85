// Application Layer - Use Cases and Business Logic

pub mod cancel;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod engine;
pub mod executor;
pub mod gate;
pub mod helper;
pub mod panic_guard;
pub mod queue;
pub mod status_parser;
pub mod status_poller;
pub mod status_store;

// Re-exports
pub use cancel::{cancel_channel, CancelHandle, CancelToken};
pub use classifier::classify;
pub use config::EngineConfig;
pub use engine::{Engine, EngineDeps};
pub use executor::CommandExecutor;
pub use gate::{ExclusivityGate, ExecutionSlot, GateBusy, GatePolicy};
pub use helper::{actions, HelperInvoker};
pub use queue::{CommandService, CommandTicket, QueueConfig, SubmitError};
pub use status_parser::{parse_probe_output, ProbeParseError, ProbeReport};
pub use status_poller::{PollOutcome, PollerConfig, PollerState, StatusPoller};
pub use status_store::{PollingSwitch, StatusStore};
