// Port Layer - Interfaces for external dependencies

pub mod event_sink;
pub mod id_provider; // For deterministic testing
pub mod process_runner;
pub mod resource_probe;
pub mod time_provider;

// Re-exports
pub use event_sink::{event_channel, ChannelEventSink, CoreEvent, EventSink};
pub use id_provider::IdProvider;
pub use process_runner::{LineSender, ProcessExit, ProcessRunner, RunError, Termination};
pub use resource_probe::ResourceProbe;
pub use time_provider::TimeProvider;
