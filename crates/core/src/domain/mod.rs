// Domain Layer - Pure data types and invariants

pub mod command;
pub mod error;
pub mod log;
pub mod status;

// Re-exports
pub use command::{CommandOutcome, CommandRequest, CommandResult, CommandSpec, RequestId};
pub use error::DomainError;
pub use log::{LogBook, LogEntry, LogFilter, Severity};
pub use status::{ResourceUsage, StatusSnapshot};
