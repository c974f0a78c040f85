// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Empty command: at least one argument token is required")]
    EmptyCommand,

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
