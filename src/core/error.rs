//! Error types for the planning engine.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlannerError {
    /// Malformed or unsupported settings. Nothing is computed.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    /// A transaction or operation refers to no category at all.
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, PlannerError>;
