//! Core error types.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while reading request metadata or configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("object id is not in request metadata")]
    MissingObjectId,

    #[error("object id is not int64: {0:?}")]
    InvalidObjectId(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),
}
