//! Error types for route table operations.

use thiserror::Error;

/// Result type alias for route table operations.
pub type RouteResult<T> = Result<T, RouteError>;

/// Errors that can occur while reading or updating the route table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("failed to open route store: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("commit error: {0}")]
    Commit(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("route not found: {0}")]
    NotFound(String),

    /// A compare-and-X precondition failed: the stored value is not the
    /// expected one (or the entry is gone).
    #[error("route value changed: key={key} expected={expected} actual={actual:?}")]
    ValueChanged {
        key: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("invalid route key: {0}")]
    InvalidKey(String),
}

impl RouteError {
    /// Whether the error reflects store unavailability rather than the
    /// state of the entry. Callers apply their own retry policy to these.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RouteError::Open(_)
                | RouteError::Transaction(_)
                | RouteError::Table(_)
                | RouteError::Read(_)
                | RouteError::Write(_)
                | RouteError::Commit(_)
        )
    }

    pub fn is_value_changed(&self) -> bool {
        matches!(self, RouteError::ValueChanged { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RouteError::NotFound(_))
    }
}
