//! Balancer error types.

use affinity_core::CoreError;
use affinity_routetable::RouteError;
use thiserror::Error;

/// Errors that can occur while building or running a balancer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BalancerError {
    #[error("no node available")]
    NoNodeAvailable,

    #[error("invalid request: {0}")]
    Input(#[from] CoreError),

    #[error("balancer configuration error: {0}")]
    Configuration(String),

    /// The address that won a concurrent claim is not among the current
    /// candidates. The pick fails rather than break the established binding.
    #[error("route {key} is bound to {address}, which is not a candidate")]
    Consistency { key: String, address: String },

    #[error("route table error: {0}")]
    RouteTable(#[from] RouteError),
}

impl BalancerError {
    /// Store unavailability, left to the caller's retry policy.
    pub fn is_transient(&self) -> bool {
        matches!(self, BalancerError::RouteTable(e) if e.is_transient())
    }
}

pub type BalancerResult<T> = Result<T, BalancerError>;
