//! Candidate backend nodes.
//!
//! The discovery layer hands the balancer a fresh roster of `Node`s on every
//! call. Nodes are identified by address; two nodes with the same address are
//! the same backend as far as routing is concerned.

use std::fmt;

/// A backend instance that can serve a routed object.
///
/// `T` is an opaque handle owned by the caller (a connection, a sub-channel,
/// a service instance record). The balancer never looks inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Node<T = ()> {
    address: String,
    weight: f64,
    partition: String,
    handle: T,
}

impl Node<()> {
    /// Create a node without a caller handle.
    pub fn new(address: impl Into<String>, weight: f64, partition: impl Into<String>) -> Self {
        Node::with_handle(address, weight, partition, ())
    }
}

impl<T> Node<T> {
    /// Create a node carrying a caller handle.
    ///
    /// Negative and non-finite weights are stored as `0.0`: such a node can
    /// still be routed to through an existing assignment, but it never wins a
    /// fresh weighted selection against a positively weighted peer.
    pub fn with_handle(
        address: impl Into<String>,
        weight: f64,
        partition: impl Into<String>,
        handle: T,
    ) -> Self {
        let weight = if weight.is_finite() && weight > 0.0 {
            weight
        } else {
            0.0
        };
        Self {
            address: address.into(),
            weight,
            partition: partition.into(),
            handle,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Partition (deployment segment) tag, e.g. `blue` or `canary`.
    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn handle(&self) -> &T {
        &self.handle
    }
}

impl<T> fmt::Display for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (weight={}, partition={})",
            self.address, self.weight, self.partition
        )
    }
}
