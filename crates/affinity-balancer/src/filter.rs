//! Partition filtering of the candidate roster.

use affinity_core::config::DEFAULT_PARTITION;
use affinity_core::{Metadata, Node};

/// Keeps only the nodes tagged with the request's partition.
///
/// Requests without a partition use the process default. An empty result is
/// returned as-is; the caller reports it as "no node available".
#[derive(Debug, Clone)]
pub struct PartitionFilter {
    default_partition: String,
}

impl PartitionFilter {
    pub fn new(default_partition: impl Into<String>) -> Self {
        Self {
            default_partition: default_partition.into(),
        }
    }

    pub fn default_partition(&self) -> &str {
        &self.default_partition
    }

    /// The partition a request is routed within.
    pub fn partition<'a>(&'a self, md: &'a Metadata) -> &'a str {
        md.partition_or(&self.default_partition)
    }

    pub fn filter<'a, T>(&self, md: &Metadata, nodes: &'a [Node<T>]) -> Vec<&'a Node<T>> {
        let partition = self.partition(md);
        nodes
            .iter()
            .filter(|n| n.partition() == partition)
            .collect()
    }
}

impl Default for PartitionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITION)
    }
}
