//! affinity-core — shared types for the sticky balancer.
//!
//! - [`Node`]: a candidate backend supplied by the discovery layer
//! - [`Metadata`]: request metadata carrying the partition and object id
//! - [`AffinityConfig`]: `affinity.toml` parsing

pub mod config;
pub mod error;
pub mod metadata;
pub mod node;

pub use config::{AffinityConfig, Role, StoreConfig};
pub use error::{CoreError, CoreResult};
pub use metadata::Metadata;
pub use node::Node;
