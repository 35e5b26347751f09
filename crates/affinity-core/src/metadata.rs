//! Request metadata — the routing inputs carried alongside a call.
//!
//! The transport layer propagates a flat string map with every request. The
//! balancer reads two entries from it: the object id the request is addressed
//! to and, optionally, the partition the caller is pinned to.

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};

/// Metadata key holding the routed object id (decimal `i64`).
pub const OBJECT_ID_KEY: &str = "x-md-global-oid";

/// Metadata key holding the partition (deployment color) of the request.
pub const PARTITION_KEY: &str = "x-md-global-color";

/// Case-insensitive string map attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: HashMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata for a request addressed to `oid` within `partition`.
    pub fn for_object(partition: &str, oid: i64) -> Self {
        let mut md = Self::new();
        md.set(PARTITION_KEY, partition);
        md.set(OBJECT_ID_KEY, oid.to_string());
        md
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Builder-style `set`.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// The routed object id.
    ///
    /// Absence and unparseable values are both input errors; there is no
    /// fallback object id.
    pub fn object_id(&self) -> CoreResult<i64> {
        let raw = self.get(OBJECT_ID_KEY).ok_or(CoreError::MissingObjectId)?;
        raw.trim()
            .parse::<i64>()
            .map_err(|_| CoreError::InvalidObjectId(raw.to_string()))
    }

    /// The request partition, or `default` when the request carries none.
    pub fn partition_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self.get(PARTITION_KEY) {
            Some(p) if !p.is_empty() => p,
            _ => default,
        }
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut md = Metadata::new();
        for (k, v) in iter {
            md.set(k.as_ref(), v);
        }
        md
    }
}
