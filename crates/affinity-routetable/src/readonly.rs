//! ReadOnlyRouteTable — the lowest capability level.
//!
//! Derives route keys for one namespace and reads entries, optionally
//! renewing their TTL. It never creates, replaces or deletes an entry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use affinity_core::config::DEFAULT_TTL;
use tracing::debug;

use crate::data::RouteData;
use crate::error::RouteResult;
use crate::key::build_key;

#[derive(Clone)]
pub struct ReadOnlyRouteTable {
    data: Arc<dyn RouteData>,
    namespace: String,
    ttl: Duration,
}

impl ReadOnlyRouteTable {
    /// A view over `data` for keys in `namespace`, using the default TTL.
    pub fn new(data: Arc<dyn RouteData>, namespace: impl Into<String>) -> Self {
        Self {
            data,
            namespace: namespace.into(),
            ttl: DEFAULT_TTL,
        }
    }

    /// Override the idle TTL. A zero TTL keeps the default.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub(crate) fn data(&self) -> &Arc<dyn RouteData> {
        &self.data
    }

    pub fn build_key(&self, partition: &str, oid: i64) -> String {
        build_key(&self.namespace, partition, oid)
    }

    pub fn get(&self, partition: &str, oid: i64) -> RouteResult<Option<String>> {
        let key = self.build_key(partition, oid);
        self.data.get(&key).inspect_err(|e| {
            debug!(%key, error = %e, "route get failed");
        })
    }

    /// Read the entry and reset its TTL to this view's TTL.
    pub fn get_ex(&self, partition: &str, oid: i64) -> RouteResult<Option<String>> {
        let key = self.build_key(partition, oid);
        self.data.get_ex(&key, self.ttl).inspect_err(|e| {
            debug!(%key, error = %e, "route get_ex failed");
        })
    }

    /// Read several objects of one partition from a single snapshot.
    pub fn batch_get(&self, partition: &str, oids: &[i64]) -> RouteResult<Vec<Option<String>>> {
        let keys: Vec<String> = oids
            .iter()
            .map(|oid| self.build_key(partition, *oid))
            .collect();
        self.data.batch_get(&keys).inspect_err(|e| {
            debug!(%partition, count = keys.len(), error = %e, "route batch_get failed");
        })
    }
}

impl fmt::Debug for ReadOnlyRouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyRouteTable")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
