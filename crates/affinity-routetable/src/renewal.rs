//! RenewalRouteTable — read access plus renewal of an entry the caller
//! already owns.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::data::RouteData;
use crate::error::RouteResult;
use crate::readonly::ReadOnlyRouteTable;

#[derive(Debug, Clone)]
pub struct RenewalRouteTable {
    inner: ReadOnlyRouteTable,
}

impl RenewalRouteTable {
    pub fn new(data: Arc<dyn RouteData>, namespace: impl Into<String>) -> Self {
        Self {
            inner: ReadOnlyRouteTable::new(data, namespace),
        }
    }

    pub fn with_ttl(self, ttl: Duration) -> Self {
        Self {
            inner: self.inner.with_ttl(ttl),
        }
    }

    pub fn read_only(&self) -> &ReadOnlyRouteTable {
        &self.inner
    }

    /// Reset the entry's TTL iff it is still bound to `value`.
    ///
    /// Fails with `RouteError::ValueChanged` when the entry now holds
    /// another address or has expired.
    pub fn renew_self(&self, partition: &str, oid: i64, value: &str) -> RouteResult<()> {
        let key = self.inner.build_key(partition, oid);
        self.inner
            .data()
            .expire_if_same(&key, value, self.inner.ttl())
            .inspect_err(|e| {
                debug!(%key, %value, error = %e, "route renewal failed");
            })
    }
}

impl Deref for RenewalRouteTable {
    type Target = ReadOnlyRouteTable;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<ReadOnlyRouteTable> for RenewalRouteTable {
    fn from(inner: ReadOnlyRouteTable) -> Self {
        Self { inner }
    }
}
