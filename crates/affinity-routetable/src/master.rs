//! MasterRouteTable — full origination and overwrite rights.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::data::{Claim, RouteData};
use crate::error::RouteResult;
use crate::readonly::ReadOnlyRouteTable;
use crate::renewal::RenewalRouteTable;

#[derive(Debug, Clone)]
pub struct MasterRouteTable {
    inner: RenewalRouteTable,
}

impl MasterRouteTable {
    pub fn new(data: Arc<dyn RouteData>, namespace: impl Into<String>) -> Self {
        Self {
            inner: RenewalRouteTable::new(data, namespace),
        }
    }

    pub fn with_ttl(self, ttl: Duration) -> Self {
        Self {
            inner: self.inner.with_ttl(ttl),
        }
    }

    pub fn renewal(&self) -> &RenewalRouteTable {
        &self.inner
    }

    pub fn read_only(&self) -> &ReadOnlyRouteTable {
        self.inner.read_only()
    }

    fn data(&self) -> &Arc<dyn RouteData> {
        self.read_only().data()
    }

    /// Bind the object to `addr`, replacing any existing binding.
    pub fn set(&self, partition: &str, oid: i64, addr: &str) -> RouteResult<()> {
        let key = self.build_key(partition, oid);
        self.data().set(&key, addr, self.ttl()).inspect_err(|e| {
            debug!(%key, %addr, error = %e, "route set failed");
        })
    }

    /// Bind the object to `addr` and return the address it was bound to.
    pub fn get_set(&self, partition: &str, oid: i64, addr: &str) -> RouteResult<Option<String>> {
        let key = self.build_key(partition, oid);
        self.data().get_set(&key, addr, self.ttl()).inspect_err(|e| {
            debug!(%key, %addr, error = %e, "route get_set failed");
        })
    }

    /// Bind the object to `addr` unless it is already bound.
    pub fn set_nx_or_get(&self, partition: &str, oid: i64, addr: &str) -> RouteResult<Claim> {
        let key = self.build_key(partition, oid);
        self.data()
            .set_nx_or_get(&key, addr, self.ttl())
            .inspect_err(|e| {
                debug!(%key, %addr, error = %e, "route claim failed");
            })
    }

    pub fn del(&self, partition: &str, oid: i64) -> RouteResult<()> {
        let key = self.build_key(partition, oid);
        self.data().del(&key).inspect_err(|e| {
            debug!(%key, error = %e, "route del failed");
        })
    }

    pub fn del_if_same(&self, partition: &str, oid: i64, value: &str) -> RouteResult<()> {
        let key = self.build_key(partition, oid);
        self.data().del_if_same(&key, value).inspect_err(|e| {
            debug!(%key, %value, error = %e, "route del_if_same failed");
        })
    }

    /// Let the entry lapse after `delay` instead of removing it now.
    pub fn del_delay(&self, partition: &str, oid: i64, delay: Duration) -> RouteResult<()> {
        let key = self.build_key(partition, oid);
        self.data().expire(&key, delay).inspect_err(|e| {
            debug!(%key, ?delay, error = %e, "route del_delay failed");
        })
    }

    /// [`del_delay`](Self::del_delay), only if the entry is still bound to `value`.
    pub fn del_delay_if_same(
        &self,
        partition: &str,
        oid: i64,
        value: &str,
        delay: Duration,
    ) -> RouteResult<()> {
        let key = self.build_key(partition, oid);
        self.data()
            .expire_if_same(&key, value, delay)
            .inspect_err(|e| {
                debug!(%key, %value, ?delay, error = %e, "route del_delay_if_same failed");
            })
    }
}

impl Deref for MasterRouteTable {
    type Target = RenewalRouteTable;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<RenewalRouteTable> for MasterRouteTable {
    fn from(inner: RenewalRouteTable) -> Self {
        Self { inner }
    }
}
