//! The route table storage contract.
//!
//! `RouteData` is what a key-value engine must provide to back the route
//! table. All operations key on the encoded route key (see [`crate::key`]).
//!
//! Conditional operations (`set_nx_or_get`, `get_set`, `expire_if_same`,
//! `del_if_same`) and `get_ex` must each be one atomic check-then-act in the
//! engine: an optimistic transaction, a server-side script, or a
//! serialised write transaction. Implementing them as a read followed by a
//! separate write is not conformant.

use std::sync::Arc;
use std::time::Duration;

use crate::error::RouteResult;

/// Outcome of [`RouteData::set_nx_or_get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// True iff this call created the entry.
    pub created: bool,
    /// The authoritative value after the call. When `created` is false this
    /// is the existing value and the caller must adopt it.
    pub value: String,
}

impl Claim {
    pub fn created(value: impl Into<String>) -> Self {
        Self {
            created: true,
            value: value.into(),
        }
    }

    pub fn existing(value: impl Into<String>) -> Self {
        Self {
            created: false,
            value: value.into(),
        }
    }
}

/// Key-value operations with TTL and atomic conditional primitives.
///
/// Absent and expired entries are indistinguishable to callers.
pub trait RouteData: Send + Sync {
    /// Current value, if any.
    fn get(&self, key: &str) -> RouteResult<Option<String>>;

    /// Current value, resetting its TTL to `ttl` in the same atomic step.
    fn get_ex(&self, key: &str, ttl: Duration) -> RouteResult<Option<String>>;

    /// Values for several keys, in order, from one consistent snapshot.
    fn batch_get(&self, keys: &[String]) -> RouteResult<Vec<Option<String>>>;

    /// Unconditional upsert.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<()>;

    /// Create the entry if absent, otherwise report the existing value.
    ///
    /// For a given absent key, at most one concurrent caller observes
    /// `created == true`; every caller sees the same resulting value.
    fn set_nx_or_get(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<Claim>;

    /// Replace the value and reset the TTL, returning the prior value.
    fn get_set(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<Option<String>>;

    /// Reset the TTL only. Fails with `NotFound` if the entry is absent.
    fn expire(&self, key: &str, ttl: Duration) -> RouteResult<()>;

    /// Reset the TTL iff the stored value equals `expected`; otherwise fail
    /// with `ValueChanged`.
    fn expire_if_same(&self, key: &str, expected: &str, ttl: Duration) -> RouteResult<()>;

    /// Unconditional delete. Deleting an absent key is not an error.
    fn del(&self, key: &str) -> RouteResult<()>;

    /// Delete iff the stored value equals `expected`; otherwise fail with
    /// `ValueChanged`.
    fn del_if_same(&self, key: &str, expected: &str) -> RouteResult<()>;
}

impl<D: RouteData + ?Sized> RouteData for Arc<D> {
    fn get(&self, key: &str) -> RouteResult<Option<String>> {
        (**self).get(key)
    }

    fn get_ex(&self, key: &str, ttl: Duration) -> RouteResult<Option<String>> {
        (**self).get_ex(key, ttl)
    }

    fn batch_get(&self, keys: &[String]) -> RouteResult<Vec<Option<String>>> {
        (**self).batch_get(keys)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<()> {
        (**self).set(key, value, ttl)
    }

    fn set_nx_or_get(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<Claim> {
        (**self).set_nx_or_get(key, value, ttl)
    }

    fn get_set(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<Option<String>> {
        (**self).get_set(key, value, ttl)
    }

    fn expire(&self, key: &str, ttl: Duration) -> RouteResult<()> {
        (**self).expire(key, ttl)
    }

    fn expire_if_same(&self, key: &str, expected: &str, ttl: Duration) -> RouteResult<()> {
        (**self).expire_if_same(key, expected, ttl)
    }

    fn del(&self, key: &str) -> RouteResult<()> {
        (**self).del(key)
    }

    fn del_if_same(&self, key: &str, expected: &str) -> RouteResult<()> {
        (**self).del_if_same(key, expected)
    }
}
