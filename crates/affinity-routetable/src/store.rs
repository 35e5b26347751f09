//! RedbRouteData — redb-backed route table engine.
//!
//! Each entry is stored as a JSON record holding the bound address and an
//! absolute expiry deadline in epoch milliseconds. Expiry is lazy: an entry
//! past its deadline reads as absent and is overwritten or removed by the
//! next write that touches it. [`RedbRouteData::purge_expired`] sweeps the
//! rest.
//!
//! Every conditional operation runs inside one redb write transaction.
//! redb admits a single writer at a time, so the value a decision is based
//! on cannot change before the decision is committed.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::data::{Claim, RouteData};
use crate::error::{RouteError, RouteResult};
use crate::tables::ROUTES;

/// On-disk record for one route entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct StoredRoute {
    value: String,
    expires_at_ms: u64,
}

impl StoredRoute {
    fn new(value: &str, now: u64, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at_ms: deadline(now, ttl),
        }
    }

    fn renewed(&self, now: u64, ttl: Duration) -> Self {
        Self::new(&self.value, now, ttl)
    }

    fn is_expired(&self, now: u64) -> bool {
        self.expires_at_ms <= now
    }

    fn decode(bytes: &[u8]) -> RouteResult<Self> {
        serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
    }

    fn encode(&self) -> RouteResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(map_err!(Serialize))
    }
}

fn deadline(now: u64, ttl: Duration) -> u64 {
    let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    now.saturating_add(ttl_ms)
}

/// A live entry as seen by inspection tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub key: String,
    pub value: String,
    /// Remaining time to live.
    pub ttl: Duration,
}

/// What a transactional step does to the entry it inspected.
enum Mutation {
    Keep,
    Put(StoredRoute),
    Remove,
}

/// Thread-safe route table engine backed by redb.
///
/// `Clone` shares the underlying database, so clones (and the balancers
/// holding them) contend on the same entries.
#[derive(Clone)]
pub struct RedbRouteData {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl RedbRouteData {
    /// Open (or create) a persistent route store at the given path.
    pub fn open(path: &Path) -> RouteResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!(?path, "route store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory route store.
    pub fn open_in_memory() -> RouteResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!("in-memory route store opened");
        Ok(store)
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used for expiry decisions.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn ensure_tables(&self) -> RouteResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(ROUTES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Commit))?;
        Ok(())
    }

    /// Run `step` against the live entry for `key` inside one write
    /// transaction and apply the mutation it returns.
    ///
    /// If `step` fails, the transaction is aborted and nothing changes.
    fn atomically<R>(
        &self,
        key: &str,
        step: impl FnOnce(Option<&StoredRoute>, u64) -> RouteResult<(Mutation, R)>,
    ) -> RouteResult<R> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let now = self.clock.now_millis();
        let outcome = {
            let mut table = txn.open_table(ROUTES).map_err(map_err!(Table))?;
            let stored = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => Some(StoredRoute::decode(guard.value())?),
                None => None,
            };
            let expired = stored.as_ref().is_some_and(|s| s.is_expired(now));
            let live = stored.filter(|s| !s.is_expired(now));

            match step(live.as_ref(), now) {
                Ok((mutation, result)) => {
                    match mutation {
                        Mutation::Put(entry) => {
                            let bytes = entry.encode()?;
                            table
                                .insert(key, bytes.as_slice())
                                .map_err(map_err!(Write))?;
                        }
                        Mutation::Remove => {
                            table.remove(key).map_err(map_err!(Write))?;
                        }
                        Mutation::Keep if expired => {
                            table.remove(key).map_err(map_err!(Write))?;
                        }
                        Mutation::Keep => {}
                    }
                    Ok(result)
                }
                Err(e) => Err(e),
            }
        };

        match outcome {
            Ok(result) => {
                txn.commit().map_err(map_err!(Commit))?;
                Ok(result)
            }
            Err(e) => {
                txn.abort().map_err(map_err!(Transaction))?;
                Err(e)
            }
        }
    }

    fn value_changed(key: &str, expected: &str, live: Option<&StoredRoute>) -> RouteError {
        RouteError::ValueChanged {
            key: key.to_string(),
            expected: expected.to_string(),
            actual: live.map(|s| s.value.clone()),
        }
    }

    /// Remaining time to live of a live entry.
    pub fn ttl(&self, key: &str) -> RouteResult<Option<Duration>> {
        let now = self.clock.now_millis();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROUTES).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let stored = StoredRoute::decode(guard.value())?;
                Ok((!stored.is_expired(now))
                    .then(|| Duration::from_millis(stored.expires_at_ms - now)))
            }
            None => Ok(None),
        }
    }

    /// List live entries, optionally restricted to keys starting with `prefix`.
    pub fn entries(&self, prefix: Option<&str>) -> RouteResult<Vec<RouteEntry>> {
        let now = self.clock.now_millis();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROUTES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let key = key.value();
            if prefix.is_some_and(|p| !key.starts_with(p)) {
                continue;
            }
            let stored = StoredRoute::decode(value.value())?;
            if stored.is_expired(now) {
                continue;
            }
            results.push(RouteEntry {
                key: key.to_string(),
                ttl: Duration::from_millis(stored.expires_at_ms - now),
                value: stored.value,
            });
        }
        Ok(results)
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> RouteResult<usize> {
        let now = self.clock.now_millis();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count;
        {
            let mut table = txn.open_table(ROUTES).map_err(map_err!(Table))?;
            let mut expired = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                if StoredRoute::decode(value.value())?.is_expired(now) {
                    expired.push(key.value().to_string());
                }
            }
            for key in &expired {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            count = expired.len();
        }
        txn.commit().map_err(map_err!(Commit))?;
        debug!(count, "expired routes purged");
        Ok(count)
    }
}

impl RouteData for RedbRouteData {
    fn get(&self, key: &str) -> RouteResult<Option<String>> {
        let now = self.clock.now_millis();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROUTES).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let stored = StoredRoute::decode(guard.value())?;
                Ok((!stored.is_expired(now)).then_some(stored.value))
            }
            None => Ok(None),
        }
    }

    fn get_ex(&self, key: &str, ttl: Duration) -> RouteResult<Option<String>> {
        self.atomically(key, |live, now| match live {
            Some(stored) => Ok((
                Mutation::Put(stored.renewed(now, ttl)),
                Some(stored.value.clone()),
            )),
            None => Ok((Mutation::Keep, None)),
        })
    }

    fn batch_get(&self, keys: &[String]) -> RouteResult<Vec<Option<String>>> {
        let now = self.clock.now_millis();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROUTES).map_err(map_err!(Table))?;
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let value = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let stored = StoredRoute::decode(guard.value())?;
                    (!stored.is_expired(now)).then_some(stored.value)
                }
                None => None,
            };
            results.push(value);
        }
        Ok(results)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<()> {
        self.atomically(key, |_, now| {
            Ok((Mutation::Put(StoredRoute::new(value, now, ttl)), ()))
        })?;
        debug!(%key, %value, "route stored");
        Ok(())
    }

    fn set_nx_or_get(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<Claim> {
        let claim = self.atomically(key, |live, now| match live {
            Some(stored) => Ok((Mutation::Keep, Claim::existing(stored.value.clone()))),
            None => Ok((
                Mutation::Put(StoredRoute::new(value, now, ttl)),
                Claim::created(value),
            )),
        })?;
        debug!(
            %key,
            proposed = %value,
            created = claim.created,
            winner = %claim.value,
            "route claim"
        );
        Ok(claim)
    }

    fn get_set(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<Option<String>> {
        let old = self.atomically(key, |live, now| {
            Ok((
                Mutation::Put(StoredRoute::new(value, now, ttl)),
                live.map(|s| s.value.clone()),
            ))
        })?;
        debug!(%key, %value, old = ?old, "route replaced");
        Ok(old)
    }

    fn expire(&self, key: &str, ttl: Duration) -> RouteResult<()> {
        self.atomically(key, |live, now| match live {
            Some(stored) => Ok((Mutation::Put(stored.renewed(now, ttl)), ())),
            None => Err(RouteError::NotFound(key.to_string())),
        })
    }

    fn expire_if_same(&self, key: &str, expected: &str, ttl: Duration) -> RouteResult<()> {
        self.atomically(key, |live, now| match live {
            Some(stored) if stored.value == expected => {
                Ok((Mutation::Put(stored.renewed(now, ttl)), ()))
            }
            other => Err(Self::value_changed(key, expected, other)),
        })
    }

    fn del(&self, key: &str) -> RouteResult<()> {
        self.atomically(key, |_, _| Ok((Mutation::Remove, ())))?;
        debug!(%key, "route deleted");
        Ok(())
    }

    fn del_if_same(&self, key: &str, expected: &str) -> RouteResult<()> {
        self.atomically(key, |live, _| match live {
            Some(stored) if stored.value == expected => Ok((Mutation::Remove, ())),
            other => Err(Self::value_changed(key, expected, other)),
        })?;
        debug!(%key, %expected, "route deleted");
        Ok(())
    }
}
