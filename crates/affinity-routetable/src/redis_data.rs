//! RedisRouteData — route table engine on a shared Redis server.
//!
//! Balancers in separate processes converge through this engine. Every
//! conditional operation is a single server-side step, either a native
//! command (`SET NX`, `SET .. GET`, `GETEX`) or a Lua script, and Redis runs
//! each step without interleaving other clients' commands. Entry TTLs are
//! Redis key expiries, so there is nothing to sweep.
//!
//! Requires Redis 6.2 or newer (`GETEX`, `SET .. GET`).

use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use redis::{Client, Script};
use tracing::debug;

use crate::data::{Claim, RouteData};
use crate::error::{RouteError, RouteResult};
use crate::store::RouteEntry;

/// Connections kept per handle unless configured otherwise.
pub const DEFAULT_POOL_SIZE: u32 = 8;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Keys fetched per `SCAN` round trip.
const SCAN_COUNT: usize = 512;

/// Create the entry unless a value is already bound; reply `{created, value}`.
const CLAIM_SCRIPT: &str = r#"
if redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ARGV[2]) then
    return {1, ARGV[1]}
end
return {0, redis.call('GET', KEYS[1])}
"#;

/// Renew iff the bound value matches; reply `{renewed, current}`.
const EXPIRE_IF_SAME_SCRIPT: &str = r#"
local cur = redis.call('GET', KEYS[1])
if cur == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return {1, cur}
end
return {0, cur}
"#;

/// Delete iff the bound value matches; reply `{deleted, current}`.
const DEL_IF_SAME_SCRIPT: &str = r#"
local cur = redis.call('GET', KEYS[1])
if cur == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return {1, cur}
end
return {0, cur}
"#;

struct Scripts {
    claim: Script,
    expire_if_same: Script,
    del_if_same: Script,
}

/// Route table engine backed by a Redis server, with a connection pool.
///
/// `Clone` shares the pool. Handles opened separately (in this process or
/// another) against the same server see the same entries.
#[derive(Clone)]
pub struct RedisRouteData {
    pool: Pool<Client>,
    scripts: Arc<Scripts>,
}

impl RedisRouteData {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub fn open(url: &str) -> RouteResult<Self> {
        Self::open_with_pool_size(url, DEFAULT_POOL_SIZE)
    }

    pub fn open_with_pool_size(url: &str, pool_size: u32) -> RouteResult<Self> {
        let client = Client::open(url).map_err(map_err!(Open))?;
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(CONNECT_TIMEOUT)
            .build(client)
            .map_err(map_err!(Open))?;
        debug!(%url, pool_size, "redis route store opened");
        Ok(Self {
            pool,
            scripts: Arc::new(Scripts {
                claim: Script::new(CLAIM_SCRIPT),
                expire_if_same: Script::new(EXPIRE_IF_SAME_SCRIPT),
                del_if_same: Script::new(DEL_IF_SAME_SCRIPT),
            }),
        })
    }

    fn conn(&self) -> RouteResult<PooledConnection<Client>> {
        self.pool.get().map_err(map_err!(Open))
    }

    /// Remaining time to live of a live entry.
    pub fn ttl(&self, key: &str) -> RouteResult<Option<Duration>> {
        let mut conn = self.conn()?;
        let pttl: i64 = redis::cmd("PTTL")
            .arg(key)
            .query(&mut *conn)
            .map_err(map_err!(Read))?;
        Ok(remaining(pttl))
    }

    /// List live entries whose key starts with `prefix` (every route key
    /// when `None`).
    ///
    /// Built from `SCAN`, so entries written or expiring during the listing
    /// may or may not appear.
    pub fn entries(&self, prefix: Option<&str>) -> RouteResult<Vec<RouteEntry>> {
        let pattern = scan_pattern(prefix.unwrap_or("r_"));
        let mut conn = self.conn()?;

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query(&mut *conn)
                .map_err(map_err!(Read))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let (value, pttl): (Option<String>, i64) = redis::pipe()
                .cmd("GET")
                .arg(&key)
                .cmd("PTTL")
                .arg(&key)
                .query(&mut *conn)
                .map_err(map_err!(Read))?;
            if let (Some(value), Some(ttl)) = (value, remaining(pttl)) {
                results.push(RouteEntry { key, value, ttl });
            }
        }
        Ok(results)
    }

    /// Redis expires keys on its own; there is never anything to purge.
    pub fn purge_expired(&self) -> RouteResult<usize> {
        Ok(0)
    }

    fn value_changed(key: &str, expected: &str, actual: Option<String>) -> RouteError {
        RouteError::ValueChanged {
            key: key.to_string(),
            expected: expected.to_string(),
            actual,
        }
    }
}

/// `PX` argument for a TTL. Redis rejects 0, so a zero TTL becomes 1ms.
fn ttl_ms(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, i64::MAX as u64)
}

/// `PTTL` reply to a remaining TTL. Missing keys (-2) and keys without an
/// expiry (-1) are not live route entries.
fn remaining(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl).ok().map(Duration::from_millis)
}

/// `SCAN MATCH` pattern for keys starting with `prefix`.
fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

impl RouteData for RedisRouteData {
    fn get(&self, key: &str) -> RouteResult<Option<String>> {
        let mut conn = self.conn()?;
        redis::cmd("GET")
            .arg(key)
            .query(&mut *conn)
            .map_err(map_err!(Read))
    }

    fn get_ex(&self, key: &str, ttl: Duration) -> RouteResult<Option<String>> {
        let mut conn = self.conn()?;
        redis::cmd("GETEX")
            .arg(key)
            .arg("PX")
            .arg(ttl_ms(ttl))
            .query(&mut *conn)
            .map_err(map_err!(Write))
    }

    fn batch_get(&self, keys: &[String]) -> RouteResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        redis::cmd("MGET")
            .arg(keys)
            .query(&mut *conn)
            .map_err(map_err!(Read))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<()> {
        let mut conn = self.conn()?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms(ttl))
            .query::<()>(&mut *conn)
            .map_err(map_err!(Write))?;
        debug!(%key, %value, "route stored");
        Ok(())
    }

    fn set_nx_or_get(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<Claim> {
        let mut conn = self.conn()?;
        let (created, winner): (i64, String) = self
            .scripts
            .claim
            .key(key)
            .arg(value)
            .arg(ttl_ms(ttl))
            .invoke(&mut *conn)
            .map_err(map_err!(Write))?;
        let claim = Claim {
            created: created == 1,
            value: winner,
        };
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
        let mut conn = self.conn()?;
        let old: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms(ttl))
            .arg("GET")
            .query(&mut *conn)
            .map_err(map_err!(Write))?;
        debug!(%key, %value, old = ?old, "route replaced");
        Ok(old)
    }

    fn expire(&self, key: &str, ttl: Duration) -> RouteResult<()> {
        let mut conn = self.conn()?;
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_ms(ttl))
            .query(&mut *conn)
            .map_err(map_err!(Write))?;
        if updated == 1 {
            Ok(())
        } else {
            Err(RouteError::NotFound(key.to_string()))
        }
    }

    fn expire_if_same(&self, key: &str, expected: &str, ttl: Duration) -> RouteResult<()> {
        let mut conn = self.conn()?;
        let (renewed, current): (i64, Option<String>) = self
            .scripts
            .expire_if_same
            .key(key)
            .arg(expected)
            .arg(ttl_ms(ttl))
            .invoke(&mut *conn)
            .map_err(map_err!(Write))?;
        if renewed == 1 {
            Ok(())
        } else {
            Err(Self::value_changed(key, expected, current))
        }
    }

    fn del(&self, key: &str) -> RouteResult<()> {
        let mut conn = self.conn()?;
        redis::cmd("DEL")
            .arg(key)
            .query::<i64>(&mut *conn)
            .map_err(map_err!(Write))?;
        debug!(%key, "route deleted");
        Ok(())
    }

    fn del_if_same(&self, key: &str, expected: &str) -> RouteResult<()> {
        let mut conn = self.conn()?;
        let (deleted, current): (i64, Option<String>) = self
            .scripts
            .del_if_same
            .key(key)
            .arg(expected)
            .invoke(&mut *conn)
            .map_err(map_err!(Write))?;
        if deleted != 1 {
            return Err(Self::value_changed(key, expected, current));
        }
        debug!(%key, %expected, "route deleted");
        Ok(())
    }
}
