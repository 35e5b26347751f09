use std::path::Path;
use std::sync::Arc;

use affinity_core::{AffinityConfig, StoreConfig};
use affinity_routetable::redis_data::DEFAULT_POOL_SIZE;
use affinity_routetable::{
    MasterRouteTable, RedbRouteData, RedisRouteData, RouteData, RouteEntry, RouteResult, split_key,
};
use anyhow::Context;
use tracing::info;

/// The engine named by `[store] backend`.
#[derive(Clone)]
enum Store {
    Redb(RedbRouteData),
    Redis(RedisRouteData),
}

impl Store {
    fn open(config: &StoreConfig) -> anyhow::Result<Self> {
        let store = match config {
            StoreConfig::Redb { path } => Store::Redb(
                RedbRouteData::open(path)
                    .with_context(|| format!("opening route table {}", path.display()))?,
            ),
            StoreConfig::Redis { url, pool_size } => Store::Redis(
                RedisRouteData::open_with_pool_size(url, pool_size.unwrap_or(DEFAULT_POOL_SIZE))
                    .with_context(|| format!("connecting to route table {url}"))?,
            ),
        };
        Ok(store)
    }

    fn data(&self) -> Arc<dyn RouteData> {
        match self {
            Store::Redb(data) => Arc::new(data.clone()),
            Store::Redis(data) => Arc::new(data.clone()),
        }
    }

    fn ttl(&self, key: &str) -> RouteResult<Option<std::time::Duration>> {
        match self {
            Store::Redb(data) => data.ttl(key),
            Store::Redis(data) => data.ttl(key),
        }
    }

    fn entries(&self, prefix: Option<&str>) -> RouteResult<Vec<RouteEntry>> {
        match self {
            Store::Redb(data) => data.entries(prefix),
            Store::Redis(data) => data.entries(prefix),
        }
    }

    fn purge_expired(&self) -> RouteResult<usize> {
        match self {
            Store::Redb(data) => data.purge_expired(),
            Store::Redis(data) => data.purge_expired(),
        }
    }
}

fn open(config_path: &str) -> anyhow::Result<(AffinityConfig, Store)> {
    let config = AffinityConfig::from_file(Path::new(config_path))
        .with_context(|| format!("loading {config_path}"))?;
    let store = config
        .store
        .as_ref()
        .context("config has no [store] section")?;
    let store = Store::open(store)?;
    Ok((config, store))
}

fn table(config: &AffinityConfig, store: &Store) -> anyhow::Result<MasterRouteTable> {
    Ok(MasterRouteTable::new(store.data(), config.routing.namespace.clone())
        .with_ttl(config.ttl()?))
}

pub fn get(config_path: &str, partition: Option<&str>, oid: i64) -> anyhow::Result<()> {
    let (config, data) = open(config_path)?;
    let partition = partition.unwrap_or(config.default_partition());
    let table = table(&config, &data)?;
    let key = table.build_key(partition, oid);

    match table.get(partition, oid)? {
        Some(addr) => {
            let ttl = data.ttl(&key)?.unwrap_or_default();
            println!("{key} -> {addr} (ttl {}s)", ttl.as_secs());
        }
        None => println!("{key} is not bound"),
    }
    Ok(())
}

pub fn list(
    config_path: &str,
    partition: Option<&str>,
    all: bool,
    format: &str,
) -> anyhow::Result<()> {
    let (config, data) = open(config_path)?;
    let namespace = (!all).then_some(config.routing.namespace.as_str());
    let prefix = namespace.map(|ns| format!("r_{ns}_{{"));
    let entries = select_entries(data.entries(prefix.as_deref())?, namespace, partition);
    println!("{}", render_entries(&entries, format)?);
    Ok(())
}

pub fn del(
    config_path: &str,
    partition: Option<&str>,
    oid: i64,
    if_value: Option<&str>,
) -> anyhow::Result<()> {
    let (config, data) = open(config_path)?;
    let partition = partition.unwrap_or(config.default_partition());
    let table = table(&config, &data)?;

    match if_value {
        Some(value) => table.del_if_same(partition, oid, value)?,
        None => table.del(partition, oid)?,
    }
    info!(%partition, oid, "route deleted");
    println!("✓ Deleted {}", table.build_key(partition, oid));
    Ok(())
}

pub fn purge(config_path: &str) -> anyhow::Result<()> {
    let (_, data) = open(config_path)?;
    let removed = data.purge_expired()?;
    println!("✓ Purged {removed} expired route(s)");
    Ok(())
}

/// Keep entries whose key decodes into the given namespace and partition.
/// Keys that do not decode are kept only when no namespace is given.
fn select_entries(
    entries: Vec<RouteEntry>,
    namespace: Option<&str>,
    partition: Option<&str>,
) -> Vec<RouteEntry> {
    entries
        .into_iter()
        .filter(|entry| match split_key(&entry.key) {
            Ok(key) => {
                namespace.is_none_or(|ns| key.namespace == ns)
                    && partition.is_none_or(|p| key.partition == p)
            }
            Err(_) => namespace.is_none() && partition.is_none(),
        })
        .collect()
}

fn render_entries(entries: &[RouteEntry], format: &str) -> anyhow::Result<String> {
    let out = match format {
        "json" => {
            let rows: Vec<_> = entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "key": e.key,
                        "address": e.value,
                        "ttl_secs": e.ttl.as_secs(),
                    })
                })
                .collect();
            serde_json::to_string_pretty(&rows)?
        }
        _ => {
            let mut lines = vec![format!("{:<40} {:<24} {:>8}", "KEY", "ADDRESS", "TTL")];
            for e in entries {
                lines.push(format!(
                    "{:<40} {:<24} {:>7}s",
                    e.key,
                    e.value,
                    e.ttl.as_secs()
                ));
            }
            lines.push(format!("{} route(s)", entries.len()));
            lines.join("\n")
        }
    };
    Ok(out)
}
