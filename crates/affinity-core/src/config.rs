//! affinity.toml configuration parser.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

/// Idle TTL applied to route entries when none (or zero) is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Partition used when neither the request nor the config names one.
pub const DEFAULT_PARTITION: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AffinityConfig {
    pub routing: RoutingConfig,
    pub store: Option<StoreConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingConfig {
    /// Route-key namespace, normally the target service name.
    pub namespace: String,
    pub default_partition: Option<String>,
    /// Idle TTL such as "30s", "5m", "24h".
    pub ttl: Option<String>,
    pub role: Option<Role>,
}

/// Route table engine, selected by `[store] backend`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Embedded redb file. Only one process can hold it open.
    Redb { path: PathBuf },
    /// Shared Redis server, e.g. `redis://127.0.0.1:6379/0`.
    Redis {
        url: String,
        pool_size: Option<u32>,
    },
}

/// The role a balancer plays towards the shared route table.
///
/// Deserialized through [`FromStr`], so any letter case is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Originates and overwrites sticky assignments.
    Master,
    /// Follows existing assignments, never creates one.
    Reader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Reader => "reader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master" => Ok(Role::Master),
            "reader" => Ok(Role::Reader),
            other => Err(CoreError::Config(format!("unknown balancer role: {other}"))),
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl AffinityConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: AffinityConfig =
            toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
        if config.routing.namespace.trim().is_empty() {
            return Err(CoreError::Config("routing.namespace is empty".to_string()));
        }
        // Surface a bad ttl at load time rather than on first use.
        config.ttl()?;
        if let Some(StoreConfig::Redis { url, .. }) = &config.store {
            if url.trim().is_empty() {
                return Err(CoreError::Config("store.url is empty".to_string()));
            }
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Scaffold a minimal affinity.toml for the given namespace.
    pub fn scaffold(namespace: &str, store: StoreConfig) -> Self {
        AffinityConfig {
            routing: RoutingConfig {
                namespace: namespace.to_string(),
                default_partition: Some(DEFAULT_PARTITION.to_string()),
                ttl: Some("24h".to_string()),
                role: Some(Role::Master),
            },
            store: Some(store),
        }
    }

    /// Configured idle TTL; missing or zero falls back to [`DEFAULT_TTL`].
    pub fn ttl(&self) -> CoreResult<Duration> {
        match self.routing.ttl.as_deref() {
            None => Ok(DEFAULT_TTL),
            Some(raw) => {
                let ttl = parse_duration(raw)?;
                Ok(if ttl.is_zero() { DEFAULT_TTL } else { ttl })
            }
        }
    }

    pub fn role(&self) -> Role {
        self.routing.role.unwrap_or(Role::Master)
    }

    pub fn default_partition(&self) -> &str {
        self.routing
            .default_partition
            .as_deref()
            .unwrap_or(DEFAULT_PARTITION)
    }
}

/// Parse a duration string like "500ms", "5s", "1m", "24h".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> CoreResult<Duration> {
    let s = s.trim();
    let invalid = || CoreError::InvalidDuration(s.to_string());
    let parsed = if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[routing]
namespace = "room"
default_partition = "blue"
ttl = "30s"
role = "reader"

[store]
backend = "redb"
path = "/tmp/routes.redb"
"#;

    #[test]
    fn test_parse_full() {
        let config = AffinityConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.routing.namespace, "room");
        assert_eq!(config.default_partition(), "blue");
        assert_eq!(config.ttl().unwrap(), Duration::from_secs(30));
        assert_eq!(config.role(), Role::Reader);
        assert_eq!(
            config.store.unwrap(),
            StoreConfig::Redb {
                path: PathBuf::from("/tmp/routes.redb")
            }
        );
    }

    #[test]
    fn test_parse_minimal_uses_defaults() {
        let config = AffinityConfig::from_toml_str("[routing]\nnamespace = \"player\"\n").unwrap();
        assert_eq!(config.ttl().unwrap(), DEFAULT_TTL);
        assert_eq!(config.role(), Role::Master);
        assert_eq!(config.default_partition(), DEFAULT_PARTITION);
        assert!(config.store.is_none());
    }

    #[test]
    fn test_zero_ttl_falls_back_to_default() {
        let config =
            AffinityConfig::from_toml_str("[routing]\nnamespace = \"p\"\nttl = \"0s\"\n").unwrap();
        assert_eq!(config.ttl().unwrap(), DEFAULT_TTL);
    }

    #[test]
    fn test_bad_ttl_rejected_at_load() {
        let err = AffinityConfig::from_toml_str("[routing]\nnamespace = \"p\"\nttl = \"soon\"\n")
            .unwrap_err();
        assert_eq!(err, CoreError::InvalidDuration("soon".to_string()));
    }

    #[test]
    fn test_role_is_case_insensitive_in_toml() {
        let config =
            AffinityConfig::from_toml_str("[routing]\nnamespace = \"p\"\nrole = \"Master\"\n")
                .unwrap();
        assert_eq!(config.role(), Role::Master);

        let config =
            AffinityConfig::from_toml_str("[routing]\nnamespace = \"p\"\nrole = \"READER\"\n")
                .unwrap();
        assert_eq!(config.role(), Role::Reader);
        assert!(config.to_toml_string().unwrap().contains("role = \"reader\""));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let err = AffinityConfig::from_toml_str("[routing]\nnamespace = \"p\"\nrole = \"owner\"\n")
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_empty_namespace_rejected() {
        let err = AffinityConfig::from_toml_str("[routing]\nnamespace = \" \"\n").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_scaffold_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("affinity.toml");
        let store = StoreConfig::Redb {
            path: PathBuf::from("/data/routes.redb"),
        };
        let config = AffinityConfig::scaffold("room", store);
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = AffinityConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_redis_store_section() {
        let config = AffinityConfig::from_toml_str(
            r#"
            [routing]
            namespace = "room"

            [store]
            backend = "redis"
            url = "redis://10.0.0.5:6379/2"
            pool_size = 16
            "#,
        )
        .unwrap();
        assert_eq!(
            config.store,
            Some(StoreConfig::Redis {
                url: "redis://10.0.0.5:6379/2".to_string(),
                pool_size: Some(16),
            })
        );

        let round_tripped = AffinityConfig::from_toml_str(&config.to_toml_string().unwrap());
        assert_eq!(round_tripped.unwrap(), config);
    }

    #[test]
    fn test_store_backend_must_be_known_and_complete() {
        for store in [
            "[store]\nbackend = \"etcd\"\n",
            "[store]\npath = \"/tmp/routes.redb\"\n",
            "[store]\nbackend = \"redis\"\nurl = \"\"\n",
        ] {
            let toml = format!("[routing]\nnamespace = \"p\"\n{store}");
            let err = AffinityConfig::from_toml_str(&toml).unwrap_err();
            assert!(matches!(err, CoreError::Config(_)), "{store}: {err:?}");
        }
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = AffinityConfig::from_file(Path::new("/nonexistent/affinity.toml")).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn role_from_str() {
        assert_eq!("Master".parse::<Role>().unwrap(), Role::Master);
        assert_eq!(" reader ".parse::<Role>().unwrap(), Role::Reader);
        assert!("writer".parse::<Role>().is_err());
        assert_eq!(Role::Reader.to_string(), "reader");
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("24h").unwrap(), DEFAULT_TTL);
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("1d").is_err());
    }
}
