use std::path::{Path, PathBuf};

use affinity_core::{AffinityConfig, StoreConfig};

pub fn init(
    config_path: &str,
    namespace: &str,
    store: &str,
    redis_url: Option<&str>,
) -> anyhow::Result<()> {
    let output = Path::new(config_path);
    if output.exists() {
        anyhow::bail!("{} already exists", output.display());
    }

    let store = match redis_url {
        Some(url) => StoreConfig::Redis {
            url: url.to_string(),
            pool_size: None,
        },
        None => StoreConfig::Redb {
            path: PathBuf::from(store),
        },
    };
    let config = AffinityConfig::scaffold(namespace, store);
    std::fs::write(output, config.to_toml_string()?)?;
    println!("✓ Generated {}", output.display());

    Ok(())
}
