use affinity_routetable::{build_key, split_key};

pub fn key(namespace: &str, partition: &str, oid: i64) -> anyhow::Result<()> {
    println!("{}", build_key(namespace, partition, oid));
    Ok(())
}

pub fn decode(key: &str, format: &str) -> anyhow::Result<()> {
    println!("{}", render_decoded(key, format)?);
    Ok(())
}

fn render_decoded(key: &str, format: &str) -> anyhow::Result<String> {
    let decoded = split_key(key)?;
    let out = match format {
        "json" => serde_json::to_string_pretty(&serde_json::json!({
            "namespace": decoded.namespace,
            "partition": decoded.partition,
            "object_id": decoded.object_id,
        }))?,
        _ => format!(
            "namespace: {}\npartition: {}\nobject_id: {}",
            decoded.namespace, decoded.partition, decoded.object_id
        ),
    };
    Ok(out)
}
