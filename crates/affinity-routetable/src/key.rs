//! Route key encoding.
//!
//! Keys have the shape `r_{namespace}_{{partition}}_{{oid}}`. The braces keep
//! the partition usable as a cluster hash tag. `%`, `_`, `{` and `}` inside a
//! component are percent-escaped, so every key splits back into exactly one
//! `(namespace, partition, oid)` triple and distinct triples never share a key.

use std::fmt;
use std::str::FromStr;

use crate::error::{RouteError, RouteResult};

const PREFIX: &str = "r";
const SEPARATOR: char = '_';

/// The decoded form of a route key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub namespace: String,
    pub partition: String,
    pub object_id: i64,
}

impl RouteKey {
    pub fn new(namespace: impl Into<String>, partition: impl Into<String>, object_id: i64) -> Self {
        Self {
            namespace: namespace.into(),
            partition: partition.into(),
            object_id,
        }
    }

    pub fn encode(&self) -> String {
        build_key(&self.namespace, &self.partition, self.object_id)
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for RouteKey {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        split_key(s)
    }
}

/// Build the store key for an object.
pub fn build_key(namespace: &str, partition: &str, oid: i64) -> String {
    format!(
        "{PREFIX}{SEPARATOR}{}{SEPARATOR}{{{}}}{SEPARATOR}{{{oid}}}",
        escape(namespace),
        escape(partition)
    )
}

/// Recover the `(namespace, partition, oid)` triple from a store key.
pub fn split_key(key: &str) -> RouteResult<RouteKey> {
    let invalid = || RouteError::InvalidKey(key.to_string());

    let parts: Vec<&str> = key.split(SEPARATOR).collect();
    let [prefix, namespace, partition, oid] = parts.as_slice() else {
        return Err(invalid());
    };
    if *prefix != PREFIX {
        return Err(invalid());
    }

    let partition = braced(partition).ok_or_else(invalid)?;
    let oid = braced(oid)
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(invalid)?;

    Ok(RouteKey {
        namespace: unescape(namespace).ok_or_else(invalid)?,
        partition: unescape(partition).ok_or_else(invalid)?,
        object_id: oid,
    })
}

fn braced(s: &str) -> Option<&str> {
    s.strip_prefix('{')?.strip_suffix('}')
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            '{' => out.push_str("%7B"),
            '}' => out.push_str("%7D"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> Option<String> {
    if s.contains(['{', '}']) {
        return None;
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(idx) = rest.find('%') {
        out.push_str(&rest[..idx]);
        let code = rest.get(idx + 1..idx + 3)?;
        out.push(match code {
            "25" => '%',
            "5F" => '_',
            "7B" => '{',
            "7D" => '}',
            _ => return None,
        });
        rest = &rest[idx + 3..];
    }
    out.push_str(rest);
    Some(out)
}
