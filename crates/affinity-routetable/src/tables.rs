//! redb table definitions for the route store.
//!
//! Keys are encoded route keys (`r_{namespace}_{{partition}}_{{oid}}`);
//! values are JSON-serialized stored entries carrying the bound address and
//! its absolute expiry deadline.

use redb::TableDefinition;

/// Route entries keyed by encoded route key.
pub const ROUTES: TableDefinition<&str, &[u8]> = TableDefinition::new("routes");
