//! affinity-routetable — the distributed route table behind sticky routing.
//!
//! A route entry binds one routed object (`namespace`, `partition`, object
//! id) to the address of the backend serving it, with an idle TTL. Entries
//! live in an external key-value engine shared by every balancer instance;
//! the [`RouteData`] trait is that engine's contract.
//!
//! # Architecture
//!
//! ```text
//! RouteTable (role handle)
//!   ├── ReadOnlyRouteTable   key derivation, get, get_ex, batch_get
//!   ├── RenewalRouteTable    wraps ReadOnly, adds renew_self
//!   └── MasterRouteTable     wraps Renewal, adds set / get_set / set_nx_or_get / deletes
//!            │
//!            ▼
//!   dyn RouteData
//!     ├── RedbRouteData   embedded, one process;
//!     │                   one redb write transaction per conditional op
//!     └── RedisRouteData  shared server (feature `redis`);
//!                         one command or Lua script per conditional op
//! ```
//!
//! Every compare-and-X operation is a single check-then-act inside one
//! engine transaction; a read followed by a separate write never decides
//! the outcome of a conditional operation.

/// Convert any `Display` error into a `RouteError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| $crate::error::RouteError::$variant(e.to_string())
    };
}

pub mod clock;
pub mod data;
pub mod error;
pub mod key;
pub mod master;
pub mod readonly;
#[cfg(feature = "redis")]
pub mod redis_data;
pub mod renewal;
pub mod store;
pub mod table;
pub mod tables;

pub use clock::{Clock, ManualClock, SystemClock};
pub use data::{Claim, RouteData};
pub use error::{RouteError, RouteResult};
pub use key::{RouteKey, build_key, split_key};
pub use master::MasterRouteTable;
pub use readonly::ReadOnlyRouteTable;
#[cfg(feature = "redis")]
pub use redis_data::RedisRouteData;
pub use renewal::RenewalRouteTable;
pub use store::{RedbRouteData, RouteEntry};
pub use table::{Capability, RouteTable};
