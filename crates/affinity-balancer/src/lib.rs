//! affinity-balancer — weighted sticky load balancing.
//!
//! Routes every request addressed to the same object to the same backend
//! while the object's route entry is alive, and spreads first-time
//! assignments across candidates in proportion to their weight. Balancers
//! in separate processes agree on one binding per object through the shared
//! route table's atomic claim.
//!
//! # Architecture
//!
//! ```text
//! BalancerRegistry (one balancer per role)
//!   └── StickyBalancer
//!       ├── PartitionFilter   roster → candidates in the request's partition
//!       ├── route table view  get_ex, then set_nx_or_get (master only)
//!       └── WeightedPicker    smooth weighted round robin (mutex-guarded)
//! ```

pub mod balancer;
pub mod error;
pub mod filter;
pub mod picker;
pub mod registry;

pub use balancer::{DoneFn, DoneInfo, PickSource, Picked, StickyBalancer};
pub use error::{BalancerError, BalancerResult};
pub use filter::PartitionFilter;
pub use picker::WeightedPicker;
pub use registry::BalancerRegistry;
