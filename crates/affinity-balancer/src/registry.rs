//! Per-process balancer registration.
//!
//! At most one balancer per role is active in a process. Registration
//! happens once at startup, before traffic; a second registration for a
//! role is rejected and the first one stays in place.

use std::sync::{Arc, OnceLock};

use affinity_core::Role;
use affinity_routetable::RouteTable;
use tracing::info;

use crate::balancer::StickyBalancer;
use crate::error::{BalancerError, BalancerResult};

#[derive(Debug, Default)]
pub struct BalancerRegistry {
    master: OnceLock<Arc<StickyBalancer>>,
    reader: OnceLock<Arc<StickyBalancer>>,
}

static GLOBAL: BalancerRegistry = BalancerRegistry::new();

impl BalancerRegistry {
    pub const fn new() -> Self {
        Self {
            master: OnceLock::new(),
            reader: OnceLock::new(),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static BalancerRegistry {
        &GLOBAL
    }

    fn slot(&self, role: Role) -> &OnceLock<Arc<StickyBalancer>> {
        match role {
            Role::Master => &self.master,
            Role::Reader => &self.reader,
        }
    }

    /// Register a built balancer under its role.
    pub fn register(&self, balancer: StickyBalancer) -> BalancerResult<Arc<StickyBalancer>> {
        let role = balancer.role();
        let balancer = Arc::new(balancer);
        self.slot(role)
            .set(Arc::clone(&balancer))
            .map_err(|_| {
                BalancerError::Configuration(format!("{role} balancer already registered"))
            })?;
        info!(%role, namespace = %balancer.route_table().namespace(), "balancer registered");
        Ok(balancer)
    }

    pub fn register_master(&self, table: RouteTable) -> BalancerResult<Arc<StickyBalancer>> {
        self.register_role(Role::Master, table)
    }

    pub fn register_reader(&self, table: RouteTable) -> BalancerResult<Arc<StickyBalancer>> {
        self.register_role(Role::Reader, table)
    }

    fn register_role(&self, role: Role, table: RouteTable) -> BalancerResult<Arc<StickyBalancer>> {
        if self.is_registered(role) {
            return Err(BalancerError::Configuration(format!(
                "{role} balancer already registered"
            )));
        }
        self.register(StickyBalancer::new(role, table)?)
    }

    pub fn get(&self, role: Role) -> Option<Arc<StickyBalancer>> {
        self.slot(role).get().cloned()
    }

    pub fn is_registered(&self, role: Role) -> bool {
        self.slot(role).get().is_some()
    }
}
