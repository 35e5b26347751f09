//! StickyBalancer — routes every request for an object to the node it is
//! bound to, binding it by weighted selection on first sight.
//!
//! Pick protocol over partition-filtered candidates:
//!
//! 1. Read the object's route entry, renewing its TTL.
//! 2. If it names a candidate, return that candidate. Picker state is
//!    untouched.
//! 3. Otherwise select a candidate by smooth weighted round robin.
//! 4. A reader returns the selection and never writes the table.
//! 5. A master claims the entry with `set_nx_or_get`. If another claim got
//!    there first, the winner's address is adopted; a winner that is not a
//!    candidate fails the pick with [`BalancerError::Consistency`].
//!
//! Store errors are returned untouched. There is no retry loop.

use std::fmt;
use std::sync::Arc;

use affinity_core::{AffinityConfig, Metadata, Node, Role};
use affinity_routetable::{
    Capability, MasterRouteTable, ReadOnlyRouteTable, RouteData, RouteTable,
};
use tracing::{debug, error, warn};

use crate::error::{BalancerError, BalancerResult};
use crate::filter::PartitionFilter;
use crate::picker::WeightedPicker;

/// Outcome of a call made to a picked node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoneInfo {
    /// Error message of a failed call.
    pub error: Option<String>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl DoneInfo {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Completion callback handed back with a picked node.
pub type DoneFn = Box<dyn FnOnce(&DoneInfo) + Send>;

/// How a pick arrived at its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickSource {
    /// An existing route entry named a candidate.
    Sticky,
    /// This pick created the route entry.
    Claimed,
    /// A concurrent claim won; its node was adopted.
    Adopted,
    /// Fresh weighted selection by a reader. Nothing was written.
    Selected,
}

pub struct Picked<'a, T> {
    pub node: &'a Node<T>,
    pub source: PickSource,
    pub done: DoneFn,
}

impl<'a, T> Picked<'a, T> {
    /// Report the call outcome and release the node.
    pub fn finish(self, info: &DoneInfo) -> &'a Node<T> {
        (self.done)(info);
        self.node
    }
}

impl<T> fmt::Debug for Picked<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Picked")
            .field("node", &self.node.address())
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// The route table view a balancer works through, fixed at construction.
#[derive(Debug, Clone)]
enum Binding {
    Reader(ReadOnlyRouteTable),
    Master(MasterRouteTable),
}

impl Binding {
    fn read_only(&self) -> &ReadOnlyRouteTable {
        match self {
            Binding::Reader(t) => t,
            Binding::Master(t) => t.read_only(),
        }
    }
}

pub struct StickyBalancer {
    role: Role,
    binding: Binding,
    filter: PartitionFilter,
    picker: WeightedPicker,
}

impl StickyBalancer {
    /// Bind a balancer for `role` to `table`.
    ///
    /// Fails with [`BalancerError::Configuration`] if the table does not
    /// grant the capability the role needs.
    pub fn new(role: Role, table: RouteTable) -> BalancerResult<Self> {
        let required = Capability::required_for(role);
        let granted = table.capability();
        if !granted.satisfies(required) {
            return Err(BalancerError::Configuration(format!(
                "{role} balancer needs a {required} route table, got {granted}"
            )));
        }

        let binding = match role {
            Role::Reader => Binding::Reader(table.read_only().clone()),
            Role::Master => match table.into_master() {
                Ok(master) => Binding::Master(master),
                Err(other) => {
                    return Err(BalancerError::Configuration(format!(
                        "master balancer needs a master route table, got {}",
                        other.capability()
                    )));
                }
            },
        };

        debug!(%role, namespace = %binding.read_only().namespace(), "balancer bound");
        Ok(Self {
            role,
            binding,
            filter: PartitionFilter::default(),
            picker: WeightedPicker::new(),
        })
    }

    /// Build a balancer from `affinity.toml` settings over `data`.
    pub fn from_config(config: &AffinityConfig, data: Arc<dyn RouteData>) -> BalancerResult<Self> {
        let ttl = config
            .ttl()
            .map_err(|e| BalancerError::Configuration(e.to_string()))?;
        let namespace = config.routing.namespace.clone();
        let role = config.role();
        let table: RouteTable = match role {
            Role::Master => MasterRouteTable::new(data, namespace).with_ttl(ttl).into(),
            Role::Reader => ReadOnlyRouteTable::new(data, namespace).with_ttl(ttl).into(),
        };
        Ok(Self::new(role, table)?.with_default_partition(config.default_partition()))
    }

    /// Partition used for requests that carry none.
    pub fn with_default_partition(mut self, partition: impl Into<String>) -> Self {
        self.filter = PartitionFilter::new(partition);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn filter(&self) -> &PartitionFilter {
        &self.filter
    }

    pub fn picker(&self) -> &WeightedPicker {
        &self.picker
    }

    pub fn route_table(&self) -> &ReadOnlyRouteTable {
        self.binding.read_only()
    }

    /// Filter `roster` to the request's partition, then [`pick`](Self::pick).
    pub fn select<'a, T>(
        &self,
        md: &Metadata,
        roster: &'a [Node<T>],
    ) -> BalancerResult<Picked<'a, T>> {
        let candidates = self.filter.filter(md, roster);
        self.pick(md, &candidates)
    }

    /// Pick a node for the request described by `md` among `candidates`,
    /// which must already be filtered to the request's partition.
    pub fn pick<'a, T>(
        &self,
        md: &Metadata,
        candidates: &[&'a Node<T>],
    ) -> BalancerResult<Picked<'a, T>> {
        if candidates.is_empty() {
            return Err(BalancerError::NoNodeAvailable);
        }
        let oid = md.object_id()?;
        let partition = self.filter.partition(md);
        let table = self.binding.read_only();

        if let Some(addr) = table.get_ex(partition, oid)? {
            if let Some(node) = find(candidates, &addr) {
                return Ok(self.picked(node, PickSource::Sticky, oid));
            }
            debug!(%partition, oid, %addr, "bound node is not a candidate, reselecting");
        }

        let selected = self
            .picker
            .select(candidates)
            .ok_or(BalancerError::NoNodeAvailable)?;

        let master = match &self.binding {
            Binding::Reader(_) => return Ok(self.picked(selected, PickSource::Selected, oid)),
            Binding::Master(master) => master,
        };

        let claim = master.set_nx_or_get(partition, oid, selected.address())?;
        if claim.created {
            debug!(%partition, oid, addr = %selected.address(), "route claimed");
            return Ok(self.picked(selected, PickSource::Claimed, oid));
        }

        warn!(
            %partition,
            oid,
            winner = %claim.value,
            proposed = %selected.address(),
            "route already claimed by another balancer"
        );
        match find(candidates, &claim.value) {
            Some(node) => Ok(self.picked(node, PickSource::Adopted, oid)),
            None => {
                let key = table.build_key(partition, oid);
                error!(
                    %key,
                    address = %claim.value,
                    "claimed route points at a node outside the candidates"
                );
                Err(BalancerError::Consistency {
                    key,
                    address: claim.value,
                })
            }
        }
    }

    fn picked<'a, T>(&self, node: &'a Node<T>, source: PickSource, oid: i64) -> Picked<'a, T> {
        Picked {
            node,
            source,
            done: done_fn(node.address().to_string(), oid),
        }
    }
}

impl fmt::Debug for StickyBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StickyBalancer")
            .field("role", &self.role)
            .field("binding", &self.binding)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

fn find<'a, T>(candidates: &[&'a Node<T>], address: &str) -> Option<&'a Node<T>> {
    candidates.iter().copied().find(|n| n.address() == address)
}

fn done_fn(address: String, oid: i64) -> DoneFn {
    Box::new(move |info: &DoneInfo| {
        if let Some(err) = &info.error {
            debug!(%address, oid, error = %err, "call to picked node failed");
        }
    })
}
