//! RouteTable — a role-checked handle over one of the three views.
//!
//! Balancers take a `RouteTable` and check its [`Capability`] against the
//! role they are built for, so a mismatch is reported when the balancer is
//! constructed rather than on its first pick.

use std::fmt;

use affinity_core::Role;

use crate::master::MasterRouteTable;
use crate::readonly::ReadOnlyRouteTable;
use crate::renewal::RenewalRouteTable;

/// Capability levels, ordered so that a higher level includes every lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    ReadOnly,
    Renewal,
    Master,
}

impl Capability {
    /// The least capability a balancer in `role` needs.
    pub fn required_for(role: Role) -> Self {
        match role {
            Role::Reader => Capability::ReadOnly,
            Role::Master => Capability::Master,
        }
    }

    pub fn satisfies(self, required: Capability) -> bool {
        self >= required
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ReadOnly => "read-only",
            Capability::Renewal => "renewal",
            Capability::Master => "master",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum RouteTable {
    ReadOnly(ReadOnlyRouteTable),
    Renewal(RenewalRouteTable),
    Master(MasterRouteTable),
}

impl RouteTable {
    pub fn capability(&self) -> Capability {
        match self {
            RouteTable::ReadOnly(_) => Capability::ReadOnly,
            RouteTable::Renewal(_) => Capability::Renewal,
            RouteTable::Master(_) => Capability::Master,
        }
    }

    /// Read access, available at every level.
    pub fn read_only(&self) -> &ReadOnlyRouteTable {
        match self {
            RouteTable::ReadOnly(t) => t,
            RouteTable::Renewal(t) => t.read_only(),
            RouteTable::Master(t) => t.read_only(),
        }
    }

    pub fn renewal(&self) -> Option<&RenewalRouteTable> {
        match self {
            RouteTable::ReadOnly(_) => None,
            RouteTable::Renewal(t) => Some(t),
            RouteTable::Master(t) => Some(t.renewal()),
        }
    }

    pub fn master(&self) -> Option<&MasterRouteTable> {
        match self {
            RouteTable::Master(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_master(self) -> Result<MasterRouteTable, RouteTable> {
        match self {
            RouteTable::Master(t) => Ok(t),
            other => Err(other),
        }
    }

    pub fn namespace(&self) -> &str {
        self.read_only().namespace()
    }
}

impl From<ReadOnlyRouteTable> for RouteTable {
    fn from(t: ReadOnlyRouteTable) -> Self {
        RouteTable::ReadOnly(t)
    }
}

impl From<RenewalRouteTable> for RouteTable {
    fn from(t: RenewalRouteTable) -> Self {
        RouteTable::Renewal(t)
    }
}

impl From<MasterRouteTable> for RouteTable {
    fn from(t: MasterRouteTable) -> Self {
        RouteTable::Master(t)
    }
}
