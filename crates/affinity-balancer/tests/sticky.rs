//! End-to-end pick behaviour against a shared route table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use affinity_balancer::{BalancerError, PickSource, StickyBalancer};
use affinity_core::metadata::PARTITION_KEY;
use affinity_core::{Metadata, Node, Role};
use affinity_routetable::{
    Claim, MasterRouteTable, ReadOnlyRouteTable, RedbRouteData, RouteData, RouteError,
    RouteResult, RouteTable,
};

const PARTITION: &str = "blue";

fn master(data: Arc<dyn RouteData>) -> StickyBalancer {
    let table = MasterRouteTable::new(data, "room").into();
    StickyBalancer::new(Role::Master, table).unwrap()
}

fn reader(data: Arc<dyn RouteData>) -> StickyBalancer {
    let table = ReadOnlyRouteTable::new(data, "room").into();
    StickyBalancer::new(Role::Reader, table).unwrap()
}

fn pick_addr(balancer: &StickyBalancer, nodes: &[Node], oid: i64) -> (String, PickSource) {
    let candidates: Vec<&Node> = nodes.iter().collect();
    let picked = balancer
        .pick(&Metadata::for_object(PARTITION, oid), &candidates)
        .unwrap();
    (picked.node.address().to_string(), picked.source)
}

#[test]
fn first_pick_claims_then_sticks() {
    let store = RedbRouteData::open_in_memory().unwrap();
    let balancer = master(Arc::new(store.clone()));
    let nodes = vec![
        Node::new("A", 3.0, PARTITION),
        Node::new("B", 1.0, PARTITION),
    ];

    assert_eq!(pick_addr(&balancer, &nodes, 1), ("A".to_string(), PickSource::Claimed));
    assert_eq!(store.get("r_room_{blue}_{1}").unwrap().as_deref(), Some("A"));

    let before = (
        balancer.picker().current_weight("A"),
        balancer.picker().current_weight("B"),
    );
    assert_eq!(pick_addr(&balancer, &nodes, 1), ("A".to_string(), PickSource::Sticky));
    let after = (
        balancer.picker().current_weight("A"),
        balancer.picker().current_weight("B"),
    );
    assert_eq!(before, after);
}

#[test]
fn fresh_picks_follow_smooth_weighted_order() {
    let balancer = master(Arc::new(RedbRouteData::open_in_memory().unwrap()));
    let nodes = vec![
        Node::new("A", 3.0, PARTITION),
        Node::new("B", 1.0, PARTITION),
    ];

    // Object 1 claims A, a repeat of object 1 is sticky, object 2 lands on A
    // by a 2:2 tie, object 3 is the first to reach B.
    assert_eq!(pick_addr(&balancer, &nodes, 1).0, "A");
    assert_eq!(pick_addr(&balancer, &nodes, 1).1, PickSource::Sticky);
    assert_eq!(pick_addr(&balancer, &nodes, 2).0, "A");
    assert_eq!(pick_addr(&balancer, &nodes, 3).0, "B");
    assert_eq!(pick_addr(&balancer, &nodes, 4).0, "A");
}

#[test]
fn sticky_binding_survives_roster_changes() {
    let balancer = master(Arc::new(RedbRouteData::open_in_memory().unwrap()));
    let nodes = vec![
        Node::new("A", 1.0, PARTITION),
        Node::new("B", 1.0, PARTITION),
    ];
    let (bound, _) = pick_addr(&balancer, &nodes, 7);

    let grown = vec![
        Node::new("C", 10.0, PARTITION),
        Node::new("B", 1.0, PARTITION),
        Node::new("A", 1.0, PARTITION),
    ];
    for _ in 0..5 {
        assert_eq!(pick_addr(&balancer, &grown, 7), (bound.clone(), PickSource::Sticky));
    }
}

#[test]
fn picks_are_proportional_to_weight() {
    const N: i64 = 10_000;

    let balancer = master(Arc::new(RedbRouteData::open_in_memory().unwrap()));
    let nodes = vec![
        Node::new("a", 5.0, PARTITION),
        Node::new("b", 3.0, PARTITION),
        Node::new("c", 2.0, PARTITION),
    ];

    let mut counts: HashMap<String, i64> = HashMap::new();
    for oid in 0..N {
        *counts.entry(pick_addr(&balancer, &nodes, oid).0).or_default() += 1;
    }

    for (addr, share) in [("a", 0.5), ("b", 0.3), ("c", 0.2)] {
        let observed = counts[addr] as f64 / N as f64;
        assert!(
            (observed - share).abs() < 0.01,
            "{addr}: observed {observed}, expected {share}"
        );
    }
}

#[test]
fn concurrent_masters_converge_on_one_node() {
    const BALANCERS: usize = 8;

    let store = RedbRouteData::open_in_memory().unwrap();
    let barrier = Arc::new(Barrier::new(BALANCERS));

    let handles: Vec<_> = (0..BALANCERS)
        .map(|i| {
            let balancer = master(Arc::new(store.clone()));
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // Rotate the roster so each balancer proposes a different node.
                let mut nodes: Vec<Node> = (0..BALANCERS)
                    .map(|n| Node::new(format!("10.0.0.{n}:9000"), 1.0, PARTITION))
                    .collect();
                nodes.rotate_left(i);

                barrier.wait();
                pick_addr(&balancer, &nodes, 99)
            })
        })
        .collect();

    let results: Vec<(String, PickSource)> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let claimed = results
        .iter()
        .filter(|(_, source)| *source == PickSource::Claimed)
        .count();
    assert_eq!(claimed, 1);

    let winner = &results[0].0;
    assert!(results.iter().all(|(addr, _)| addr == winner));
    assert_eq!(store.get("r_room_{blue}_{99}").unwrap().as_ref(), Some(winner));
}

#[test]
fn reader_never_creates_entries() {
    let store = RedbRouteData::open_in_memory().unwrap();
    let balancer = reader(Arc::new(store.clone()));
    let nodes = vec![Node::new("A", 1.0, PARTITION)];

    assert_eq!(pick_addr(&balancer, &nodes, 5), ("A".to_string(), PickSource::Selected));
    assert_eq!(store.get("r_room_{blue}_{5}").unwrap(), None);
    assert!(store.entries(None).unwrap().is_empty());
}

#[test]
fn reader_follows_master_binding() {
    let store = RedbRouteData::open_in_memory().unwrap();
    let master = master(Arc::new(store.clone()));
    let reader = reader(Arc::new(store));
    let nodes = vec![
        Node::new("A", 1.0, PARTITION),
        Node::new("B", 1.0, PARTITION),
    ];

    // Advance the master's picker so object 2 is bound to B.
    pick_addr(&master, &nodes, 1);
    assert_eq!(pick_addr(&master, &nodes, 2).0, "B");

    assert_eq!(pick_addr(&reader, &nodes, 2), ("B".to_string(), PickSource::Sticky));
}

#[test]
fn bound_node_outside_candidates_is_a_consistency_error() {
    let store = RedbRouteData::open_in_memory().unwrap();
    store
        .set("r_room_{blue}_{3}", "10.9.9.9:9000", Duration::from_secs(60))
        .unwrap();
    let nodes = vec![Node::new("A", 1.0, PARTITION)];
    let candidates: Vec<&Node> = nodes.iter().collect();
    let md = Metadata::for_object(PARTITION, 3);

    let err = master(Arc::new(store.clone()))
        .pick(&md, &candidates)
        .unwrap_err();
    assert_eq!(
        err,
        BalancerError::Consistency {
            key: "r_room_{blue}_{3}".to_string(),
            address: "10.9.9.9:9000".to_string(),
        }
    );
    assert_eq!(
        store.get("r_room_{blue}_{3}").unwrap().as_deref(),
        Some("10.9.9.9:9000")
    );

    // A reader serves the request without touching the binding.
    let picked = reader(Arc::new(store)).pick(&md, &candidates).unwrap();
    assert_eq!(picked.node.address(), "A");
}

#[test]
fn select_filters_by_partition() {
    let balancer =
        master(Arc::new(RedbRouteData::open_in_memory().unwrap())).with_default_partition("green");
    let roster = vec![
        Node::new("blue-1", 1.0, "blue"),
        Node::new("green-1", 1.0, "green"),
    ];

    let md = Metadata::new().with(affinity_core::metadata::OBJECT_ID_KEY, "8");
    assert_eq!(balancer.select(&md, &roster).unwrap().node.address(), "green-1");

    let md = Metadata::for_object("blue", 8);
    assert_eq!(balancer.select(&md, &roster).unwrap().node.address(), "blue-1");

    let md = Metadata::new()
        .with(affinity_core::metadata::OBJECT_ID_KEY, "8")
        .with(PARTITION_KEY, "canary");
    assert_eq!(
        balancer.select(&md, &roster).unwrap_err(),
        BalancerError::NoNodeAvailable
    );
}

// ── Route table doubles ────────────────────────────────────────────

/// Fails every call as an unreachable store would.
struct Unreachable;

impl Unreachable {
    fn err<T>() -> RouteResult<T> {
        Err(RouteError::Read("connection refused".to_string()))
    }
}

impl RouteData for Unreachable {
    fn get(&self, _: &str) -> RouteResult<Option<String>> {
        Self::err()
    }
    fn get_ex(&self, _: &str, _: Duration) -> RouteResult<Option<String>> {
        Self::err()
    }
    fn batch_get(&self, _: &[String]) -> RouteResult<Vec<Option<String>>> {
        Self::err()
    }
    fn set(&self, _: &str, _: &str, _: Duration) -> RouteResult<()> {
        Self::err()
    }
    fn set_nx_or_get(&self, _: &str, _: &str, _: Duration) -> RouteResult<Claim> {
        Self::err()
    }
    fn get_set(&self, _: &str, _: &str, _: Duration) -> RouteResult<Option<String>> {
        Self::err()
    }
    fn expire(&self, _: &str, _: Duration) -> RouteResult<()> {
        Self::err()
    }
    fn expire_if_same(&self, _: &str, _: &str, _: Duration) -> RouteResult<()> {
        Self::err()
    }
    fn del(&self, _: &str) -> RouteResult<()> {
        Self::err()
    }
    fn del_if_same(&self, _: &str, _: &str) -> RouteResult<()> {
        Self::err()
    }
}

/// Misses on the first read, then lets a rival claim land just before
/// this balancer's own claim.
struct Racing {
    inner: RedbRouteData,
    rival: String,
}

impl RouteData for Racing {
    fn get(&self, key: &str) -> RouteResult<Option<String>> {
        self.inner.get(key)
    }
    fn get_ex(&self, _: &str, _: Duration) -> RouteResult<Option<String>> {
        Ok(None)
    }
    fn batch_get(&self, keys: &[String]) -> RouteResult<Vec<Option<String>>> {
        self.inner.batch_get(keys)
    }
    fn set(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<()> {
        self.inner.set(key, value, ttl)
    }
    fn set_nx_or_get(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<Claim> {
        self.inner.set_nx_or_get(key, &self.rival, ttl)?;
        self.inner.set_nx_or_get(key, value, ttl)
    }
    fn get_set(&self, key: &str, value: &str, ttl: Duration) -> RouteResult<Option<String>> {
        self.inner.get_set(key, value, ttl)
    }
    fn expire(&self, key: &str, ttl: Duration) -> RouteResult<()> {
        self.inner.expire(key, ttl)
    }
    fn expire_if_same(&self, key: &str, expected: &str, ttl: Duration) -> RouteResult<()> {
        self.inner.expire_if_same(key, expected, ttl)
    }
    fn del(&self, key: &str) -> RouteResult<()> {
        self.inner.del(key)
    }
    fn del_if_same(&self, key: &str, expected: &str) -> RouteResult<()> {
        self.inner.del_if_same(key, expected)
    }
}

/// Serves reads from `inner`; refuses and counts every write.
struct ReadsOnly {
    inner: RedbRouteData,
    writes: AtomicUsize,
}

impl ReadsOnly {
    fn refuse<T>(&self) -> RouteResult<T> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(RouteError::Write("write on a read-only path".to_string()))
    }
}

impl RouteData for ReadsOnly {
    fn get(&self, key: &str) -> RouteResult<Option<String>> {
        self.inner.get(key)
    }
    fn get_ex(&self, key: &str, ttl: Duration) -> RouteResult<Option<String>> {
        self.inner.get_ex(key, ttl)
    }
    fn batch_get(&self, keys: &[String]) -> RouteResult<Vec<Option<String>>> {
        self.inner.batch_get(keys)
    }
    fn set(&self, _: &str, _: &str, _: Duration) -> RouteResult<()> {
        self.refuse()
    }
    fn set_nx_or_get(&self, _: &str, _: &str, _: Duration) -> RouteResult<Claim> {
        self.refuse()
    }
    fn get_set(&self, _: &str, _: &str, _: Duration) -> RouteResult<Option<String>> {
        self.refuse()
    }
    fn expire(&self, _: &str, _: Duration) -> RouteResult<()> {
        self.refuse()
    }
    fn expire_if_same(&self, _: &str, _: &str, _: Duration) -> RouteResult<()> {
        self.refuse()
    }
    fn del(&self, _: &str) -> RouteResult<()> {
        self.refuse()
    }
    fn del_if_same(&self, _: &str, _: &str) -> RouteResult<()> {
        self.refuse()
    }
}

#[test]
fn reader_on_master_handle_never_writes_on_a_miss() {
    let store = RedbRouteData::open_in_memory().unwrap();
    let data = Arc::new(ReadsOnly {
        inner: store.clone(),
        writes: AtomicUsize::new(0),
    });
    let table = MasterRouteTable::new(data.clone(), "room").into();
    let balancer = StickyBalancer::new(Role::Reader, table).unwrap();
    let nodes = vec![
        Node::new("A", 1.0, PARTITION),
        Node::new("B", 1.0, PARTITION),
    ];

    for oid in 1..=4 {
        assert_eq!(pick_addr(&balancer, &nodes, oid).1, PickSource::Selected);
    }
    assert_eq!(data.writes.load(Ordering::SeqCst), 0);
    assert_eq!(store.get("r_room_{blue}_{1}").unwrap(), None);
    assert!(store.entries(None).unwrap().is_empty());

    // A binding made elsewhere is still followed.
    store.set("r_room_{blue}_{9}", "B", Duration::from_secs(60)).unwrap();
    assert_eq!(pick_addr(&balancer, &nodes, 9), ("B".to_string(), PickSource::Sticky));
    assert_eq!(data.writes.load(Ordering::SeqCst), 0);
}

#[test]
fn store_errors_propagate_untouched() {
    let balancer = master(Arc::new(Unreachable));
    let nodes = vec![Node::new("A", 1.0, PARTITION)];
    let candidates: Vec<&Node> = nodes.iter().collect();

    let err = balancer
        .pick(&Metadata::for_object(PARTITION, 1), &candidates)
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(
        err,
        BalancerError::RouteTable(RouteError::Read("connection refused".to_string()))
    );
}

#[test]
fn lost_race_adopts_winner() {
    let data = Racing {
        inner: RedbRouteData::open_in_memory().unwrap(),
        rival: "B".to_string(),
    };
    let balancer = master(Arc::new(data));
    let nodes = vec![
        Node::new("A", 5.0, PARTITION),
        Node::new("B", 1.0, PARTITION),
    ];

    assert_eq!(pick_addr(&balancer, &nodes, 1), ("B".to_string(), PickSource::Adopted));
}

#[test]
fn lost_race_to_unknown_node_fails() {
    let data = Racing {
        inner: RedbRouteData::open_in_memory().unwrap(),
        rival: "Z".to_string(),
    };
    let balancer = master(Arc::new(data));
    let nodes = vec![Node::new("A", 1.0, PARTITION)];
    let candidates: Vec<&Node> = nodes.iter().collect();

    let err = balancer
        .pick(&Metadata::for_object(PARTITION, 1), &candidates)
        .unwrap_err();
    assert!(matches!(err, BalancerError::Consistency { ref address, .. } if address == "Z"));
}

#[test]
fn route_table_handle_roles() {
    let data: Arc<dyn RouteData> = Arc::new(RedbRouteData::open_in_memory().unwrap());
    let table: RouteTable = ReadOnlyRouteTable::new(data, "room").into();
    assert!(matches!(
        StickyBalancer::new(Role::Master, table),
        Err(BalancerError::Configuration(_))
    ));
}
