//! End-to-end convergence scenarios run against in-process `Coordinator`s
//! wired to real `SledStore`s (each in its own tempdir) and a shared
//! in-memory fake transport, matching the six concrete cluster scenarios.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tempfile::TempDir;

use strangedb_cluster::{
    AntiEntropy, AntiEntropyTransport, Coordinator, HintStore, HintedHandoff, KeyRange, Membership,
    PeerClient, PeerClientDelivery, ReadRepair, Ring,
};
use strangedb_core::hlc::Timestamp;
use strangedb_core::{Error, HlcClock, NodeConfig, Record};
use strangedb_storage::{RecordStore, SledStore};
use tokio_util::sync::CancellationToken;

/// Routes `PeerClient`/`AntiEntropyTransport` calls directly to the target
/// node's own store, skipping the network entirely. `down` models a
/// one-directional partition: a node in `down` refuses every call, as if
/// unreachable from the rest of the cluster.
struct FakeTransport {
    stores: DashMap<String, Arc<SledStore>>,
    down: DashMap<String, bool>,
}

impl FakeTransport {
    fn new() -> Self {
        Self {
            stores: DashMap::new(),
            down: DashMap::new(),
        }
    }

    fn register(&self, node: &str, store: Arc<SledStore>) {
        self.stores.insert(node.to_string(), store);
    }

    fn set_down(&self, node: &str, down: bool) {
        self.down.insert(node.to_string(), down);
    }

    fn is_down(&self, node: &str) -> bool {
        self.down.get(node).map(|v| *v).unwrap_or(false)
    }
}

#[async_trait]
impl PeerClient for FakeTransport {
    async fn get(&self, peer: &str, key: &[u8]) -> strangedb_core::Result<Option<Record>> {
        if self.is_down(peer) {
            return Err(Error::Transport(format!("{peer} unreachable")));
        }
        let store = self.stores.get(peer).expect("unknown peer").clone();
        match store.get(key).await {
            Ok(record) => Ok(Some(record)),
            Err(Error::KeyNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set(&self, peer: &str, record: Record) -> strangedb_core::Result<()> {
        if self.is_down(peer) {
            return Err(Error::Transport(format!("{peer} unreachable")));
        }
        let store = self.stores.get(peer).expect("unknown peer").clone();
        store.set(record).await
    }

    async fn delete(&self, peer: &str, key: &[u8], timestamp: Timestamp) -> strangedb_core::Result<()> {
        if self.is_down(peer) {
            return Err(Error::Transport(format!("{peer} unreachable")));
        }
        let store = self.stores.get(peer).expect("unknown peer").clone();
        store.delete(key, timestamp).await
    }
}

#[async_trait]
impl AntiEntropyTransport for FakeTransport {
    async fn fetch_range(&self, peer: &str, _range: &KeyRange) -> Result<Vec<Record>, String> {
        if self.is_down(peer) {
            return Err(format!("{peer} unreachable"));
        }
        let store = self.stores.get(peer).ok_or("unknown peer")?.clone();
        store.list(b"", usize::MAX).await.map_err(|e| e.to_string())
    }
}

struct TestNode {
    name: String,
    store: Arc<SledStore>,
    clock: Arc<HlcClock>,
    coordinator: Arc<Coordinator<SledStore>>,
    membership: Arc<Membership>,
    hints: Arc<HintStore>,
    _dir: TempDir,
}

struct TestCluster {
    nodes: Vec<TestNode>,
    ring: Arc<Ring>,
    transport: Arc<FakeTransport>,
}

impl TestCluster {
    async fn new(names: &[&str], config: &NodeConfig) -> Self {
        let ring = Arc::new(Ring::new(config.vnodes));
        let transport = Arc::new(FakeTransport::new());

        let mut nodes = Vec::new();
        for &name in names {
            ring.add_node(name);

            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(SledStore::open(dir.path().to_str().unwrap()).unwrap());
            transport.register(name, store.clone());

            let clock = Arc::new(HlcClock::new(name));
            let membership = Arc::new(Membership::new(name));
            for &other in names {
                if other != name {
                    membership.update(other, 1);
                }
            }

            let hints = Arc::new(HintStore::new(config.max_hints, config.hint_ttl));
            let delivery = Arc::new(PeerClientDelivery::new(transport.clone() as Arc<dyn PeerClient>));
            let read_repair = Arc::new(ReadRepair::new(delivery));

            let coordinator = Arc::new(Coordinator::new(
                name,
                store.clone(),
                ring.clone(),
                clock.clone(),
                transport.clone() as Arc<dyn PeerClient>,
                hints.clone(),
                read_repair,
                config,
            ));

            nodes.push(TestNode {
                name: name.to_string(),
                store,
                clock,
                coordinator,
                membership,
                hints,
                _dir: dir,
            });
        }

        Self { nodes, ring, transport }
    }

    fn node(&self, name: &str) -> &TestNode {
        self.nodes.iter().find(|n| n.name == name).unwrap()
    }

    fn partition(&self, name: &str) {
        self.transport.set_down(name, true);
        for node in &self.nodes {
            if node.name != name {
                node.membership.mark_dead(name);
            }
        }
    }

    fn heal(&self, name: &str) {
        self.transport.set_down(name, false);
        for node in &self.nodes {
            node.membership.update(name, 2);
        }
    }
}

fn three_node_config() -> NodeConfig {
    let mut cfg = NodeConfig::default();
    cfg.replication_n = 3;
    cfg.read_quorum = 2;
    cfg.write_quorum = 2;
    cfg
}

/// Scenario 1: Set on A converges to all three nodes; Get on B sees it.
#[tokio::test]
async fn three_node_write_converges_to_all_replicas() {
    let cluster = TestCluster::new(&["a", "b", "c"], &three_node_config()).await;
    let a = cluster.node("a");

    let record = Record::live(b"k".to_vec(), b"v1".to_vec(), a.clock.now());
    a.coordinator.set(record).await.unwrap();

    for name in ["a", "b", "c"] {
        let got = cluster.node(name).store.get(b"k").await.unwrap();
        assert_eq!(got.value, b"v1");
    }

    let got = cluster.node("b").coordinator.get(b"k").await.unwrap();
    assert_eq!(got.value, b"v1");
}

/// Scenario 2: partition B, write on A with W=2 still met by A+C, heal, and
/// confirm anti-entropy carries the write to B within one round.
#[tokio::test]
async fn partitioned_replica_catches_up_via_anti_entropy() {
    let config = three_node_config();
    let cluster = TestCluster::new(&["a", "b", "c"], &config).await;

    cluster.partition("b");

    let a = cluster.node("a");
    let record = Record::live(b"k".to_vec(), b"v2".to_vec(), a.clock.now());
    a.coordinator.set(record).await.unwrap();

    // B never saw the write while down.
    assert!(matches!(
        cluster.node("b").store.get(b"k").await,
        Err(Error::KeyNotFound)
    ));

    cluster.heal("b");

    let b = cluster.node("b");
    let anti_entropy = Arc::new(AntiEntropy::new(
        b.store.clone(),
        b.membership.clone(),
        cluster.transport.clone() as Arc<dyn AntiEntropyTransport>,
        Duration::from_millis(20),
    ));
    let token = CancellationToken::new();
    let handle = anti_entropy.spawn(token.clone());

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();
    let _ = handle.await;

    let synced = b.store.get(b"k").await.unwrap();
    assert_eq!(synced.value, b"v2");
}

/// Scenario 3: a later write from C must win over an earlier write from A
/// regardless of which order a third reader observes them in.
#[tokio::test]
async fn later_hlc_timestamp_wins_last_writer_wins() {
    let cluster = TestCluster::new(&["a", "b", "c"], &three_node_config()).await;

    let a = cluster.node("a");
    let ts1 = a.clock.now();
    a.coordinator
        .set(Record::live(b"k".to_vec(), b"v1".to_vec(), ts1))
        .await
        .unwrap();

    let c = cluster.node("c");
    let ts2 = c.clock.now();
    c.coordinator
        .set(Record::live(b"k".to_vec(), b"v2".to_vec(), ts2))
        .await
        .unwrap();

    let got = cluster.node("b").coordinator.get(b"k").await.unwrap();
    assert_eq!(got.value, b"v2");
}

/// Scenario 4: delete makes a key immediately invisible (404-equivalent)
/// on every alive replica, ahead of any tombstone GC.
#[tokio::test]
async fn delete_is_visible_immediately_as_not_found() {
    let cluster = TestCluster::new(&["a", "b", "c"], &three_node_config()).await;
    let a = cluster.node("a");

    a.coordinator
        .set(Record::live(b"k".to_vec(), b"v1".to_vec(), a.clock.now()))
        .await
        .unwrap();
    a.coordinator.delete(b"k").await.unwrap();

    for name in ["a", "b", "c"] {
        let err = cluster.node(name).coordinator.get(b"k").await.unwrap_err();
        assert!(matches!(err, Error::KeyNotFound));
    }
}

/// Scenario 5: kill C, do 100 sets from A, restart C; hinted handoff must
/// drain and C ends up holding every latest record.
#[tokio::test]
async fn hinted_handoff_replays_all_writes_after_restart() {
    let mut config = three_node_config();
    config.write_quorum = 2;
    let cluster = TestCluster::new(&["a", "b", "c"], &config).await;

    cluster.partition("c");

    let a = cluster.node("a");
    let mut keys = Vec::new();
    for i in 0..100 {
        let key = format!("k{i}").into_bytes();
        let record = Record::live(key.clone(), format!("v{i}").into_bytes(), a.clock.now());
        a.coordinator.set(record).await.unwrap();
        keys.push(key);
    }

    // Every write that targeted the down node landed as a hint on whichever
    // live coordinator attempted to replicate to it.
    let total_hints: usize = cluster
        .nodes
        .iter()
        .map(|n| n.hints.targets_with_hints().iter().map(|t| n.hints.len_for(t)).sum::<usize>())
        .sum();
    assert!(total_hints > 0, "expected at least one hint queued for the downed node");

    cluster.heal("c");

    let token = CancellationToken::new();
    let mut handles = Vec::new();
    for node in &cluster.nodes {
        let delivery = Arc::new(PeerClientDelivery::new(
            cluster.transport.clone() as Arc<dyn PeerClient>
        ));
        let handoff = Arc::new(HintedHandoff::new(
            node.hints.clone(),
            node.membership.clone(),
            delivery,
            Duration::from_millis(10),
        ));
        handles.push(handoff.spawn(token.clone()));
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    token.cancel();
    for h in handles {
        let _ = h.await;
    }

    let c = cluster.node("c");
    for key in &keys {
        assert!(c.store.exists(key).await.unwrap(), "missing key after handoff replay");
    }
}

/// Scenario 6: adding a node migrates the keys it now owns via
/// anti-entropy, without losing any, and reads keep returning the latest
/// value throughout.
#[tokio::test]
async fn adding_a_node_migrates_its_owned_range_without_loss() {
    let mut config = three_node_config();
    config.replication_n = 2;
    config.read_quorum = 1;
    config.write_quorum = 1;
    let cluster = TestCluster::new(&["a", "b", "c"], &config).await;

    let a = cluster.node("a");
    for i in 0..50 {
        let key = format!("k{i}").into_bytes();
        a.coordinator
            .set(Record::live(key, format!("v{i}").into_bytes(), a.clock.now()))
            .await
            .unwrap();
    }

    // D joins the ring and the cluster's membership view.
    cluster.ring.add_node("d");
    let dir = tempfile::tempdir().unwrap();
    let d_store = Arc::new(SledStore::open(dir.path().to_str().unwrap()).unwrap());
    cluster.transport.register("d", d_store.clone());
    for node in &cluster.nodes {
        node.membership.update("d", 1);
    }
    let d_membership = Arc::new(Membership::new("d"));
    for name in ["a", "b", "c"] {
        d_membership.update(name, 1);
    }

    let anti_entropy = Arc::new(AntiEntropy::new(
        d_store.clone(),
        d_membership,
        cluster.transport.clone() as Arc<dyn AntiEntropyTransport>,
        Duration::from_millis(10),
    ));
    let token = CancellationToken::new();
    let handle = anti_entropy.spawn(token.clone());
    tokio::time::sleep(Duration::from_millis(400)).await;
    token.cancel();
    let _ = handle.await;

    // Every key D now owns in the expanded ring must have migrated in.
    let owned: HashSet<Vec<u8>> = (0..50)
        .map(|i| format!("k{i}").into_bytes())
        .filter(|k| cluster.ring.get_replicas(k, config.replication_n).contains(&"d".to_string()))
        .collect();
    assert!(!owned.is_empty(), "test key set never lands on d, widen the key range");

    for key in &owned {
        let record = d_store.get(key).await.unwrap();
        assert!(!record.tombstone);
    }
}
