//! Quorum-based read/write coordination: fans a request out to a key's N
//! replicas, waits for a quorum of acks, and triggers read repair /
//! hinted handoff for replicas that missed it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use strangedb_core::hlc::Timestamp;
use strangedb_core::{Error, HlcClock, NodeConfig, PartialWritePolicy, Record, Result};
use strangedb_storage::RecordStore;

use crate::hintedhandoff::HintDelivery;
use crate::hintstore::HintStore;
use crate::readrepair::{ReadRepair, ReplicaAnswer};
use crate::ring::Ring;

/// Capability to perform a get/set/delete against a *remote* replica. The
/// local replica, if one of the target replicas, is always served directly
/// from `store` instead of going through this trait.
#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn get(&self, peer: &str, key: &[u8]) -> Result<Option<Record>>;
    async fn set(&self, peer: &str, record: Record) -> Result<()>;
    async fn delete(&self, peer: &str, key: &[u8], timestamp: Timestamp) -> Result<()>;
}

/// Adapts a [`PeerClient`] into the minimal [`HintDelivery`] capability the
/// hinted-handoff loop and read-repair need, without giving either module
/// the full coordinator surface.
pub struct PeerClientDelivery {
    peer_client: Arc<dyn PeerClient>,
}

impl PeerClientDelivery {
    pub fn new(peer_client: Arc<dyn PeerClient>) -> Self {
        Self { peer_client }
    }
}

#[async_trait]
impl HintDelivery for PeerClientDelivery {
    async fn deliver(&self, target: &str, record: Record) -> std::result::Result<(), String> {
        self.peer_client
            .set(target, record)
            .await
            .map_err(|e| e.to_string())
    }
}

pub struct Coordinator<S: RecordStore> {
    local_url: String,
    store: Arc<S>,
    ring: Arc<Ring>,
    clock: Arc<HlcClock>,
    peer_client: Arc<dyn PeerClient>,
    hints: Arc<HintStore>,
    read_repair: Arc<ReadRepair>,
    replication_n: usize,
    read_quorum: usize,
    write_quorum: usize,
    partial_write_policy: PartialWritePolicy,
}

impl<S: RecordStore + 'static> Coordinator<S> {
    pub fn new(
        local_url: impl Into<String>,
        store: Arc<S>,
        ring: Arc<Ring>,
        clock: Arc<HlcClock>,
        peer_client: Arc<dyn PeerClient>,
        hints: Arc<HintStore>,
        read_repair: Arc<ReadRepair>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            local_url: local_url.into(),
            store,
            ring,
            clock,
            peer_client,
            hints,
            read_repair,
            replication_n: config.replication_n,
            read_quorum: config.read_quorum,
            write_quorum: config.write_quorum,
            partial_write_policy: config.partial_write_policy,
        }
    }

    fn replicas_for(&self, key: &[u8]) -> Vec<String> {
        self.ring.get_replicas(key, self.replication_n)
    }

    pub async fn get(&self, key: &[u8]) -> Result<Record> {
        let replicas = self.replicas_for(key);
        if replicas.is_empty() {
            return Err(Error::NoNodesAvailable);
        }

        let futures = replicas.iter().map(|peer| {
            let peer = peer.clone();
            async move {
                let outcome = if peer == self.local_url {
                    match self.store.get(key).await {
                        Ok(record) => Ok(Some(record)),
                        Err(Error::KeyNotFound) => Ok(None),
                        Err(e) => Err(e),
                    }
                } else {
                    self.peer_client.get(&peer, key).await
                };
                (peer, outcome)
            }
        });

        let results = join_all(futures).await;

        let mut answers = Vec::with_capacity(results.len());
        let mut acks = 0usize;
        for (peer, outcome) in results {
            match outcome {
                Ok(record) => {
                    acks += 1;
                    answers.push(ReplicaAnswer { peer, record });
                }
                Err(_) => {
                    answers.push(ReplicaAnswer { peer, record: None });
                }
            }
        }

        if acks < self.read_quorum {
            return Err(Error::QuorumNotReached);
        }

        let latest = answers
            .iter()
            .filter_map(|a| a.record.clone())
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp));

        match latest {
            Some(latest) => {
                // Repair runs on the tombstone too, ahead of the KeyNotFound mapping below.
                self.read_repair.repair(answers, latest.clone());
                if latest.tombstone {
                    Err(Error::KeyNotFound)
                } else {
                    Ok(latest)
                }
            }
            None => Err(Error::KeyNotFound),
        }
    }

    /// Local-only key listing by prefix, for the HTTP `/api/v1/keys`
    /// endpoint. Does not fan out to other replicas.
    pub async fn list(&self, prefix: &[u8], limit: usize) -> Result<Vec<Record>> {
        self.store.list(prefix, limit).await
    }

    pub async fn set(&self, record: Record) -> Result<()> {
        self.replicate_write(record.key.clone(), record).await
    }

    pub async fn delete(&self, key: &[u8]) -> Result<()> {
        let timestamp = self.clock.now();
        let tombstone = Record::tombstone(key.to_vec(), timestamp);
        self.replicate_write(key.to_vec(), tombstone).await
    }

    async fn replicate_write(&self, key: Vec<u8>, record: Record) -> Result<()> {
        let replicas = self.replicas_for(&key);
        if replicas.is_empty() {
            return Err(Error::NoNodesAvailable);
        }

        let futures = replicas.iter().map(|peer| {
            let peer = peer.clone();
            let record = record.clone();
            async move {
                let outcome = if peer == self.local_url {
                    self.store.set(record).await
                } else {
                    self.peer_client.set(&peer, record.clone()).await
                };
                (peer, record, outcome)
            }
        });

        let results = join_all(futures).await;

        let mut acks = 0usize;
        for (peer, record, outcome) in results {
            match outcome {
                Ok(()) => acks += 1,
                Err(e) if peer != self.local_url => {
                    tracing::warn!(peer = %peer, error = %e, "write failed, queuing hint");
                    self.hints.add(&peer, record);
                }
                Err(e) => return Err(e),
            }
        }

        if acks >= self.write_quorum {
            return Ok(());
        }

        match self.partial_write_policy {
            PartialWritePolicy::AnyAck if acks > 0 => Ok(()),
            _ => Err(Error::QuorumNotReached),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use std::time::Duration;
    use strangedb_storage::SledStore;
    use tempfile::tempdir;

    struct InMemoryPeer {
        stores: DashMap<String, DashMap<Vec<u8>, Record>>,
    }

    impl InMemoryPeer {
        fn new(peers: &[&str]) -> Self {
            let stores = DashMap::new();
            for p in peers {
                stores.insert(p.to_string(), DashMap::new());
            }
            Self { stores }
        }
    }

    #[async_trait]
    impl PeerClient for InMemoryPeer {
        async fn get(&self, peer: &str, key: &[u8]) -> Result<Option<Record>> {
            Ok(self
                .stores
                .get(peer)
                .and_then(|s| s.get(key).map(|r| r.clone())))
        }

        async fn set(&self, peer: &str, record: Record) -> Result<()> {
            self.stores
                .entry(peer.to_string())
                .or_default()
                .insert(record.key.clone(), record);
            Ok(())
        }

        async fn delete(&self, peer: &str, key: &[u8], timestamp: Timestamp) -> Result<()> {
            let tombstone = Record::tombstone(key.to_vec(), timestamp);
            self.stores
                .entry(peer.to_string())
                .or_default()
                .insert(key.to_vec(), tombstone);
            Ok(())
        }
    }

    fn test_config() -> NodeConfig {
        let mut cfg = NodeConfig::default();
        cfg.replication_n = 3;
        cfg.read_quorum = 2;
        cfg.write_quorum = 2;
        cfg
    }

    async fn make_coordinator() -> (Coordinator<SledStore>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(SledStore::open(dir.path().to_str().unwrap()).unwrap());
        let ring = Arc::new(Ring::new(150));
        for n in ["self", "b", "c"] {
            ring.add_node(n);
        }
        let clock = Arc::new(HlcClock::new("self"));
        let peer_client: Arc<dyn PeerClient> = Arc::new(InMemoryPeer::new(&["b", "c"]));
        let hints = Arc::new(HintStore::new(10, Duration::from_secs(60)));
        let delivery = Arc::new(PeerClientDelivery::new(peer_client.clone()));
        let read_repair = Arc::new(ReadRepair::new(delivery));

        let coordinator = Coordinator::new(
            "self",
            store,
            ring,
            clock,
            peer_client,
            hints,
            read_repair,
            &test_config(),
        );
        (coordinator, dir)
    }

    #[tokio::test]
    async fn set_then_get_round_trips_through_quorum() {
        let (coordinator, _dir) = make_coordinator().await;
        let clock = HlcClock::new("self");
        let record = Record::live(b"k".to_vec(), b"v".to_vec(), clock.now());
        coordinator.set(record.clone()).await.unwrap();

        let got = coordinator.get(b"k").await.unwrap();
        assert_eq!(got.value, b"v");
    }

    #[tokio::test]
    async fn get_missing_key_is_not_found() {
        let (coordinator, _dir) = make_coordinator().await;
        let err = coordinator.get(b"missing").await.unwrap_err();
        assert!(matches!(err, Error::KeyNotFound));
    }

    #[tokio::test]
    async fn delete_writes_tombstone_visible_on_read() {
        let (coordinator, _dir) = make_coordinator().await;
        let clock = HlcClock::new("self");
        coordinator
            .set(Record::live(b"k".to_vec(), b"v".to_vec(), clock.now()))
            .await
            .unwrap();
        coordinator.delete(b"k").await.unwrap();

        let err = coordinator.get(b"k").await.unwrap_err();
        assert!(matches!(err, Error::KeyNotFound));
    }
}
