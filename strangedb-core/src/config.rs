//! Cluster-wide and per-node configuration knobs. Values here are the
//! reference defaults from the design document; `strangedb-server` layers
//! CLI flags and environment variables on top via `clap`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Governs what a write returns when fewer than `write_quorum` replicas
/// acknowledged it but at least one did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartialWritePolicy {
    /// Return success if any replica acked (AP-leaning reference default).
    AnyAck,
    /// Return an error (`QuorumNotReached`-equivalent) below the configured
    /// write quorum.
    StrictQuorum,
}

impl Default for PartialWritePolicy {
    fn default() -> Self {
        PartialWritePolicy::AnyAck
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique identity, used in HLC timestamps and gossip.
    pub node_id: String,
    /// This node's externally-reachable peer RPC address, e.g.
    /// `"127.0.0.1:9001"`. Used as the node's ring/membership URL.
    pub node_url: String,

    pub http_addr: String,
    pub grpc_addr: String,
    pub data_dir: String,

    pub seeds: Vec<String>,
    pub replication_n: usize,
    pub read_quorum: usize,
    pub write_quorum: usize,
    pub vnodes: usize,

    pub gossip_interval: Duration,
    pub anti_entropy_interval: Duration,
    pub tombstone_ttl: Duration,
    pub tombstone_sweep_interval: Duration,

    pub rpc_timeout: Duration,
    pub merkle_depth: usize,

    pub max_hints: usize,
    pub hint_ttl: Duration,
    pub hint_replay_interval: Duration,

    pub partial_write_policy: PartialWritePolicy,
    /// If true, seeds are only added to the ring once the gossiper has
    /// observed them Alive at least once, rather than eagerly at startup.
    pub only_gossip_confirmed_seeds: bool,

    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: generate_node_id(),
            node_url: "127.0.0.1:9001".to_string(),
            http_addr: "0.0.0.0:9000".to_string(),
            grpc_addr: "0.0.0.0:9001".to_string(),
            data_dir: "./data".to_string(),
            seeds: Vec::new(),
            replication_n: 3,
            read_quorum: 2,
            write_quorum: 2,
            vnodes: 150,
            gossip_interval: Duration::from_secs(1),
            anti_entropy_interval: Duration::from_secs(600),
            tombstone_ttl: Duration::from_secs(24 * 3600),
            tombstone_sweep_interval: Duration::from_secs(3600),
            rpc_timeout: Duration::from_secs(5),
            merkle_depth: 12,
            max_hints: 10_000,
            hint_ttl: Duration::from_secs(24 * 3600),
            hint_replay_interval: Duration::from_secs(5),
            partial_write_policy: PartialWritePolicy::default(),
            only_gossip_confirmed_seeds: false,
            log_level: "info".to_string(),
        }
    }
}

fn generate_node_id() -> String {
    let hostname = hostname_or_default();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() % 10_000)
        .unwrap_or(0);
    format!("{hostname}-{nanos}")
}

fn hostname_or_default() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "node".to_string())
}
