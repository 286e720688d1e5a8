//! Periodic peer exchange and phi-style failure detection. The gossiper
//! depends only on a minimal [`GossipTransport`] capability — not the whole
//! peer RPC client — so this crate never needs to know about gRPC.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::membership::{Membership, NodeState};

#[async_trait]
pub trait GossipTransport: Send + Sync {
    /// Exchanges heartbeat digests with `peer_url`, returning the peer's
    /// digest. Errors are treated as a failed gossip round with that peer;
    /// they never propagate further.
    async fn exchange_digest(
        &self,
        peer_url: &str,
        local_digest: HashMap<String, i64>,
    ) -> Result<HashMap<String, i64>, String>;
}

type MembershipChangeCallback = Box<dyn Fn(Vec<String>) + Send + Sync>;

pub struct Gossiper {
    membership: Arc<Membership>,
    transport: Arc<dyn GossipTransport>,
    interval: Duration,
    on_membership_change: RwLock<Option<MembershipChangeCallback>>,
}

impl Gossiper {
    pub fn new(
        local_url: impl Into<String>,
        seeds: &[String],
        transport: Arc<dyn GossipTransport>,
        interval: Duration,
    ) -> Self {
        let local_url = local_url.into();
        let membership = Arc::new(Membership::new(local_url.clone()));
        for seed in seeds {
            if seed != &local_url {
                membership.update(seed, 0);
            }
        }

        Self {
            membership,
            transport,
            interval,
            on_membership_change: RwLock::new(None),
        }
    }

    pub fn membership(&self) -> Arc<Membership> {
        self.membership.clone()
    }

    pub fn set_membership_change_callback<F>(&self, callback: F)
    where
        F: Fn(Vec<String>) + Send + Sync + 'static,
    {
        *self.on_membership_change.write() = Some(Box::new(callback));
    }

    pub fn alive_members(&self) -> Vec<String> {
        self.membership.alive_members()
    }

    /// Spawns the gossip round loop and the failure detection loop; both
    /// stop once `token` is cancelled.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        let gossip_handle = {
            let this = self.clone();
            let token = token.clone();
            tokio::spawn(async move { this.gossip_loop(token).await })
        };
        let failure_handle = {
            let this = self.clone();
            tokio::spawn(async move { this.failure_detection_loop(token).await })
        };
        vec![gossip_handle, failure_handle]
    }

    async fn gossip_loop(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.gossip_round().await,
                _ = token.cancelled() => {
                    debug!("gossip loop shutting down");
                    return;
                }
            }
        }
    }

    async fn gossip_round(&self) {
        self.membership.increment_heartbeat();

        let peers: Vec<String> = self
            .membership
            .alive_members()
            .into_iter()
            .filter(|p| p != self.membership.local_url())
            .collect();
        if peers.is_empty() {
            return;
        }

        let target = {
            let mut rng = rand::thread_rng();
            peers.choose(&mut rng).cloned()
        };
        let Some(target) = target else { return };

        let digest = self.membership.digest();
        match self.transport.exchange_digest(&target, digest).await {
            Ok(remote_digest) => self.apply_digest(remote_digest),
            Err(e) => warn!(peer = %target, error = %e, "gossip round failed"),
        }
    }

    /// Applies a received digest, updating any peer whose heartbeat exceeds
    /// our local record. Used both for outbound gossip responses and for
    /// inbound gossip requests handled by the peer RPC server.
    pub fn apply_digest(&self, digest: HashMap<String, i64>) {
        for (url, heartbeat) in digest {
            self.membership.update(&url, heartbeat);
        }
    }

    pub fn local_digest(&self) -> HashMap<String, i64> {
        self.membership.digest()
    }

    async fn failure_detection_loop(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval * 5);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_failures(),
                _ = token.cancelled() => {
                    debug!("failure detection loop shutting down");
                    return;
                }
            }
        }
    }

    fn check_failures(&self) {
        let now = Instant::now();
        let suspect_threshold = self.interval * 5;
        let dead_threshold = self.interval * 10;

        let mut changed = false;
        for member in self.membership.all_members() {
            if member.node_url == self.membership.local_url() {
                continue;
            }
            let age = now.saturating_duration_since(member.last_updated);
            match member.state {
                NodeState::Alive if age > suspect_threshold => {
                    self.membership.mark_suspect(&member.node_url);
                    info!(peer = %member.node_url, "marking peer suspect");
                    changed = true;
                }
                NodeState::Suspect if age > dead_threshold => {
                    self.membership.mark_dead(&member.node_url);
                    info!(peer = %member.node_url, "marking peer dead");
                    changed = true;
                }
                _ => {}
            }
        }

        if changed {
            if let Some(callback) = self.on_membership_change.read().as_ref() {
                callback(self.membership.alive_members());
            }
        }
    }
}
