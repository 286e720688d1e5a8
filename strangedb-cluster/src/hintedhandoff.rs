//! Background replay of hinted writes once their target becomes reachable
//! again. Grounded on the same periodic-loop shape as [`crate::gossip`] and
//! the tombstone sweeper in `strangedb-storage`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use strangedb_core::Record;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::hintstore::HintStore;
use crate::membership::Membership;

/// Minimal capability the handoff loop needs from the coordinator: deliver
/// a single record directly to one named peer. Kept separate from any full
/// peer-RPC client so this module has no transport dependency.
#[async_trait]
pub trait HintDelivery: Send + Sync {
    async fn deliver(&self, target: &str, record: Record) -> Result<(), String>;
}

pub struct HintedHandoff {
    hints: Arc<HintStore>,
    membership: Arc<Membership>,
    delivery: Arc<dyn HintDelivery>,
    interval: Duration,
}

impl HintedHandoff {
    pub fn new(
        hints: Arc<HintStore>,
        membership: Arc<Membership>,
        delivery: Arc<dyn HintDelivery>,
        interval: Duration,
    ) -> Self {
        Self {
            hints,
            membership,
            delivery,
            interval,
        }
    }

    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.replay_loop(token).await })
    }

    async fn replay_loop(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.replay_once().await,
                _ = token.cancelled() => {
                    debug!("hinted handoff loop shutting down");
                    return;
                }
            }
        }
    }

    async fn replay_once(&self) {
        let alive = self.membership.alive_members();
        for target in self.hints.targets_with_hints() {
            if !alive.contains(&target) {
                continue;
            }
            let records = self.hints.drain(&target);
            for record in records {
                if let Err(e) = self.delivery.deliver(&target, record.clone()).await {
                    warn!(target = %target, error = %e, "hint replay failed, re-queuing");
                    self.hints.add(&target, record);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use strangedb_core::HlcClock;

    struct RecordingDelivery {
        delivered: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl HintDelivery for RecordingDelivery {
        async fn deliver(&self, target: &str, record: Record) -> Result<(), String> {
            self.delivered
                .lock()
                .push((target.to_string(), record.key.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn replay_only_targets_alive_peers_and_drains_queue() {
        let hints = Arc::new(HintStore::new(10, Duration::from_secs(60)));
        let membership = Arc::new(Membership::new("self"));
        membership.update("peer-up", 1);
        // "peer-down" is never added, so it's unknown and not alive.

        let clock = HlcClock::new("self");
        hints.add("peer-up", Record::live(b"a".to_vec(), b"v".to_vec(), clock.now()));
        hints.add("peer-down", Record::live(b"b".to_vec(), b"v".to_vec(), clock.now()));

        let delivery = Arc::new(RecordingDelivery {
            delivered: Mutex::new(Vec::new()),
        });
        let handoff = HintedHandoff::new(
            hints.clone(),
            membership,
            delivery.clone(),
            Duration::from_secs(60),
        );
        handoff.replay_once().await;

        let delivered = delivery.delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "peer-up");
        assert_eq!(hints.len_for("peer-up"), 0);
        assert_eq!(hints.len_for("peer-down"), 1);
    }
}
