//! Synchronous-read-triggered repair: after a quorum read returns the
//! newest record, any replica that answered with a missing or older value
//! is pushed the winner in the background. Uses the same minimal
//! [`HintDelivery`] capability as hinted handoff so this module never needs
//! to know about the coordinator or any transport.

use std::sync::Arc;

use strangedb_core::Record;
use tracing::warn;

use crate::hintedhandoff::HintDelivery;

pub struct ReadRepair {
    delivery: Arc<dyn HintDelivery>,
}

/// One replica's answer to a quorum read, paired with the peer url it came
/// from. `None` means the replica had nothing for this key, or the RPC leg
/// to it failed outright — either way it's treated as missing for repair.
pub struct ReplicaAnswer {
    pub peer: String,
    pub record: Option<Record>,
}

impl ReadRepair {
    pub fn new(delivery: Arc<dyn HintDelivery>) -> Self {
        Self { delivery }
    }

    /// Picks the replicas whose answer is missing or strictly older than
    /// `latest` and repairs them. Spawns one fire-and-forget task per
    /// stale replica so the caller's read path is never blocked on it.
    pub fn repair(&self, answers: Vec<ReplicaAnswer>, latest: Record) {
        for answer in answers {
            let is_stale = match &answer.record {
                None => true,
                Some(r) => r.timestamp < latest.timestamp,
            };
            if !is_stale {
                continue;
            }

            let delivery = self.delivery.clone();
            let peer = answer.peer;
            let record = latest.clone();
            tokio::spawn(async move {
                if let Err(e) = delivery.deliver(&peer, record).await {
                    warn!(peer = %peer, error = %e, "read repair delivery failed");
                }
            });
        }
    }
}
