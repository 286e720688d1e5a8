//! Periodic pairwise Merkle comparison against a random peer, reconciling
//! any mismatched ranges by pulling the peer's records and applying
//! whichever side is newer by HLC timestamp.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use strangedb_core::hlc::Timestamp;
use strangedb_core::Record;
use strangedb_storage::RecordStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::membership::Membership;
use crate::merkle::{KeyRange, MerkleTree};

/// Capability to fetch a peer's records within a key range, used to
/// reconcile Merkle mismatches without a full RPC client dependency.
#[async_trait]
pub trait AntiEntropyTransport: Send + Sync {
    async fn fetch_range(&self, peer: &str, range: &KeyRange) -> Result<Vec<Record>, String>;
}

pub struct AntiEntropy<S: RecordStore> {
    store: Arc<S>,
    membership: Arc<Membership>,
    transport: Arc<dyn AntiEntropyTransport>,
    interval: Duration,
}

impl<S: RecordStore + 'static> AntiEntropy<S> {
    pub fn new(
        store: Arc<S>,
        membership: Arc<Membership>,
        transport: Arc<dyn AntiEntropyTransport>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            membership,
            transport,
            interval,
        }
    }

    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.loop_forever(token).await })
    }

    async fn loop_forever(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.round().await,
                _ = token.cancelled() => {
                    debug!("anti-entropy loop shutting down");
                    return;
                }
            }
        }
    }

    async fn round(&self) {
        let peers: Vec<String> = self
            .membership
            .alive_members()
            .into_iter()
            .filter(|p| p != self.membership.local_url())
            .collect();
        let target = {
            let mut rng = rand::thread_rng();
            peers.choose(&mut rng).cloned()
        };
        let Some(target) = target else { return };

        let local_entries = match self.local_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "anti-entropy failed to snapshot local store");
                return;
            }
        };
        let local_tree = MerkleTree::build(&local_entries);

        let whole_range = KeyRange {
            start: local_entries.first().map(|(k, _, _)| k.clone()).unwrap_or_default(),
            end: None,
        };
        let remote_records = match self.transport.fetch_range(&target, &whole_range).await {
            Ok(records) => records,
            Err(e) => {
                warn!(peer = %target, error = %e, "anti-entropy fetch failed");
                return;
            }
        };
        let mut remote_entries: Vec<(Vec<u8>, Vec<u8>, Timestamp)> = remote_records
            .iter()
            .map(|r| (r.key.clone(), r.value.clone(), r.timestamp.clone()))
            .collect();
        remote_entries.sort_by(|a, b| a.0.cmp(&b.0));
        let remote_tree = MerkleTree::build(&remote_entries);

        let mismatches = local_tree.compare(&remote_tree);
        if mismatches.is_empty() {
            return;
        }
        debug!(peer = %target, count = mismatches.len(), "anti-entropy reconciling mismatched ranges");

        for record in remote_records {
            let in_mismatch = mismatches.iter().any(|range| {
                record.key.as_slice() >= range.start.as_slice()
                    && range.end.as_deref().map_or(true, |end| record.key.as_slice() < end)
            });
            if !in_mismatch {
                continue;
            }
            if let Err(e) = self.reconcile_one(record).await {
                warn!(error = %e, "anti-entropy reconcile failed for one key");
            }
        }
    }

    async fn local_entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>, Timestamp)>, strangedb_core::Error> {
        let records = self.store.list(b"", usize::MAX).await?;
        let mut entries: Vec<(Vec<u8>, Vec<u8>, Timestamp)> = records
            .into_iter()
            .map(|r| (r.key, r.value, r.timestamp))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// `RecordStore::set` already applies iff `remote`'s HLC is strictly
    /// newer, so reconciliation is just handing it over.
    async fn reconcile_one(&self, remote: Record) -> Result<(), strangedb_core::Error> {
        self.store.set(remote).await
    }
}
