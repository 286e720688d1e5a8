//! Background tombstone garbage collector, mirroring the periodic
//! full-prefix scan used by the store's reference implementation: only
//! records with `tombstone == true` whose `wall_time + ttl` has elapsed are
//! removed; live records are never touched.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use strangedb_core::Error;

use crate::sled_store::SledStore;

pub struct TombstoneSweeper {
    store: Arc<SledStore>,
    ttl: Duration,
    interval: Duration,
}

impl TombstoneSweeper {
    pub fn new(store: Arc<SledStore>, ttl: Duration, interval: Duration) -> Self {
        Self {
            store,
            ttl,
            interval,
        }
    }

    /// Spawns the sweep loop; the returned handle completes once `token` is
    /// cancelled.
    pub fn spawn(self, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            warn!(error = %e, "tombstone sweep failed");
                        }
                    }
                    _ = token.cancelled() => {
                        debug!("tombstone sweeper shutting down");
                        return;
                    }
                }
            }
        })
    }

    async fn sweep_once(&self) -> Result<usize, Error> {
        let now_nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        let threshold = now_nanos - self.ttl.as_nanos() as i64;
        self.store.purge_expired_tombstones(threshold).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStore;
    use strangedb_core::hlc::{HlcClock, Timestamp};
    use strangedb_core::Record;

    #[tokio::test]
    async fn sweep_removes_only_expired_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SledStore::open(dir.path().to_str().unwrap()).unwrap());
        let clock = HlcClock::new("n1");

        // A live record: must survive.
        store
            .set(Record::live(b"live".to_vec(), b"v".to_vec(), clock.now()))
            .await
            .unwrap();

        // An old tombstone: must be purged.
        let old_ts = Timestamp {
            wall_time: 0,
            logical: 0,
            node_id: "n1".to_string(),
        };
        store
            .set(Record::tombstone(b"old-tombstone".to_vec(), old_ts))
            .await
            .unwrap();

        // A fresh tombstone: must survive (not yet past ttl).
        store
            .set(Record::tombstone(b"fresh-tombstone".to_vec(), clock.now()))
            .await
            .unwrap();

        let sweeper =
            TombstoneSweeper::new(store.clone(), Duration::from_secs(1), Duration::from_secs(60));
        let removed = sweeper.sweep_once().await.unwrap();
        assert_eq!(removed, 1);

        let err = store.get(b"old-tombstone").await.unwrap_err();
        assert!(matches!(err, strangedb_core::Error::KeyNotFound));

        let fresh = store.get(b"fresh-tombstone").await.unwrap();
        assert!(fresh.tombstone);

        let live = store.get(b"live").await.unwrap();
        assert!(live.is_live());
    }
}
