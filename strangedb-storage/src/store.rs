use async_trait::async_trait;
use strangedb_core::{Record, Result};

/// The local durable record engine. Opaque to the replication core: it only
/// ever sees `get`/`set`/`delete`/`exists`/`list` on whole [`Record`]s.
///
/// `get` surfaces a tombstoned key as `Ok(record)` with `record.tombstone ==
/// true` rather than as a distinct error variant — callers that only care
/// about liveness should check `record.is_live()`; callers that need the
/// tombstone's HLC (the coordinator, read-repair, anti-entropy) get it for
/// free. Absence is the only outcome that surfaces as `Error::KeyNotFound`.
///
/// `set`/`delete` apply iff the incoming HLC is strictly greater than
/// whatever is currently stored for that key; an out-of-order, stale write
/// is silently dropped rather than clobbering a newer value. This is the
/// convergence invariant every write path relies on.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Record>;
    async fn set(&self, record: Record) -> Result<()>;
    async fn delete(&self, key: &[u8], timestamp: strangedb_core::hlc::Timestamp) -> Result<()>;
    async fn exists(&self, key: &[u8]) -> Result<bool>;
    async fn list(&self, prefix: &[u8], limit: usize) -> Result<Vec<Record>>;
    async fn close(&self) -> Result<()>;
}
