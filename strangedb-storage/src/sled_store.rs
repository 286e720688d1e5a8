//! `sled`-backed implementation of [`RecordStore`]. Data keys are namespaced
//! under the reserved `"d:"` prefix so other metadata (hints, membership
//! snapshots) can share the same tree in the future without collision.

use async_trait::async_trait;
use strangedb_core::hlc::Timestamp;
use strangedb_core::{Error, Record, Result};

use crate::store::RecordStore;

const DATA_PREFIX: &[u8] = b"d:";

fn data_key(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(DATA_PREFIX.len() + key.len());
    out.extend_from_slice(DATA_PREFIX);
    out.extend_from_slice(key);
    out
}

fn strip_prefix(full_key: &[u8]) -> Option<&[u8]> {
    full_key.strip_prefix(DATA_PREFIX)
}

pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(data_dir: &str) -> Result<Self> {
        let db = sled::open(data_dir).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Self { db })
    }

    fn get_sync(&self, key: &[u8]) -> Result<Record> {
        let raw = self
            .db
            .get(data_key(key))
            .map_err(|e| Error::Storage(e.to_string()))?
            .ok_or(Error::KeyNotFound)?;
        decode_record(&raw)
    }

    fn insert_sync(&self, record: Record) -> Result<()> {
        let bytes = encode_record(&record)?;
        self.db
            .insert(data_key(&record.key), bytes)
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }

    /// Applies `record` iff its HLC is strictly greater than whatever is
    /// currently stored for its key; otherwise a silent no-op. This is the
    /// convergence invariant every write path (coordinator, read repair,
    /// hinted handoff, gRPC set/delete) relies on, so it lives here rather
    /// than in each caller.
    fn apply_sync(&self, record: Record) -> Result<()> {
        match self.get_sync(&record.key) {
            Ok(existing) if existing.timestamp >= record.timestamp => Ok(()),
            Ok(_) => self.insert_sync(record),
            Err(Error::KeyNotFound) => self.insert_sync(record),
            Err(e) => Err(e),
        }
    }
}

fn encode_record(record: &Record) -> Result<Vec<u8>> {
    bincode::serialize(record).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode_record(bytes: &[u8]) -> Result<Record> {
    bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
}

#[async_trait]
impl RecordStore for SledStore {
    async fn get(&self, key: &[u8]) -> Result<Record> {
        self.get_sync(key)
    }

    async fn set(&self, record: Record) -> Result<()> {
        self.apply_sync(record)
    }

    async fn delete(&self, key: &[u8], timestamp: Timestamp) -> Result<()> {
        let tombstone = Record::tombstone(key.to_vec(), timestamp);
        self.apply_sync(tombstone)
    }

    async fn exists(&self, key: &[u8]) -> Result<bool> {
        match self.get_sync(key) {
            Ok(record) => Ok(record.is_live()),
            Err(Error::KeyNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, prefix: &[u8], limit: usize) -> Result<Vec<Record>> {
        let scan_prefix = data_key(prefix);
        let mut out = Vec::new();
        for item in self.db.scan_prefix(&scan_prefix) {
            if out.len() >= limit {
                break;
            }
            let (full_key, raw) = item.map_err(|e| Error::Storage(e.to_string()))?;
            if strip_prefix(&full_key).is_none() {
                continue;
            }
            out.push(decode_record(&raw)?);
        }
        Ok(out)
    }

    async fn close(&self) -> Result<()> {
        self.db.flush().map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }
}

impl SledStore {
    /// Removes every record with `tombstone == true` whose `wall_time` is
    /// strictly older than `threshold_nanos`. Returns the count removed.
    /// Never touches a live record.
    pub async fn purge_expired_tombstones(&self, threshold_nanos: i64) -> Result<usize> {
        let mut expired = Vec::new();
        for item in self.db.scan_prefix(DATA_PREFIX) {
            let (full_key, raw) = item.map_err(|e| Error::Storage(e.to_string()))?;
            let record = decode_record(&raw)?;
            if record.tombstone && record.timestamp.wall_time < threshold_nanos {
                expired.push(full_key);
            }
        }

        for key in &expired {
            self.db
                .remove(key)
                .map_err(|e| Error::Storage(e.to_string()))?;
        }

        Ok(expired.len())
    }
}
