//! Conversions between wire types (generated from `proto/peer.proto`) and
//! the domain types in `strangedb-core`.

use strangedb_core::hlc::Timestamp;
use strangedb_core::Record;

use super::proto;

impl From<&Timestamp> for proto::Timestamp {
    fn from(ts: &Timestamp) -> Self {
        proto::Timestamp {
            wall_time: ts.wall_time,
            logical: ts.logical,
            node_id: ts.node_id.clone(),
        }
    }
}

impl From<proto::Timestamp> for Timestamp {
    fn from(ts: proto::Timestamp) -> Self {
        Timestamp {
            wall_time: ts.wall_time,
            logical: ts.logical,
            node_id: ts.node_id,
        }
    }
}

impl From<&Record> for proto::Record {
    fn from(record: &Record) -> Self {
        proto::Record {
            key: record.key.clone(),
            value: record.value.clone(),
            timestamp: Some((&record.timestamp).into()),
            tombstone: record.tombstone,
        }
    }
}

/// Fails if `timestamp` is absent, which never happens for records this
/// node produced but is still possible for a malformed wire message.
impl TryFrom<proto::Record> for Record {
    type Error = strangedb_core::Error;

    fn try_from(record: proto::Record) -> Result<Self, Self::Error> {
        let timestamp = record
            .timestamp
            .ok_or_else(|| strangedb_core::Error::Serialization("missing timestamp".into()))?;
        Ok(Record {
            key: record.key,
            value: record.value,
            timestamp: timestamp.into(),
            tombstone: record.tombstone,
        })
    }
}
