use serde::{Deserialize, Serialize};

use crate::hlc::Timestamp;

/// An immutable versioned value. Updates never mutate a `Record`; they
/// produce a new one that replaces the prior version iff its timestamp is
/// strictly greater (last-writer-wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub timestamp: Timestamp,
    pub tombstone: bool,
}

impl Record {
    pub fn live(key: Vec<u8>, value: Vec<u8>, timestamp: Timestamp) -> Self {
        Self {
            key,
            value,
            timestamp,
            tombstone: false,
        }
    }

    pub fn tombstone(key: Vec<u8>, timestamp: Timestamp) -> Self {
        Self {
            key,
            value: Vec::new(),
            timestamp,
            tombstone: true,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.tombstone
    }
}
