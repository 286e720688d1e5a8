//! Hybrid logical clock: physical time plus a causally-correct counter,
//! producing a total order across timestamps generated by distinct nodes
//! without requiring synchronized clocks.

use std::cmp::Ordering;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A single HLC timestamp. Total order is lexicographic on
/// `(wall_time, logical, node_id)`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Timestamp {
    pub wall_time: i64,
    pub logical: u32,
    pub node_id: String,
}

impl Timestamp {
    pub fn zero(node_id: impl Into<String>) -> Self {
        Self {
            wall_time: 0,
            logical: 0,
            node_id: node_id.into(),
        }
    }

    pub fn is_after(&self, other: &Timestamp) -> bool {
        self > other
    }

    pub fn is_before(&self, other: &Timestamp) -> bool {
        self < other
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.wall_time, self.logical, &self.node_id).cmp(&(
            other.wall_time,
            other.logical,
            &other.node_id,
        ))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn physical_now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i64
}

/// Monotone hybrid logical clock for a single node. Never fails; every
/// `now`/`update` is O(1) and internally serialized behind a short mutex,
/// safe to call from any thread.
#[derive(Debug)]
pub struct HlcClock {
    node_id: String,
    last: Mutex<Timestamp>,
}

impl HlcClock {
    pub fn new(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        let last = Timestamp::zero(node_id.clone());
        Self {
            node_id,
            last: Mutex::new(last),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Returns a timestamp strictly greater than every prior timestamp
    /// produced locally.
    pub fn now(&self) -> Timestamp {
        let mut last = self.last.lock().unwrap();
        let pt = physical_now_nanos();

        let next = if pt > last.wall_time {
            Timestamp {
                wall_time: pt,
                logical: 0,
                node_id: self.node_id.clone(),
            }
        } else {
            Timestamp {
                wall_time: last.wall_time,
                logical: last.logical + 1,
                node_id: self.node_id.clone(),
            }
        };

        *last = next.clone();
        next
    }

    /// Merges an incoming timestamp so future local times exceed it.
    pub fn update(&self, received: &Timestamp) -> Timestamp {
        let mut last = self.last.lock().unwrap();
        let pt = physical_now_nanos();
        let l = last.wall_time;
        let r = received.wall_time;

        let next = if pt > l && pt > r {
            Timestamp {
                wall_time: pt,
                logical: 0,
                node_id: self.node_id.clone(),
            }
        } else if l > pt && l > r {
            Timestamp {
                wall_time: l,
                logical: last.logical + 1,
                node_id: self.node_id.clone(),
            }
        } else if r > pt && r > l {
            Timestamp {
                wall_time: r,
                logical: received.logical + 1,
                node_id: self.node_id.clone(),
            }
        } else {
            // l == r, or neither branch above applies with strict
            // inequality (possible only when pt, l and r tie pairwise).
            Timestamp {
                wall_time: l,
                logical: last.logical.max(received.logical) + 1,
                node_id: self.node_id.clone(),
            }
        };

        *last = next.clone();
        next
    }
}

pub fn compare(a: &Timestamp, b: &Timestamp) -> Ordering {
    a.cmp(b)
}
