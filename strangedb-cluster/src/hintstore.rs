//! Per-target hint queues for hinted handoff: when a replica write fails
//! because its target is down, the record is parked here until the target
//! comes back and the handoff loop replays it.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use strangedb_core::Record;

#[derive(Clone)]
struct Hint {
    record: Record,
    stored_at: Instant,
}

pub struct HintStore {
    max_hints: usize,
    ttl: Duration,
    queues: DashMap<String, VecDeque<Hint>>,
}

impl HintStore {
    pub fn new(max_hints: usize, ttl: Duration) -> Self {
        Self {
            max_hints,
            ttl,
            queues: DashMap::new(),
        }
    }

    /// Appends a hint for `target`. If the queue is already at
    /// `max_hints`, the oldest hint is dropped to make room (FIFO eviction).
    pub fn add(&self, target: &str, record: Record) {
        let mut queue = self.queues.entry(target.to_string()).or_default();
        if queue.len() >= self.max_hints {
            queue.pop_front();
        }
        queue.push_back(Hint {
            record,
            stored_at: Instant::now(),
        });
    }

    /// Removes and returns every non-expired hint queued for `target`,
    /// dropping expired ones along the way.
    pub fn drain(&self, target: &str) -> Vec<Record> {
        let Some(mut queue) = self.queues.get_mut(target) else {
            return Vec::new();
        };
        let now = Instant::now();
        let drained: Vec<Record> = queue
            .drain(..)
            .filter(|hint| now.duration_since(hint.stored_at) <= self.ttl)
            .map(|hint| hint.record)
            .collect();
        drained
    }

    /// Drops expired hints from every queue without replaying them.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for mut entry in self.queues.iter_mut() {
            let before = entry.len();
            entry.retain(|hint| now.duration_since(hint.stored_at) <= self.ttl);
            removed += before - entry.len();
        }
        removed
    }

    pub fn targets_with_hints(&self) -> Vec<String> {
        self.queues
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len_for(&self, target: &str) -> usize {
        self.queues.get(target).map(|q| q.len()).unwrap_or(0)
    }
}
