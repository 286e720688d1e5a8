//! Consistent hash ring with virtual nodes. Readers never block other
//! readers; writers (`add_node`/`remove_node`) take an exclusive lock and
//! leave the token array sorted before releasing it.

use std::collections::HashSet;

use md5::{Digest, Md5};
use parking_lot::RwLock;

fn hash(input: &[u8]) -> u64 {
    let digest = Md5::digest(input);
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

struct RingState {
    /// Sorted `(token, owner)` pairs.
    tokens: Vec<(u64, String)>,
    nodes: HashSet<String>,
}

pub struct Ring {
    vnodes: usize,
    state: RwLock<RingState>,
}

impl Ring {
    pub fn new(vnodes: usize) -> Self {
        Self {
            vnodes,
            state: RwLock::new(RingState {
                tokens: Vec::new(),
                nodes: HashSet::new(),
            }),
        }
    }

    /// Idempotent: inserts `vnodes` tokens for `node_url` if not already
    /// present.
    pub fn add_node(&self, node_url: &str) {
        let mut state = self.state.write();
        if state.nodes.contains(node_url) {
            return;
        }
        state.nodes.insert(node_url.to_string());

        for i in 0..self.vnodes {
            let virtual_key = format!("{node_url}:{i}");
            let token = hash(virtual_key.as_bytes());
            state.tokens.push((token, node_url.to_string()));
        }
        state.tokens.sort_by_key(|(token, _)| *token);
    }

    /// Idempotent: removes every token owned by `node_url`.
    pub fn remove_node(&self, node_url: &str) {
        let mut state = self.state.write();
        if !state.nodes.remove(node_url) {
            return;
        }
        state.tokens.retain(|(_, owner)| owner != node_url);
        // Already sorted; retain preserves order.
    }

    pub fn nodes(&self) -> Vec<String> {
        self.state.read().nodes.iter().cloned().collect()
    }

    pub fn vnodes(&self) -> usize {
        self.vnodes
    }

    /// Returns the owner of the first token >= hash(key), wrapping around.
    pub fn get_node(&self, key: &[u8]) -> Option<String> {
        let state = self.state.read();
        if state.tokens.is_empty() {
            return None;
        }
        let target = hash(key);
        let idx = match state.tokens.binary_search_by_key(&target, |(t, _)| *t) {
            Ok(i) => i,
            Err(i) => i,
        };
        let idx = if idx == state.tokens.len() { 0 } else { idx };
        Some(state.tokens[idx].1.clone())
    }

    /// Walks clockwise from hash(key), collecting up to `min(n,
    /// distinct_node_count)` distinct owners in walk order.
    pub fn get_replicas(&self, key: &[u8], n: usize) -> Vec<String> {
        let state = self.state.read();
        if state.nodes.is_empty() {
            return Vec::new();
        }
        let n = n.min(state.nodes.len());
        let target = hash(key);
        let start = match state.tokens.binary_search_by_key(&target, |(t, _)| *t) {
            Ok(i) => i,
            Err(i) => i,
        };
        let start = if start == state.tokens.len() { 0 } else { start };

        let mut replicas = Vec::with_capacity(n);
        let mut seen = HashSet::with_capacity(n);
        let mut idx = start;
        while replicas.len() < n {
            let owner = &state.tokens[idx].1;
            if seen.insert(owner.clone()) {
                replicas.push(owner.clone());
            }
            idx += 1;
            if idx == state.tokens.len() {
                idx = 0;
            }
        }
        replicas
    }
}
