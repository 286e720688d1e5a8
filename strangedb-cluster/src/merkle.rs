//! Merkle tree over a sorted key range, used by anti-entropy to find
//! mismatched ranges between two replicas without transferring every key.
//!
//! The upper bound of the root range is represented as `None` (unbounded)
//! rather than a sentinel byte string, since keys here are arbitrary binary
//! blobs and no byte value is guaranteed to sort last.

use sha2::{Digest, Sha256};
use strangedb_core::hlc::Timestamp;

const LEAF_MAX_KEYS: usize = 4;
const MAX_DEPTH: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Option<Vec<u8>>,
}

impl KeyRange {
    fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && self.end.as_deref().map_or(true, |end| key < end)
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        range: KeyRange,
        hash: [u8; 32],
        keys: Vec<Vec<u8>>,
    },
    Branch {
        range: KeyRange,
        hash: [u8; 32],
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn hash(&self) -> [u8; 32] {
        match self {
            Node::Leaf { hash, .. } => *hash,
            Node::Branch { hash, .. } => *hash,
        }
    }

    fn range(&self) -> &KeyRange {
        match self {
            Node::Leaf { range, .. } => range,
            Node::Branch { range, .. } => range,
        }
    }
}

/// A Merkle tree built over `(key, value_hash)` pairs for a key range.
/// Leaves hold at most [`LEAF_MAX_KEYS`] keys or are forced by [`MAX_DEPTH`].
pub struct MerkleTree {
    root: Option<Node>,
}

fn hash_entry(key: &[u8], value_hash: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(value_hash);
    hasher.finalize().into()
}

/// `H(value ∥ ts.wall_time.to_be_bytes() ∥ ts.logical.to_be_bytes() ∥
/// ts.node_id.as_bytes())`, so two replicas holding identical bytes at
/// different HLCs still diverge in the tree.
fn hash_value(value: &[u8], timestamp: &Timestamp) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value);
    hasher.update(timestamp.wall_time.to_be_bytes());
    hasher.update(timestamp.logical.to_be_bytes());
    hasher.update(timestamp.node_id.as_bytes());
    hasher.finalize().into()
}

fn combine(left: [u8; 32], right: [u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

impl MerkleTree {
    /// Builds a tree over `entries`, a `(key, value, timestamp)` slice
    /// already sorted by key with no duplicate keys.
    pub fn build(entries: &[(Vec<u8>, Vec<u8>, Timestamp)]) -> Self {
        let range = KeyRange {
            start: entries.first().map(|(k, _, _)| k.clone()).unwrap_or_default(),
            end: None,
        };
        let root = if entries.is_empty() {
            None
        } else {
            Some(build_node(entries, range, 0))
        };
        Self { root }
    }

    pub fn root_hash(&self) -> Option<[u8; 32]> {
        self.root.as_ref().map(Node::hash)
    }

    /// Returns the key ranges where `self` and `other` disagree, recursing
    /// into mismatched branches and stopping at leaves or absent subtrees.
    pub fn compare(&self, other: &MerkleTree) -> Vec<KeyRange> {
        match (&self.root, &other.root) {
            (None, None) => Vec::new(),
            (None, Some(n)) | (Some(n), None) => vec![n.range().clone()],
            (Some(a), Some(b)) => compare_nodes(a, b),
        }
    }
}

fn build_node(entries: &[(Vec<u8>, Vec<u8>, Timestamp)], range: KeyRange, depth: usize) -> Node {
    if entries.len() <= LEAF_MAX_KEYS || depth >= MAX_DEPTH {
        let mut hash = [0u8; 32];
        for (key, value, timestamp) in entries {
            let entry_hash = hash_entry(key, &hash_value(value, timestamp));
            hash = combine(hash, entry_hash);
        }
        return Node::Leaf {
            range,
            hash,
            keys: entries.iter().map(|(k, _, _)| k.clone()).collect(),
        };
    }

    let mid = entries.len() / 2;
    let split_key = entries[mid].0.clone();
    let (left_entries, right_entries) = entries.split_at(mid);

    let left_range = KeyRange {
        start: range.start.clone(),
        end: Some(split_key.clone()),
    };
    let right_range = KeyRange {
        start: split_key,
        end: range.end.clone(),
    };

    let left = build_node(left_entries, left_range, depth + 1);
    let right = build_node(right_entries, right_range, depth + 1);
    let hash = combine(left.hash(), right.hash());

    Node::Branch {
        range,
        hash,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn compare_nodes(a: &Node, b: &Node) -> Vec<KeyRange> {
    if a.hash() == b.hash() {
        return Vec::new();
    }

    match (a, b) {
        (Node::Branch { left: al, right: ar, .. }, Node::Branch { left: bl, right: br, .. }) => {
            let mut mismatches = compare_nodes(al, bl);
            mismatches.extend(compare_nodes(ar, br));
            mismatches
        }
        _ => vec![a.range().clone()],
    }
}
