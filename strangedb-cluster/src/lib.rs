pub mod antientropy;
pub mod coordinator;
pub mod gossip;
pub mod hintedhandoff;
pub mod hintstore;
pub mod membership;
pub mod merkle;
pub mod readrepair;
pub mod ring;

pub use antientropy::{AntiEntropy, AntiEntropyTransport};
pub use coordinator::{Coordinator, PeerClient, PeerClientDelivery};
pub use gossip::{GossipTransport, Gossiper};
pub use hintedhandoff::{HintDelivery, HintedHandoff};
pub use hintstore::HintStore;
pub use membership::{Member, Membership, NodeState};
pub use merkle::{KeyRange, MerkleTree};
pub use readrepair::{ReadRepair, ReplicaAnswer};
pub use ring::Ring;
