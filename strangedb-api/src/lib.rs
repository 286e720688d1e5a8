pub mod grpc;
pub mod http;

pub use grpc::proto;
pub use grpc::{GrpcPeerClient, PeerServer};
pub use http::{router, AppState};
