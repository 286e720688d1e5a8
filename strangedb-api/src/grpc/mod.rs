pub mod client;
mod convert;
pub mod server;

pub mod proto {
    tonic::include_proto!("strangedb.peer");
}

pub use client::GrpcPeerClient;
pub use server::PeerServer;
