use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("key not found")]
    KeyNotFound,

    #[error("quorum not reached")]
    QuorumNotReached,

    #[error("no nodes available to serve this key")]
    NoNodesAvailable,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
