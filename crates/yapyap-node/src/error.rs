//! Error types for the node composition root.

use thiserror::Error;

/// Errors that can occur wiring or operating a node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("router error: {0}")]
    Router(#[from] yapyap_router::RouterError),

    #[error("storage error: {0}")]
    Storage(#[from] yapyap_storage::StorageError),

    #[error("session error: {0}")]
    Session(#[from] yapyap_session::SessionError),

    #[error("crypto error: {0}")]
    Crypto(#[from] yapyap_crypto::CryptoError),

    #[error("peer not found: {0}")]
    PeerNotFound(String),

    #[error("node already started")]
    AlreadyStarted,

    #[error("node not started")]
    NotStarted,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("io error: {0}")]
    Io(String),
}

/// Result type alias for node operations.
pub type NodeResult<T> = Result<T, NodeError>;
