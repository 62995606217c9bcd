//! Router error aggregation (§7): every leaf crate's error folds into one
//! type so callers of `send`/`receive` see a single surface.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("codec error: {0}")]
    Codec(#[from] yapyap_codec::CodecError),

    #[error("framer error: {0}")]
    Framer(#[from] yapyap_codec::FramerError),

    #[error("storage error: {0}")]
    Storage(#[from] yapyap_storage::StorageError),

    #[error("crypto error: {0}")]
    Crypto(#[from] yapyap_crypto::CryptoError),

    #[error("session error: {0}")]
    Session(#[from] yapyap_session::SessionError),

    #[error("transport error: {0}")]
    Transport(#[from] yapyap_transport::TransportError),

    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("max retries exceeded for message {0}")]
    MaxRetriesExceeded(String),

    #[error("deadline exceeded for message {0}")]
    DeadlineExceeded(String),

    #[error("rate limited")]
    RateLimited,

    #[error("sequence violation: {0}")]
    SequenceViolation(String),

    #[error("vector clock stale for sender {0}")]
    VectorClockStale(String),
}

pub type RouterResult<T> = Result<T, RouterError>;
