use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no session for peer {0}")]
    NoSession(String),

    #[error(transparent)]
    Crypto(#[from] yapyap_crypto::CryptoError),

    #[error(transparent)]
    Storage(#[from] yapyap_storage::StorageError),
}

pub type SessionResult<T> = Result<T, SessionError>;
