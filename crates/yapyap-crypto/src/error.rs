use thiserror::Error;

/// Errors the four crypto primitives (§4.3) can raise.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("data too short: expected at least {expected} bytes, got {actual}")]
    DataTooShort { expected: usize, actual: usize },

    #[error("codec error building envelope: {0}")]
    Codec(#[from] yapyap_codec::CodecError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
