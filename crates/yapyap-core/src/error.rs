//! Shared low-level errors. Per-crate errors (`CodecError`, `StorageError`,
//! `CryptoError`, ...) live in their own crates and get aggregated by
//! `yapyap-router::RouterError`; this is only what `yapyap-core` itself can
//! fail on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid peer id: {0}")]
    InvalidPeerId(String),
}
