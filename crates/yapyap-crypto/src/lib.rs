//! # yapyap-crypto
//!
//! The four primitives the router depends on (§4.3): identity signing,
//! ephemeral key agreement, authenticated encryption, and session-key
//! derivation, composed into the end-to-end envelope flow.

pub mod aead;
pub mod agreement;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod kdf;

pub use aead::{decrypt, encrypt, generate_nonce};
pub use agreement::{EphemeralKeypair, StaticAgreementKey};
pub use envelope::{decrypt_payload, encrypt_payload};
pub use error::CryptoError;
pub use identity::{verify, IdentityKeypair};
pub use kdf::{derive_session_keys, SessionKeys};
