//! Identity signing: keypair generation, detached signatures, verification.
//! Ed25519-class primitive (§4.3 op 1).

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use yapyap_core::PeerId;

use crate::error::{CryptoError, CryptoResult};

/// A node's long-lived identity signing keypair.
pub struct IdentityKeypair {
    signing_key: SigningKey,
}

impl IdentityKeypair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// This keypair's peer id: the hex-encoded verifying key.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_bytes(&self.verifying_key().to_bytes())
    }

    /// Detached signature over arbitrary bytes.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Verify a detached signature against a peer's public signing key.
pub fn verify(peer: &PeerId, message: &[u8], signature: &[u8]) -> CryptoResult<()> {
    let verifying_key = VerifyingKey::from_bytes(&peer.to_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("signature must be 64 bytes".into()))?;
    let signature = Signature::from_bytes(&sig_bytes);
    verifying_key
        .verify(message, &signature)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let keypair = IdentityKeypair::generate();
        let peer = keypair.peer_id();
        let sig = keypair.sign(b"hello");
        verify(&peer, b"hello", &sig).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let keypair = IdentityKeypair::generate();
        let peer = keypair.peer_id();
        let sig = keypair.sign(b"hello");
        assert!(verify(&peer, b"goodbye", &sig).is_err());
    }

    #[test]
    fn keys_round_trip_through_bytes() {
        let keypair = IdentityKeypair::generate();
        let bytes = keypair.to_bytes();
        let reloaded = IdentityKeypair::from_bytes(&bytes);
        assert_eq!(keypair.peer_id(), reloaded.peer_id());
    }
}
