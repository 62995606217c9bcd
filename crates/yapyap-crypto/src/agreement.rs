//! Ephemeral key agreement: ephemeral keypair generation and ECDH against a
//! static public key. X25519-class primitive (§4.3 op 2).

use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret, StaticSecret};

/// A one-shot ephemeral X25519 keypair, consumed by a single ECDH.
pub struct EphemeralKeypair {
    secret: Option<EphemeralSecret>,
    public: PublicKey,
}

impl EphemeralKeypair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret: Some(secret),
            public,
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Consume this keypair's secret half, producing the shared secret with
    /// `their_public`. Can only be called once (enforced by taking the
    /// `Option`), matching the "ephemeral" contract.
    pub fn diffie_hellman(&mut self, their_public: &[u8; 32]) -> SharedSecret {
        let secret = self
            .secret
            .take()
            .expect("EphemeralKeypair::diffie_hellman called more than once");
        secret.diffie_hellman(&PublicKey::from(*their_public))
    }
}

/// A node's long-lived static X25519 key, used as the ECDH target that
/// ephemeral senders agree against.
pub struct StaticAgreementKey {
    secret: StaticSecret,
}

impl StaticAgreementKey {
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub fn public_key(&self) -> [u8; 32] {
        PublicKey::from(&self.secret).to_bytes()
    }

    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> SharedSecret {
        self.secret.diffie_hellman(&PublicKey::from(*their_public))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_and_static_agree_on_same_secret() {
        let static_key = StaticAgreementKey::generate();
        let mut ephemeral = EphemeralKeypair::generate();

        let shared_by_sender = ephemeral.diffie_hellman(&static_key.public_key());
        let shared_by_recipient = static_key.diffie_hellman(&ephemeral.public_key());

        assert_eq!(shared_by_sender.as_bytes(), shared_by_recipient.as_bytes());
    }
}
