//! End-to-end envelope encryption (§4.3): the four primitives composed into
//! the flow the router calls at send/receive time.
//!
//! generate ephemeral ECDH keypair -> shared secret with recipient's static
//! X25519 key -> derive session key via HKDF -> encrypt serialized payload
//! -> sign the plaintext with the sender's identity key. The envelope
//! carries ciphertext, nonce, ephemeral public key, and signature;
//! decryption reverses the process and rejects on signature mismatch.

use yapyap_core::{PeerId, Value};

use crate::aead::{self, NONCE_BYTES};
use crate::agreement::EphemeralKeypair;
use crate::error::{CryptoError, CryptoResult};
use crate::identity::{self, IdentityKeypair};
use crate::kdf::derive_session_keys;

/// Encrypt `payload` for `recipient_static_public` (the recipient's static
/// X25519 agreement key), signing the plaintext with `sender`.
///
/// Returns a `Value::Map` shaped `{ encrypted: true, ciphertext, nonce,
/// ephemeralPublicKey, signature }` (§6), ready to replace a message's
/// payload field.
pub fn encrypt_payload(
    sender: &IdentityKeypair,
    recipient_static_public: &[u8; 32],
    payload: &Value,
) -> CryptoResult<Value> {
    let serialized = yapyap_codec::encode_value(payload)?;

    let mut ephemeral = EphemeralKeypair::generate();
    let shared_secret = ephemeral.diffie_hellman(recipient_static_public);
    let session_keys = derive_session_keys(shared_secret.as_bytes())?;

    let nonce = aead::generate_nonce();
    let ciphertext = aead::encrypt(&session_keys.encryption_key, &nonce, &serialized)?;
    let signature = sender.sign(&serialized);

    Ok(Value::encrypted_envelope(
        &ciphertext,
        &nonce,
        &ephemeral.public_key(),
        &signature,
    ))
}

/// Reverse [`encrypt_payload`]: derive the same session key from the
/// recipient's static secret and the envelope's ephemeral public key,
/// decrypt, and verify the signature against `sender`'s identity. Rejects
/// if the signature does not verify.
pub fn decrypt_payload(
    sender: &PeerId,
    recipient_static_secret: &crate::agreement::StaticAgreementKey,
    envelope: &Value,
) -> CryptoResult<Value> {
    let map = envelope
        .as_map()
        .ok_or_else(|| CryptoError::DecryptionFailed("envelope is not a map".into()))?;

    let ciphertext = hex_field(map, "ciphertext")?;
    let nonce_bytes = hex_field(map, "nonce")?;
    let ephemeral_public = hex_field(map, "ephemeralPublicKey")?;
    let signature = hex_field(map, "signature")?;

    let nonce: [u8; NONCE_BYTES] = nonce_bytes
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailed("nonce must be 12 bytes".into()))?;
    let ephemeral_public: [u8; 32] = ephemeral_public
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailed("ephemeral key must be 32 bytes".into()))?;

    let shared_secret = recipient_static_secret.diffie_hellman(&ephemeral_public);
    let session_keys = derive_session_keys(shared_secret.as_bytes())?;

    // `derive_session_keys` is a pure function of the (symmetric) ECDH
    // shared secret: both sides compute the same `encryption_key`. There is
    // no per-direction asymmetry here to pick `decryption_key` for, since
    // each envelope is encrypted once by its sender and read once by its
    // recipient, not exchanged over a two-way session.
    let plaintext = aead::decrypt(&session_keys.encryption_key, &nonce, &ciphertext)?;

    identity::verify(sender, &plaintext, &signature)?;

    yapyap_codec::decode_value(&plaintext).map_err(CryptoError::from)
}

fn hex_field(
    map: &std::collections::BTreeMap<String, Value>,
    key: &str,
) -> CryptoResult<Vec<u8>> {
    let s = map
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CryptoError::DecryptionFailed(format!("envelope missing field {key}")))?;
    hex::decode(s).map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agreement::StaticAgreementKey;

    #[test]
    fn encrypt_then_decrypt_round_trips_the_payload() {
        let sender = IdentityKeypair::generate();
        let recipient_static = StaticAgreementKey::generate();
        let payload = Value::String("hi".into());

        let envelope =
            encrypt_payload(&sender, &recipient_static.public_key(), &payload).unwrap();
        assert!(envelope.is_encrypted_envelope());

        let decrypted = decrypt_payload(&sender.peer_id(), &recipient_static, &envelope).unwrap();
        assert_eq!(decrypted, payload);
    }

    #[test]
    fn decrypt_rejects_wrong_sender_identity() {
        let sender = IdentityKeypair::generate();
        let impostor = IdentityKeypair::generate();
        let recipient_static = StaticAgreementKey::generate();
        let payload = Value::String("hi".into());

        let envelope =
            encrypt_payload(&sender, &recipient_static.public_key(), &payload).unwrap();

        let result = decrypt_payload(&impostor.peer_id(), &recipient_static, &envelope);
        assert!(result.is_err());
    }
}
