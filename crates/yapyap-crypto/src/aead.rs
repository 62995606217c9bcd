//! Authenticated encryption: 256-bit key, 96-bit nonce, 128-bit integrity
//! tag appended to the ciphertext. AES-GCM-256-class primitive (§4.3 op 3).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

pub const KEY_BYTES: usize = 32;
pub const NONCE_BYTES: usize = 12;

/// Generate a random 96-bit nonce suitable for one AES-GCM-256 call.
pub fn generate_nonce() -> [u8; NONCE_BYTES] {
    let mut nonce = [0u8; NONCE_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` under `key`/`nonce`, returning ciphertext with the
/// 128-bit tag appended.
pub fn encrypt(
    key: &[u8; KEY_BYTES],
    nonce: &[u8; NONCE_BYTES],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Decrypt and verify ciphertext (with appended tag) produced by [`encrypt`].
pub fn decrypt(
    key: &[u8; KEY_BYTES],
    nonce: &[u8; NONCE_BYTES],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let key = [3u8; KEY_BYTES];
        let nonce = generate_nonce();
        let ciphertext = encrypt(&key, &nonce, b"top secret").unwrap();
        let plaintext = decrypt(&key, &nonce, &ciphertext).unwrap();
        assert_eq!(plaintext, b"top secret");
    }

    #[test]
    fn decrypt_rejects_tampered_ciphertext() {
        let key = [3u8; KEY_BYTES];
        let nonce = generate_nonce();
        let mut ciphertext = encrypt(&key, &nonce, b"top secret").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xff;
        assert!(decrypt(&key, &nonce, &ciphertext).is_err());
    }

    #[test]
    fn decrypt_rejects_wrong_key() {
        let key = [3u8; KEY_BYTES];
        let wrong_key = [4u8; KEY_BYTES];
        let nonce = generate_nonce();
        let ciphertext = encrypt(&key, &nonce, b"top secret").unwrap();
        assert!(decrypt(&wrong_key, &nonce, &ciphertext).is_err());
    }
}
