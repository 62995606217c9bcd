//! Peer identity: the canonical string form of a node's long-lived public key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Length in bytes of the underlying Ed25519 public key.
pub const PEER_ID_BYTES: usize = 32;

/// A node's network identifier: the hex-encoded canonical form of its
/// long-lived Ed25519 public signing key.
///
/// `PeerId` is deliberately opaque to the signing/verification machinery
/// that produces it — `yapyap-crypto` constructs one from a `VerifyingKey`,
/// every other crate just carries it as a comparable, hashable, serializable
/// value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Build a `PeerId` from raw public key bytes.
    pub fn from_bytes(bytes: &[u8; PEER_ID_BYTES]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Parse a `PeerId` from its canonical hex string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let raw = hex::decode(s).map_err(|e| CoreError::InvalidPeerId(e.to_string()))?;
        if raw.len() != PEER_ID_BYTES {
            return Err(CoreError::InvalidPeerId(format!(
                "expected {PEER_ID_BYTES} bytes, got {}",
                raw.len()
            )));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// The canonical string form, as carried in tables and messages.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode back to the raw 32-byte public key.
    pub fn to_bytes(&self) -> [u8; PEER_ID_BYTES] {
        let raw = hex::decode(&self.0).expect("PeerId invariant: always valid hex");
        raw.try_into().expect("PeerId invariant: always 32 bytes")
    }

    /// A short form suitable for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for PeerId {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_bytes() {
        let bytes = [7u8; PEER_ID_BYTES];
        let id = PeerId::from_bytes(&bytes);
        assert_eq!(id.to_bytes(), bytes);
    }

    #[test]
    fn parses_and_rejects() {
        let bytes = [1u8; PEER_ID_BYTES];
        let id = PeerId::from_bytes(&bytes);
        let parsed = PeerId::parse(id.as_str()).unwrap();
        assert_eq!(id, parsed);

        assert!(PeerId::parse("not-hex").is_err());
        assert!(PeerId::parse("aabb").is_err()); // too short
    }

    #[test]
    fn orders_lexicographically_by_hex() {
        let a = PeerId::from_bytes(&[0u8; PEER_ID_BYTES]);
        let b = PeerId::from_bytes(&[1u8; PEER_ID_BYTES]);
        assert!(a < b);
    }
}
