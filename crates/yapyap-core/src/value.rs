//! The structured value model carried by message payloads.
//!
//! Deliberately a closed tagged enum rather than `serde_json::Value`: the
//! wire codec (`yapyap-codec`) serializes this shape msgpack-compatibly, and
//! encryption envelopes are a further closed variant layered on top (§9).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A free-form structured value: `null | bool | int | string | bytes | array | map`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Build an encrypted-envelope map shape: `{ encrypted: true, ciphertext,
    /// nonce, ephemeralPublicKey, signature }`, all byte fields as hex.
    pub fn encrypted_envelope(
        ciphertext: &[u8],
        nonce: &[u8],
        ephemeral_public_key: &[u8],
        signature: &[u8],
    ) -> Self {
        let mut map = BTreeMap::new();
        map.insert("encrypted".to_string(), Value::Bool(true));
        map.insert(
            "ciphertext".to_string(),
            Value::String(hex::encode(ciphertext)),
        );
        map.insert("nonce".to_string(), Value::String(hex::encode(nonce)));
        map.insert(
            "ephemeralPublicKey".to_string(),
            Value::String(hex::encode(ephemeral_public_key)),
        );
        map.insert(
            "signature".to_string(),
            Value::String(hex::encode(signature)),
        );
        Value::Map(map)
    }

    /// True if this value has the shape an encrypted envelope produces.
    pub fn is_encrypted_envelope(&self) -> bool {
        self.as_map()
            .and_then(|m| m.get("encrypted"))
            .map(|v| matches!(v, Value::Bool(true)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_as_map() {
        let v = Value::encrypted_envelope(b"ct", b"nonce123456", b"epk", b"sig");
        assert!(v.is_encrypted_envelope());
        let map = v.as_map().unwrap();
        assert_eq!(map.get("ciphertext").unwrap().as_str(), Some(hex::encode(b"ct")).as_deref());
    }

    #[test]
    fn plain_values_are_not_envelopes() {
        assert!(!Value::String("hi".into()).is_encrypted_envelope());
        assert!(!Value::Null.is_encrypted_envelope());
    }
}
