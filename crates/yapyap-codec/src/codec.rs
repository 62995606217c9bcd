//! The structured value codec: a binary key/value serializer with
//! integer, string, bytes, array, map, boolean, and null types. msgpack-
//! compatible, per §4.1/§6.

use serde::{de::DeserializeOwned, Serialize};
use yapyap_core::Value;

use crate::error::CodecError;

/// Encode any serializable type to its msgpack-compatible byte
/// representation. Message envelopes and [`Value`] payloads alike go
/// through this one path.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    rmp_serde::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode any deserializable type from its msgpack-compatible byte
/// representation.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    rmp_serde::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Encode a [`Value`] to its msgpack-compatible byte representation.
pub fn encode_value(value: &Value) -> Result<Vec<u8>, CodecError> {
    encode(value)
}

/// Decode a [`Value`] from its msgpack-compatible byte representation.
pub fn decode_value(bytes: &[u8]) -> Result<Value, CodecError> {
    decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn round_trips_every_variant() {
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), Value::Int(7));
        let values = vec![
            Value::Null,
            Value::Bool(true),
            Value::Int(-42),
            Value::String("hello".into()),
            Value::Bytes(vec![1, 2, 3]),
            Value::Array(vec![Value::Int(1), Value::Int(2)]),
            Value::Map(map),
        ];
        for v in values {
            let encoded = encode_value(&v).unwrap();
            let decoded = decode_value(&encoded).unwrap();
            assert_eq!(v, decoded);
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_value(&[0xc1]).is_err());
    }
}
