//! Relay envelopes and relay candidate selection (§4.6 "Relay escalation",
//! §4.6 step 6, §8 I6).

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use yapyap_core::{peer_distance, Message, MessageId, MessageKind, PeerId, Value};
use yapyap_crypto::identity::{verify, IdentityKeypair};

use crate::error::{RouterError, RouterResult};

/// A relay envelope: carries the original message plus enough provenance to
/// let the recipient verify it was neither forged nor corrupted in transit.
#[derive(Debug, Clone)]
pub struct RelayEnvelope {
    pub target: PeerId,
    pub original_message: Message,
    pub recovery_reason: Option<String>,
    pub last_transport_error: Option<String>,
    pub integrity_hash: Vec<u8>,
    pub signer: PeerId,
    pub signature: Vec<u8>,
}

fn canonical_message_bytes(message: &Message) -> RouterResult<Vec<u8>> {
    yapyap_codec::encode(message).map_err(RouterError::from)
}

fn signing_bytes(
    target: &PeerId,
    original_hash_input: &[u8],
    recovery_reason: &Option<String>,
    last_transport_error: &Option<String>,
    integrity_hash: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(target.as_str().as_bytes());
    buf.extend_from_slice(original_hash_input);
    if let Some(reason) = recovery_reason {
        buf.extend_from_slice(reason.as_bytes());
    }
    if let Some(err) = last_transport_error {
        buf.extend_from_slice(err.as_bytes());
    }
    buf.extend_from_slice(integrity_hash);
    buf
}

/// Build a relay envelope for `original` bound for `target`, signed by
/// `signer`.
pub fn build_relay_envelope(
    signer: &IdentityKeypair,
    target: PeerId,
    original: Message,
    recovery_reason: Option<String>,
    last_transport_error: Option<String>,
) -> RouterResult<RelayEnvelope> {
    let canonical = canonical_message_bytes(&original)?;
    let integrity_hash = Sha256::digest(&canonical).to_vec();

    let to_sign = signing_bytes(
        &target,
        &canonical,
        &recovery_reason,
        &last_transport_error,
        &integrity_hash,
    );
    let signature = signer.sign(&to_sign).to_vec();

    Ok(RelayEnvelope {
        target,
        original_message: original,
        recovery_reason,
        last_transport_error,
        integrity_hash,
        signer: signer.peer_id(),
        signature,
    })
}

/// Recompute the integrity hash and verify the signature (§4.6 step 6, §8
/// I6). Never stores a pending message derived from an envelope that fails
/// either check.
pub fn verify_relay_envelope(envelope: &RelayEnvelope) -> RouterResult<()> {
    let canonical = canonical_message_bytes(&envelope.original_message)?;
    let recomputed_hash = Sha256::digest(&canonical).to_vec();
    if recomputed_hash != envelope.integrity_hash {
        return Err(RouterError::IntegrityFailure(
            "integrity hash mismatch".to_string(),
        ));
    }

    let to_verify = signing_bytes(
        &envelope.target,
        &canonical,
        &envelope.recovery_reason,
        &envelope.last_transport_error,
        &envelope.integrity_hash,
    );

    let signature: [u8; 64] = envelope
        .signature
        .as_slice()
        .try_into()
        .map_err(|_| RouterError::IntegrityFailure("malformed signature".to_string()))?;

    verify(&envelope.signer, &to_verify, &signature)
        .map_err(|_| RouterError::IntegrityFailure("signature verification failed".to_string()))
}

/// Candidate relay peers drawn from the routing cache, ranked per §4.6
/// "Relay escalation": reputation descending, then Kademlia XOR distance to
/// the target ascending (ties broken lexicographically on the XOR value).
pub fn select_relay_candidates(
    target: &PeerId,
    self_id: &PeerId,
    candidates: impl IntoIterator<Item = PeerId>,
    reputation: &crate::reputation::ReputationTable,
    reputation_threshold: i64,
    count: usize,
    fallback_relays: &[PeerId],
) -> Vec<PeerId> {
    let mut ranked: Vec<PeerId> = candidates
        .into_iter()
        .filter(|peer| peer != target && peer != self_id)
        .filter(|peer| !reputation.is_blocked(peer, reputation_threshold))
        .collect();

    ranked.sort_by(|a, b| {
        reputation
            .score(b)
            .cmp(&reputation.score(a))
            .then_with(|| peer_distance(target, a).cmp(&peer_distance(target, b)))
    });

    ranked.truncate(count);

    if ranked.len() < count {
        for fallback in fallback_relays {
            if ranked.len() >= count {
                break;
            }
            if fallback != target && fallback != self_id && !ranked.contains(fallback) {
                ranked.push(fallback.clone());
            }
        }
    }

    ranked
}

/// Encode a [`RelayEnvelope`] as a wire `Message` of kind `relay-envelope`
/// (§6 protocol id `/yapyap/message/1.0.0`).
pub fn encode_relay_envelope(envelope: &RelayEnvelope, from: PeerId, now_ms: i64) -> Message {
    let mut map = BTreeMap::new();
    map.insert("target".to_string(), Value::String(envelope.target.to_string()));
    map.insert(
        "originalMessage".to_string(),
        Value::Bytes(yapyap_codec::encode(&envelope.original_message).unwrap_or_default()),
    );
    map.insert(
        "recoveryReason".to_string(),
        envelope
            .recovery_reason
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    map.insert(
        "lastTransportError".to_string(),
        envelope
            .last_transport_error
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    map.insert("integrityHash".to_string(), Value::Bytes(envelope.integrity_hash.clone()));
    map.insert("signer".to_string(), Value::String(envelope.signer.to_string()));
    map.insert("signature".to_string(), Value::Bytes(envelope.signature.clone()));

    Message {
        id: MessageId::new(),
        kind: MessageKind::RelayEnvelope,
        from,
        to: envelope.target.clone(),
        payload: Value::Map(map),
        timestamp_ms: now_ms,
        sequence_number: None,
        ttl_ms: envelope.original_message.ttl_ms,
        vector_clock: None,
        signature: None,
    }
}

/// Reverse [`encode_relay_envelope`]: pull a [`RelayEnvelope`] back out of a
/// wire `Message`'s payload map.
pub fn decode_relay_envelope(message: &Message) -> RouterResult<RelayEnvelope> {
    let map = message
        .payload
        .as_map()
        .ok_or_else(|| RouterError::IntegrityFailure("relay envelope payload is not a map".into()))?;

    let target = map
        .get("target")
        .and_then(Value::as_str)
        .ok_or_else(|| RouterError::IntegrityFailure("missing target".into()))?;
    let target = PeerId::parse(target).map_err(|e| RouterError::IntegrityFailure(e.to_string()))?;

    let original_bytes = map
        .get("originalMessage")
        .and_then(Value::as_bytes)
        .ok_or_else(|| RouterError::IntegrityFailure("missing originalMessage".into()))?;
    let original_message: Message = yapyap_codec::decode(original_bytes)?;

    let integrity_hash = map
        .get("integrityHash")
        .and_then(Value::as_bytes)
        .ok_or_else(|| RouterError::IntegrityFailure("missing integrityHash".into()))?
        .to_vec();

    let signer_str = map
        .get("signer")
        .and_then(Value::as_str)
        .ok_or_else(|| RouterError::IntegrityFailure("missing signer".into()))?;
    let signer = PeerId::parse(signer_str).map_err(|e| RouterError::IntegrityFailure(e.to_string()))?;

    let signature = map
        .get("signature")
        .and_then(Value::as_bytes)
        .ok_or_else(|| RouterError::IntegrityFailure("missing signature".into()))?
        .to_vec();

    let recovery_reason = map.get("recoveryReason").and_then(Value::as_str).map(str::to_string);
    let last_transport_error = map
        .get("lastTransportError")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(RelayEnvelope {
        target,
        original_message,
        recovery_reason,
        last_transport_error,
        integrity_hash,
        signer,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(byte: u8) -> PeerId {
        PeerId::from_bytes(&[byte; 32])
    }

    #[test]
    fn relay_envelope_round_trips_verification() {
        let signer = IdentityKeypair::generate();
        let original = Message::data(peer(1), peer(2), Value::Null, 1_000);
        let envelope =
            build_relay_envelope(&signer, peer(3), original, None, None).unwrap();
        assert!(verify_relay_envelope(&envelope).is_ok());
    }

    #[test]
    fn tampered_original_message_fails_verification() {
        let signer = IdentityKeypair::generate();
        let original = Message::data(peer(1), peer(2), Value::Null, 1_000);
        let mut envelope =
            build_relay_envelope(&signer, peer(3), original, None, None).unwrap();
        envelope.original_message.timestamp_ms += 1;
        assert!(verify_relay_envelope(&envelope).is_err());
    }

    #[test]
    fn candidate_selection_excludes_target_self_and_blocked() {
        let reputation = crate::reputation::ReputationTable::new();
        reputation.adjust(&peer(9), -100);

        let candidates = vec![peer(1), peer(2), peer(3), peer(9)];
        let selected = select_relay_candidates(
            &peer(2),
            &peer(1),
            candidates,
            &reputation,
            -40,
            2,
            &[],
        );

        assert!(!selected.contains(&peer(2)));
        assert!(!selected.contains(&peer(1)));
        assert!(!selected.contains(&peer(9)));
    }
}
