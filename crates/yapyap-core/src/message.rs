//! The message envelope and the data it carries (§3, §6).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::peer_id::PeerId;
use crate::value::Value;

/// Unique message identifier. UUID-equivalent, 128 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The kind of a message envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Data,
    Ack,
    Nak,
    RelayEnvelope,
}

/// A mapping of peer id to counter, merged under monotone max (§3, §9).
pub type VectorClock = BTreeMap<PeerId, u64>;

/// Raise every entry in `base` to at least the corresponding entry in
/// `incoming`, adding any peer ids only `incoming` knows about.
pub fn merge_vector_clocks(base: &mut VectorClock, incoming: &VectorClock) {
    for (peer, counter) in incoming {
        let entry = base.entry(peer.clone()).or_insert(0);
        if *counter > *entry {
            *entry = *counter;
        }
    }
}

/// An immutable message record (§3).
///
/// Invariant: `sender != recipient` for outbound sends; `id` is globally
/// unique; `timestamp_ms` is wall-clock but validated against a skew window
/// on receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub kind: MessageKind,
    pub from: PeerId,
    pub to: PeerId,
    pub payload: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Monotonic per sender, present on data messages.
    pub sequence_number: Option<u64>,
    /// Time-to-live in milliseconds, used to compute a queue deadline.
    pub ttl_ms: Option<i64>,
    pub vector_clock: Option<VectorClock>,
    /// Detached signature over the canonical serialization of the envelope
    /// minus this field.
    pub signature: Option<Vec<u8>>,
}

impl Message {
    /// Default TTL applied when a send omits one: 24 h, per §4.6 step 2.
    pub const DEFAULT_TTL_MS: i64 = 24 * 60 * 60 * 1000;

    /// Default skew window for timestamp validation on receive: 5 min.
    pub const SKEW_WINDOW_MS: i64 = 5 * 60 * 1000;

    pub fn data(from: PeerId, to: PeerId, payload: Value, timestamp_ms: i64) -> Self {
        Self {
            id: MessageId::new(),
            kind: MessageKind::Data,
            from,
            to,
            payload,
            timestamp_ms,
            sequence_number: None,
            ttl_ms: Some(Self::DEFAULT_TTL_MS),
            vector_clock: None,
            signature: None,
        }
    }

    pub fn ack_for(&self, from: PeerId, timestamp_ms: i64) -> Self {
        Self {
            id: MessageId::new(),
            kind: MessageKind::Ack,
            from,
            to: self.from.clone(),
            payload: Value::String(self.id.to_string()),
            timestamp_ms,
            sequence_number: None,
            ttl_ms: None,
            vector_clock: None,
            signature: None,
        }
    }

    pub fn within_skew(&self, now_ms: i64) -> bool {
        (now_ms - self.timestamp_ms).abs() <= Self::SKEW_WINDOW_MS
    }

    pub fn deadline_ms(&self, now_ms: i64) -> i64 {
        now_ms + self.ttl_ms.unwrap_or(Self::DEFAULT_TTL_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(byte: u8) -> PeerId {
        PeerId::from_bytes(&[byte; 32])
    }

    #[test]
    fn vector_clock_merge_is_monotone_max() {
        let mut base = VectorClock::new();
        base.insert(peer(1), 3);
        let mut incoming = VectorClock::new();
        incoming.insert(peer(1), 1);
        incoming.insert(peer(2), 5);

        merge_vector_clocks(&mut base, &incoming);

        assert_eq!(base.get(&peer(1)), Some(&3));
        assert_eq!(base.get(&peer(2)), Some(&5));
    }

    #[test]
    fn skew_window_rejects_far_timestamps() {
        let msg = Message::data(peer(1), peer(2), Value::Null, 1_000_000);
        assert!(msg.within_skew(1_000_000 + 60_000));
        assert!(!msg.within_skew(1_000_000 + 10 * 60_000));
    }
}
