//! Row types for the persistence store's tables (§3, §6).

use serde::{Deserialize, Serialize};
use yapyap_core::PeerId;

/// Status of an outbound queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Delivered,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Delivered => "delivered",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "delivered" => Some(QueueStatus::Delivered),
            "failed" => Some(QueueStatus::Failed),
            _ => None,
        }
    }
}

/// An outbound pending-message queue entry (§3 "Queue entry").
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub message_id: String,
    pub target: PeerId,
    pub serialized: Vec<u8>,
    pub status: QueueStatus,
    pub attempts: u32,
    pub next_retry_at_ms: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub deadline_at_ms: i64,
    pub last_error: Option<String>,
}

/// Outcome of `persistIncomingAtomically` (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    pub applied: bool,
    pub duplicate: bool,
    pub queue_row_id: Option<i64>,
}

/// Status of a single relay's handling of one replicated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaStatus {
    Assigned,
    Stored,
    Delivered,
    Failed,
}

impl ReplicaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaStatus::Assigned => "assigned",
            ReplicaStatus::Stored => "stored",
            ReplicaStatus::Delivered => "delivered",
            ReplicaStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "assigned" => Some(ReplicaStatus::Assigned),
            "stored" => Some(ReplicaStatus::Stored),
            "delivered" => Some(ReplicaStatus::Delivered),
            "failed" => Some(ReplicaStatus::Failed),
            _ => None,
        }
    }
}

/// Store-and-forward bookkeeping: which relay peers hold a copy of a
/// message bound for `original_target` (§3 "Replica record").
#[derive(Debug, Clone)]
pub struct ReplicaRecord {
    pub message_id: String,
    pub original_target: PeerId,
    pub source: PeerId,
    pub status: ReplicaStatus,
    pub deadline_at_ms: i64,
}

/// One relay's assignment for a replicated message.
#[derive(Debug, Clone)]
pub struct ReplicaAssignment {
    pub message_id: String,
    pub relay_peer: PeerId,
    pub status: ReplicaStatus,
    pub assigned_at_ms: i64,
    pub updated_at_ms: i64,
}

/// A known network address/availability record for a peer (§3 "Routing
/// cache").
#[derive(Debug, Clone)]
pub struct RoutingCacheEntry {
    pub peer: PeerId,
    pub addresses: Vec<String>,
    pub is_available: bool,
    pub last_seen_ms: i64,
    pub ttl_ms: i64,
}

impl RoutingCacheEntry {
    pub fn is_stale(&self, now_ms: i64) -> bool {
        self.last_seen_ms + self.ttl_ms < now_ms
    }
}

/// A contact, Last-Writer-Wins by `last_seen` (§3 "Contact").
#[derive(Debug, Clone)]
pub struct Contact {
    pub peer: PeerId,
    pub alias: Option<String>,
    pub last_seen_ms: i64,
    pub metadata: Vec<u8>,
    pub is_trusted: bool,
}

/// A processed-messages row, the durable half of the dedup table (§3
/// "Processed record").
#[derive(Debug, Clone)]
pub struct ProcessedRecord {
    pub message_id: String,
    pub sender: PeerId,
    pub sequence_number: Option<u64>,
    pub destination: Option<PeerId>,
    pub serialized: Vec<u8>,
    pub processed_at_ms: i64,
}

/// A pending message surfaced by delta sync, carried alongside the target
/// and ttl needed to requeue it on the receiving side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMessageSummary {
    pub message_id: String,
    pub target: PeerId,
    pub serialized: Vec<u8>,
    pub ttl_ms: i64,
}

/// This node's own long-lived keys (§6 `node_keys`): the Ed25519 signing
/// key and the X25519 static agreement key, generated once on first start.
#[derive(Debug, Clone)]
pub struct NodeKeys {
    pub signing_key: Vec<u8>,
    pub agreement_secret: Vec<u8>,
    pub created_at_ms: i64,
}

/// A persisted session record (§4.4): the durable form of one entry in the
/// session registry.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub session_id: String,
    pub remote_peer: PeerId,
    pub local_ephemeral_secret: Vec<u8>,
    pub encryption_key: Vec<u8>,
    pub decryption_key: Vec<u8>,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
    pub last_used_ms: i64,
    pub active: bool,
}
