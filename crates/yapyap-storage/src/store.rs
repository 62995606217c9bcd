//! The persistence store contract (§4.2) and its SQLite-backed
//! implementation.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use yapyap_core::PeerId;

use crate::error::{StorageError, StorageResult};
use crate::schema::init_schema;
use crate::types::{
    Contact, NodeKeys, PendingMessageSummary, PersistOutcome, QueueEntry, QueueStatus,
    ReplicaAssignment, ReplicaRecord, ReplicaStatus, RoutingCacheEntry, SessionRow,
};

/// Parameters for `persistIncomingAtomically` (§4.2).
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub message_id: String,
    pub from: PeerId,
    pub sequence: Option<u64>,
    pub destination: Option<PeerId>,
    pub data: Vec<u8>,
    pub vector_clock: Option<std::collections::BTreeMap<PeerId, u64>>,
}

/// The durable side of the router's state: queues, processed-id table,
/// per-sender sequence/vector-clock tables, replica bookkeeping, and the
/// contacts/routing cache. A contract, not a schema (§4.2) — callers depend
/// on this trait, not on `SqliteStorage` directly, so the router can be
/// constructed against an in-memory double in tests.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn queue_outbound(
        &self,
        message_id: &str,
        serialized: &[u8],
        target: &PeerId,
        deadline_at_ms: i64,
        now_ms: i64,
    ) -> StorageResult<()>;

    async fn get_retryable(&self, now_ms: i64) -> StorageResult<Vec<QueueEntry>>;

    async fn get_pending_for_peer(
        &self,
        peer: &PeerId,
        limit: usize,
        now_ms: i64,
    ) -> StorageResult<Vec<QueueEntry>>;

    async fn mark_delivered(&self, message_id: &str, now_ms: i64) -> StorageResult<()>;

    async fn mark_failed(&self, message_id: &str, reason: &str, now_ms: i64) -> StorageResult<()>;

    async fn schedule_retry(
        &self,
        message_id: &str,
        next_retry_at_ms: i64,
        reason: &str,
        now_ms: i64,
    ) -> StorageResult<()>;

    async fn persist_incoming_atomically(
        &self,
        incoming: IncomingMessage,
        now_ms: i64,
    ) -> StorageResult<PersistOutcome>;

    async fn is_processed(&self, message_id: &str) -> StorageResult<bool>;

    async fn last_sequence(&self, peer: &PeerId) -> StorageResult<u64>;

    async fn vector_clock_for(&self, peer: &PeerId) -> StorageResult<u64>;

    async fn all_vector_clocks(&self) -> StorageResult<std::collections::BTreeMap<PeerId, u64>>;

    async fn update_vector_clock(&self, peer: &PeerId, counter: u64) -> StorageResult<()>;

    async fn upsert_replicated(&self, record: ReplicaRecord) -> StorageResult<()>;

    async fn assign_replica(
        &self,
        message_id: &str,
        relay_peer: &PeerId,
        now_ms: i64,
    ) -> StorageResult<()>;

    async fn mark_replica_stored(
        &self,
        message_id: &str,
        relay_peer: &PeerId,
        now_ms: i64,
    ) -> StorageResult<()>;

    async fn mark_replica_failed(
        &self,
        message_id: &str,
        relay_peer: &PeerId,
        now_ms: i64,
    ) -> StorageResult<()>;

    async fn get_message_replicas(&self, message_id: &str)
        -> StorageResult<Vec<ReplicaAssignment>>;

    async fn upsert_contact(&self, contact: Contact) -> StorageResult<()>;

    async fn get_contact(&self, peer: &PeerId) -> StorageResult<Option<Contact>>;

    async fn list_contacts(&self) -> StorageResult<Vec<Contact>>;

    async fn upsert_routing_cache(&self, entry: RoutingCacheEntry) -> StorageResult<()>;

    async fn list_routing_cache(&self) -> StorageResult<Vec<RoutingCacheEntry>>;

    async fn processed_ids_since(&self, since_ms: i64, limit: usize) -> StorageResult<Vec<String>>;

    async fn pending_since(
        &self,
        since_ms: i64,
        limit: usize,
    ) -> StorageResult<Vec<PendingMessageSummary>>;

    async fn cleanup(&self, now_ms: i64, processed_retention_ms: i64) -> StorageResult<()>;

    async fn put_session(&self, session: SessionRow) -> StorageResult<()>;

    async fn get_session_by_id(&self, session_id: &str) -> StorageResult<Option<SessionRow>>;

    async fn active_session_for(&self, peer: &PeerId) -> StorageResult<Option<SessionRow>>;

    async fn invalidate_session(&self, session_id: &str) -> StorageResult<()>;

    async fn touch_session(&self, session_id: &str, last_used_ms: i64) -> StorageResult<()>;

    async fn list_sessions(&self) -> StorageResult<Vec<SessionRow>>;

    async fn delete_expired_sessions(&self, now_ms: i64) -> StorageResult<()>;

    /// Arbitrary per-peer metadata blob (§3, §6 `peer_metadata`) — used by
    /// the router to cache a peer's long-lived static agreement key.
    async fn put_peer_metadata(&self, peer: &PeerId, data: &[u8], now_ms: i64) -> StorageResult<()>;

    async fn get_peer_metadata(&self, peer: &PeerId) -> StorageResult<Option<Vec<u8>>>;

    /// Persist this node's identity keys. Only ever called once, the first
    /// time a node starts with no existing `node_keys` row.
    async fn put_node_keys(&self, keys: NodeKeys) -> StorageResult<()>;

    async fn get_node_keys(&self) -> StorageResult<Option<NodeKeys>>;
}

/// `rusqlite`-backed implementation. Single-writer discipline is enforced
/// by routing every call through the same `tokio::sync::Mutex`; readers and
/// writers alike serialize on it, which is simple and, given the modest
/// write volume a single node generates, cheap enough (WAL mode still lets
/// concurrent external readers see committed data).
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_queue_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueEntry> {
        let status_str: String = row.get("status")?;
        let target_str: String = row.get("target_peer_id")?;
        Ok(QueueEntry {
            message_id: row.get("message_id")?,
            target: PeerId::parse(&target_str)
                .map_err(|e| rusqlite::Error::InvalidColumnName(e.to_string()))?,
            serialized: row.get("serialized")?,
            status: QueueStatus::parse(&status_str).unwrap_or(QueueStatus::Pending),
            attempts: row.get::<_, i64>("attempts")? as u32,
            next_retry_at_ms: row.get("next_retry_at_ms")?,
            created_at_ms: row.get("created_at_ms")?,
            updated_at_ms: row.get("updated_at_ms")?,
            deadline_at_ms: row.get("deadline_at_ms")?,
            last_error: row.get("last_error")?,
        })
    }

    fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
        let peer_str: String = row.get("remote_peer_id")?;
        Ok(SessionRow {
            session_id: row.get("session_id")?,
            remote_peer: PeerId::parse(&peer_str)
                .map_err(|e| rusqlite::Error::InvalidColumnName(e.to_string()))?,
            local_ephemeral_secret: row.get("local_ephemeral_secret")?,
            encryption_key: row.get("encryption_key")?,
            decryption_key: row.get("decryption_key")?,
            created_at_ms: row.get("created_at_ms")?,
            expires_at_ms: row.get("expires_at_ms")?,
            last_used_ms: row.get("last_used_ms")?,
            active: row.get::<_, i64>("active")? != 0,
        })
    }
}

#[async_trait]
impl PersistenceStore for SqliteStorage {
    #[instrument(skip(self, serialized))]
    async fn queue_outbound(
        &self,
        message_id: &str,
        serialized: &[u8],
        target: &PeerId,
        deadline_at_ms: i64,
        now_ms: i64,
    ) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO pending_messages
                (message_id, target_peer_id, serialized, status, attempts,
                 next_retry_at_ms, created_at_ms, updated_at_ms, deadline_at_ms, last_error)
             VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?4, ?4, ?5, NULL)
             ON CONFLICT(message_id) DO UPDATE SET
                target_peer_id = excluded.target_peer_id,
                serialized = excluded.serialized,
                status = 'pending',
                attempts = 0,
                next_retry_at_ms = excluded.next_retry_at_ms,
                updated_at_ms = excluded.updated_at_ms,
                deadline_at_ms = excluded.deadline_at_ms,
                last_error = NULL",
            params![message_id, target.as_str(), serialized, now_ms, deadline_at_ms],
        )?;
        Ok(())
    }

    async fn get_retryable(&self, now_ms: i64) -> StorageResult<Vec<QueueEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM pending_messages
             WHERE status = 'pending' AND next_retry_at_ms <= ?1 AND deadline_at_ms > ?1
             ORDER BY next_retry_at_ms ASC",
        )?;
        let rows = stmt
            .query_map(params![now_ms], Self::row_to_queue_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn get_pending_for_peer(
        &self,
        peer: &PeerId,
        limit: usize,
        now_ms: i64,
    ) -> StorageResult<Vec<QueueEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM pending_messages
             WHERE status = 'pending' AND target_peer_id = ?1
               AND next_retry_at_ms <= ?2 AND deadline_at_ms > ?2
             ORDER BY next_retry_at_ms ASC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(
                params![peer.as_str(), now_ms, limit as i64],
                Self::row_to_queue_entry,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn mark_delivered(&self, message_id: &str, now_ms: i64) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE pending_messages SET status = 'delivered', updated_at_ms = ?2
             WHERE message_id = ?1",
            params![message_id, now_ms],
        )?;
        Ok(())
    }

    async fn mark_failed(&self, message_id: &str, reason: &str, now_ms: i64) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE pending_messages
             SET status = 'failed', last_error = ?2, updated_at_ms = ?3
             WHERE message_id = ?1",
            params![message_id, reason, now_ms],
        )?;
        Ok(())
    }

    async fn schedule_retry(
        &self,
        message_id: &str,
        next_retry_at_ms: i64,
        reason: &str,
        now_ms: i64,
    ) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE pending_messages
             SET status = 'pending', attempts = attempts + 1,
                 next_retry_at_ms = ?2, last_error = ?3, updated_at_ms = ?4
             WHERE message_id = ?1",
            params![message_id, next_retry_at_ms, reason, now_ms],
        )?;
        Ok(())
    }

    #[instrument(skip(self, incoming))]
    async fn persist_incoming_atomically(
        &self,
        incoming: IncomingMessage,
        now_ms: i64,
    ) -> StorageResult<PersistOutcome> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO processed_messages
                (message_id, sender_peer_id, sequence_number, destination_peer_id, serialized, processed_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(message_id) DO NOTHING",
            params![
                incoming.message_id,
                incoming.from.as_str(),
                incoming.sequence.map(|s| s as i64),
                incoming.destination.as_ref().map(PeerId::as_str),
                incoming.data,
                now_ms,
            ],
        )?;

        if inserted == 0 {
            tx.commit()?;
            debug!(message_id = %incoming.message_id, "duplicate message");
            return Ok(PersistOutcome {
                applied: false,
                duplicate: true,
                queue_row_id: None,
            });
        }

        if let Some(seq) = incoming.sequence {
            tx.execute(
                "INSERT INTO peer_sequences (peer_id, last_sequence) VALUES (?1, ?2)
                 ON CONFLICT(peer_id) DO UPDATE SET last_sequence = MAX(last_sequence, excluded.last_sequence)",
                params![incoming.from.as_str(), seq as i64],
            )?;
        }

        if let Some(clock) = &incoming.vector_clock {
            for (peer, counter) in clock {
                tx.execute(
                    "INSERT INTO peer_vector_clocks (peer_id, counter) VALUES (?1, ?2)
                     ON CONFLICT(peer_id) DO UPDATE SET counter = MAX(counter, excluded.counter)",
                    params![peer.as_str(), *counter as i64],
                )?;
            }
        }

        let queue_row_id: Option<i64> = tx
            .query_row(
                "SELECT rowid FROM pending_messages WHERE message_id = ?1",
                params![incoming.message_id],
                |row| row.get(0),
            )
            .optional()?;

        tx.commit()?;

        Ok(PersistOutcome {
            applied: true,
            duplicate: false,
            queue_row_id,
        })
    }

    async fn is_processed(&self, message_id: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().await;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM processed_messages WHERE message_id = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    async fn last_sequence(&self, peer: &PeerId) -> StorageResult<u64> {
        let conn = self.conn.lock().await;
        let value: Option<i64> = conn
            .query_row(
                "SELECT last_sequence FROM peer_sequences WHERE peer_id = ?1",
                params![peer.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0) as u64)
    }

    async fn vector_clock_for(&self, peer: &PeerId) -> StorageResult<u64> {
        let conn = self.conn.lock().await;
        let value: Option<i64> = conn
            .query_row(
                "SELECT counter FROM peer_vector_clocks WHERE peer_id = ?1",
                params![peer.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0) as u64)
    }

    async fn all_vector_clocks(&self) -> StorageResult<std::collections::BTreeMap<PeerId, u64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT peer_id, counter FROM peer_vector_clocks")?;
        let rows = stmt.query_map([], |row| {
            let peer_str: String = row.get(0)?;
            let counter: i64 = row.get(1)?;
            Ok((peer_str, counter))
        })?;
        let mut out = std::collections::BTreeMap::new();
        for row in rows {
            let (peer_str, counter) = row?;
            if let Ok(peer) = PeerId::parse(&peer_str) {
                out.insert(peer, counter as u64);
            }
        }
        Ok(out)
    }

    async fn update_vector_clock(&self, peer: &PeerId, counter: u64) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO peer_vector_clocks (peer_id, counter) VALUES (?1, ?2)
             ON CONFLICT(peer_id) DO UPDATE SET counter = MAX(counter, excluded.counter)",
            params![peer.as_str(), counter as i64],
        )?;
        Ok(())
    }

    async fn upsert_replicated(&self, record: ReplicaRecord) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO replicated_messages
                (message_id, original_target_peer_id, source_peer_id, status, deadline_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(message_id) DO UPDATE SET
                status = excluded.status,
                deadline_at_ms = excluded.deadline_at_ms",
            params![
                record.message_id,
                record.original_target.as_str(),
                record.source.as_str(),
                record.status.as_str(),
                record.deadline_at_ms,
            ],
        )?;
        Ok(())
    }

    async fn assign_replica(
        &self,
        message_id: &str,
        relay_peer: &PeerId,
        now_ms: i64,
    ) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO message_replicas
                (message_id, relay_peer_id, status, assigned_at_ms, updated_at_ms)
             VALUES (?1, ?2, 'assigned', ?3, ?3)
             ON CONFLICT(message_id, relay_peer_id) DO UPDATE SET
                status = 'assigned', updated_at_ms = ?3",
            params![message_id, relay_peer.as_str(), now_ms],
        )?;
        Ok(())
    }

    async fn mark_replica_stored(
        &self,
        message_id: &str,
        relay_peer: &PeerId,
        now_ms: i64,
    ) -> StorageResult<()> {
        self.set_replica_status(message_id, relay_peer, ReplicaStatus::Stored, now_ms)
            .await
    }

    async fn mark_replica_failed(
        &self,
        message_id: &str,
        relay_peer: &PeerId,
        now_ms: i64,
    ) -> StorageResult<()> {
        self.set_replica_status(message_id, relay_peer, ReplicaStatus::Failed, now_ms)
            .await
    }

    async fn get_message_replicas(
        &self,
        message_id: &str,
    ) -> StorageResult<Vec<ReplicaAssignment>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT message_id, relay_peer_id, status, assigned_at_ms, updated_at_ms
             FROM message_replicas WHERE message_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![message_id], |row| {
                let status_str: String = row.get(2)?;
                let relay_str: String = row.get(1)?;
                Ok((
                    row.get::<_, String>(0)?,
                    relay_str,
                    status_str,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (message_id, relay_str, status_str, assigned_at_ms, updated_at_ms) in rows {
            let relay_peer = PeerId::parse(&relay_str)
                .map_err(|e| StorageError::Database(e.to_string()))?;
            out.push(ReplicaAssignment {
                message_id,
                relay_peer,
                status: ReplicaStatus::parse(&status_str).unwrap_or(ReplicaStatus::Assigned),
                assigned_at_ms,
                updated_at_ms,
            });
        }
        Ok(out)
    }

    async fn upsert_contact(&self, contact: Contact) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO contacts (peer_id, alias, last_seen_ms, metadata, is_trusted)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(peer_id) DO UPDATE SET
                alias = excluded.alias,
                last_seen_ms = excluded.last_seen_ms,
                metadata = excluded.metadata,
                is_trusted = excluded.is_trusted
             WHERE excluded.last_seen_ms >= contacts.last_seen_ms",
            params![
                contact.peer.as_str(),
                contact.alias,
                contact.last_seen_ms,
                contact.metadata,
                contact.is_trusted as i64,
            ],
        )?;
        Ok(())
    }

    async fn get_contact(&self, peer: &PeerId) -> StorageResult<Option<Contact>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT peer_id, alias, last_seen_ms, metadata, is_trusted FROM contacts WHERE peer_id = ?1",
            params![peer.as_str()],
            |row| {
                Ok(Contact {
                    peer: peer.clone(),
                    alias: row.get(1)?,
                    last_seen_ms: row.get(2)?,
                    metadata: row.get::<_, Option<Vec<u8>>>(3)?.unwrap_or_default(),
                    is_trusted: row.get::<_, i64>(4)? != 0,
                })
            },
        )
        .optional()
        .map_err(StorageError::from)
    }

    async fn list_contacts(&self) -> StorageResult<Vec<Contact>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT peer_id, alias, last_seen_ms, metadata, is_trusted FROM contacts ORDER BY last_seen_ms DESC")?;
        let rows = stmt
            .query_map([], |row| {
                let peer_str: String = row.get(0)?;
                Ok((
                    peer_str,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<Vec<u8>>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (peer_str, alias, last_seen_ms, metadata, is_trusted) in rows {
            let peer = PeerId::parse(&peer_str).map_err(|e| StorageError::Database(e.to_string()))?;
            out.push(Contact {
                peer,
                alias,
                last_seen_ms,
                metadata: metadata.unwrap_or_default(),
                is_trusted: is_trusted != 0,
            });
        }
        Ok(out)
    }

    async fn upsert_routing_cache(&self, entry: RoutingCacheEntry) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        let addresses = entry.addresses.join(",");
        conn.execute(
            "INSERT INTO routing_cache (peer_id, addresses, is_available, last_seen_ms, ttl_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(peer_id) DO UPDATE SET
                addresses = excluded.addresses,
                is_available = excluded.is_available,
                last_seen_ms = excluded.last_seen_ms,
                ttl_ms = excluded.ttl_ms
             WHERE excluded.last_seen_ms >= routing_cache.last_seen_ms",
            params![
                entry.peer.as_str(),
                addresses,
                entry.is_available as i64,
                entry.last_seen_ms,
                entry.ttl_ms,
            ],
        )?;
        Ok(())
    }

    async fn list_routing_cache(&self) -> StorageResult<Vec<RoutingCacheEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT peer_id, addresses, is_available, last_seen_ms, ttl_ms FROM routing_cache")?;
        let rows = stmt
            .query_map([], |row| {
                let peer_str: String = row.get(0)?;
                let addresses_str: String = row.get(1)?;
                Ok((
                    peer_str,
                    addresses_str,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (peer_str, addresses_str, is_available, last_seen_ms, ttl_ms) in rows {
            let peer = PeerId::parse(&peer_str).map_err(|e| StorageError::Database(e.to_string()))?;
            out.push(RoutingCacheEntry {
                peer,
                addresses: if addresses_str.is_empty() {
                    Vec::new()
                } else {
                    addresses_str.split(',').map(str::to_string).collect()
                },
                is_available: is_available != 0,
                last_seen_ms,
                ttl_ms,
            });
        }
        Ok(out)
    }

    async fn processed_ids_since(&self, since_ms: i64, limit: usize) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT message_id FROM processed_messages
             WHERE processed_at_ms >= ?1 ORDER BY processed_at_ms ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![since_ms, limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn pending_since(
        &self,
        since_ms: i64,
        limit: usize,
    ) -> StorageResult<Vec<PendingMessageSummary>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT message_id, target_peer_id, serialized, deadline_at_ms - created_at_ms
             FROM pending_messages
             WHERE created_at_ms >= ?1 ORDER BY created_at_ms ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![since_ms, limit as i64], |row| {
                let target_str: String = row.get(1)?;
                Ok((
                    row.get::<_, String>(0)?,
                    target_str,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (message_id, target_str, serialized, ttl_ms) in rows {
            let target = PeerId::parse(&target_str).map_err(|e| StorageError::Database(e.to_string()))?;
            out.push(PendingMessageSummary {
                message_id,
                target,
                serialized,
                ttl_ms,
            });
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    async fn cleanup(&self, now_ms: i64, processed_retention_ms: i64) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        let processed_horizon = now_ms - processed_retention_ms;

        let reaped = conn.execute(
            "DELETE FROM pending_messages
             WHERE (status IN ('delivered', 'failed') OR deadline_at_ms <= ?1)",
            params![now_ms],
        )?;
        conn.execute(
            "DELETE FROM replicated_messages WHERE status = 'delivered' OR deadline_at_ms <= ?1",
            params![now_ms],
        )?;
        conn.execute(
            "DELETE FROM message_replicas WHERE message_id NOT IN (SELECT message_id FROM replicated_messages)",
            [],
        )?;
        conn.execute(
            "DELETE FROM processed_messages WHERE processed_at_ms < ?1",
            params![processed_horizon],
        )?;
        conn.execute(
            "DELETE FROM sessions WHERE expires_at_ms <= ?1",
            params![now_ms],
        )?;
        conn.execute(
            "DELETE FROM routing_cache WHERE last_seen_ms + ttl_ms < ?1",
            params![now_ms],
        )?;
        debug!(reaped, now_ms, "cleanup pass complete");
        Ok(())
    }

    async fn put_session(&self, session: SessionRow) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sessions
                (session_id, remote_peer_id, local_ephemeral_secret, encryption_key,
                 decryption_key, created_at_ms, expires_at_ms, last_used_ms, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(session_id) DO UPDATE SET
                encryption_key = excluded.encryption_key,
                decryption_key = excluded.decryption_key,
                expires_at_ms = excluded.expires_at_ms,
                last_used_ms = excluded.last_used_ms,
                active = excluded.active",
            params![
                session.session_id,
                session.remote_peer.as_str(),
                session.local_ephemeral_secret,
                session.encryption_key,
                session.decryption_key,
                session.created_at_ms,
                session.expires_at_ms,
                session.last_used_ms,
                session.active as i64,
            ],
        )?;
        Ok(())
    }

    async fn get_session_by_id(&self, session_id: &str) -> StorageResult<Option<SessionRow>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT session_id, remote_peer_id, local_ephemeral_secret, encryption_key,
                    decryption_key, created_at_ms, expires_at_ms, last_used_ms, active
             FROM sessions WHERE session_id = ?1",
            params![session_id],
            Self::row_to_session,
        )
        .optional()
        .map_err(StorageError::from)
    }

    async fn active_session_for(&self, peer: &PeerId) -> StorageResult<Option<SessionRow>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT session_id, remote_peer_id, local_ephemeral_secret, encryption_key,
                    decryption_key, created_at_ms, expires_at_ms, last_used_ms, active
             FROM sessions WHERE remote_peer_id = ?1 AND active = 1
             ORDER BY last_used_ms DESC LIMIT 1",
            params![peer.as_str()],
            Self::row_to_session,
        )
        .optional()
        .map_err(StorageError::from)
    }

    async fn invalidate_session(&self, session_id: &str) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET active = 0 WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(())
    }

    async fn touch_session(&self, session_id: &str, last_used_ms: i64) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET last_used_ms = ?2 WHERE session_id = ?1",
            params![session_id, last_used_ms],
        )?;
        Ok(())
    }

    async fn list_sessions(&self) -> StorageResult<Vec<SessionRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT session_id, remote_peer_id, local_ephemeral_secret, encryption_key,
                    decryption_key, created_at_ms, expires_at_ms, last_used_ms, active
             FROM sessions",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_session)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn delete_expired_sessions(&self, now_ms: i64) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM sessions WHERE expires_at_ms <= ?1",
            params![now_ms],
        )?;
        Ok(())
    }

    async fn put_peer_metadata(&self, peer: &PeerId, data: &[u8], now_ms: i64) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO peer_metadata (peer_id, data, updated_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(peer_id) DO UPDATE SET data = excluded.data, updated_at_ms = excluded.updated_at_ms",
            params![peer.as_str(), data, now_ms],
        )?;
        Ok(())
    }

    async fn get_peer_metadata(&self, peer: &PeerId) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT data FROM peer_metadata WHERE peer_id = ?1",
            params![peer.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(StorageError::from)
    }

    async fn put_node_keys(&self, keys: NodeKeys) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO node_keys (id, signing_key, agreement_secret, created_at_ms)
             VALUES (0, ?1, ?2, ?3)
             ON CONFLICT(id) DO NOTHING",
            params![keys.signing_key, keys.agreement_secret, keys.created_at_ms],
        )?;
        Ok(())
    }

    async fn get_node_keys(&self) -> StorageResult<Option<NodeKeys>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT signing_key, agreement_secret, created_at_ms FROM node_keys WHERE id = 0",
            [],
            |row| {
                Ok(NodeKeys {
                    signing_key: row.get(0)?,
                    agreement_secret: row.get(1)?,
                    created_at_ms: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(StorageError::from)
    }
}

impl SqliteStorage {
    async fn set_replica_status(
        &self,
        message_id: &str,
        relay_peer: &PeerId,
        status: ReplicaStatus,
        now_ms: i64,
    ) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE message_replicas SET status = ?3, updated_at_ms = ?4
             WHERE message_id = ?1 AND relay_peer_id = ?2",
            params![message_id, relay_peer.as_str(), status.as_str(), now_ms],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(byte: u8) -> PeerId {
        PeerId::from_bytes(&[byte; 32])
    }

    #[tokio::test]
    async fn queue_and_retrieve_retryable() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store
            .queue_outbound("m1", b"payload", &peer(1), 10_000, 1_000)
            .await
            .unwrap();

        let retryable = store.get_retryable(1_000).await.unwrap();
        assert_eq!(retryable.len(), 1);
        assert_eq!(retryable[0].message_id, "m1");
    }

    #[tokio::test]
    async fn persist_incoming_is_idempotent() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let incoming = IncomingMessage {
            message_id: "m1".into(),
            from: peer(1),
            sequence: Some(1),
            destination: Some(peer(2)),
            data: b"hi".to_vec(),
            vector_clock: None,
        };

        let first = store
            .persist_incoming_atomically(incoming.clone(), 1_000)
            .await
            .unwrap();
        assert!(first.applied);
        assert!(!first.duplicate);

        let second = store.persist_incoming_atomically(incoming, 2_000).await.unwrap();
        assert!(!second.applied);
        assert!(second.duplicate);

        assert_eq!(store.last_sequence(&peer(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn vector_clock_merges_monotone_max() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store.update_vector_clock(&peer(1), 5).await.unwrap();
        store.update_vector_clock(&peer(1), 2).await.unwrap();
        assert_eq!(store.vector_clock_for(&peer(1)).await.unwrap(), 5);
        store.update_vector_clock(&peer(1), 9).await.unwrap();
        assert_eq!(store.vector_clock_for(&peer(1)).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn cleanup_reaps_past_deadline_entries() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store
            .queue_outbound("expired", b"x", &peer(3), 500, 0)
            .await
            .unwrap();
        store.cleanup(1_000, 7 * 24 * 60 * 60 * 1000).await.unwrap();
        let retryable = store.get_retryable(1_000).await.unwrap();
        assert!(retryable.is_empty());
    }

    #[tokio::test]
    async fn contacts_are_last_writer_wins() {
        let store = SqliteStorage::open_in_memory().unwrap();
        store
            .upsert_contact(Contact {
                peer: peer(4),
                alias: Some("old".into()),
                last_seen_ms: 100,
                metadata: vec![],
                is_trusted: false,
            })
            .await
            .unwrap();
        store
            .upsert_contact(Contact {
                peer: peer(4),
                alias: Some("stale-write".into()),
                last_seen_ms: 50,
                metadata: vec![],
                is_trusted: true,
            })
            .await
            .unwrap();

        let contact = store.get_contact(&peer(4)).await.unwrap().unwrap();
        assert_eq!(contact.alias.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn sessions_round_trip_and_invalidate() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let session = SessionRow {
            session_id: "s1".into(),
            remote_peer: peer(5),
            local_ephemeral_secret: vec![1, 2, 3],
            encryption_key: vec![4; 32],
            decryption_key: vec![5; 32],
            created_at_ms: 0,
            expires_at_ms: 3_600_000,
            last_used_ms: 0,
            active: true,
        };
        store.put_session(session).await.unwrap();

        let active = store.active_session_for(&peer(5)).await.unwrap();
        assert!(active.is_some());

        store.invalidate_session("s1").await.unwrap();
        assert!(store.active_session_for(&peer(5)).await.unwrap().is_none());
        assert!(store.get_session_by_id("s1").await.unwrap().is_some());
    }
}
