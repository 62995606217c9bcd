//! DDL for the single embedded database file (§6).
//!
//! Tables: node_keys, routing_cache, pending_messages, replicated_messages,
//! message_replicas, processed_messages, peer_sequences,
//! peer_vector_clocks, contacts, peer_metadata, sessions, plus a contacts
//! full-text index kept in sync by triggers.

use rusqlite::Connection;

use crate::error::StorageResult;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS node_keys (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    signing_key BLOB NOT NULL,
    agreement_secret BLOB NOT NULL,
    created_at_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS routing_cache (
    peer_id TEXT PRIMARY KEY,
    addresses TEXT NOT NULL,
    is_available INTEGER NOT NULL,
    last_seen_ms INTEGER NOT NULL,
    ttl_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_routing_cache_last_seen ON routing_cache(last_seen_ms);

CREATE TABLE IF NOT EXISTS pending_messages (
    message_id TEXT PRIMARY KEY,
    target_peer_id TEXT NOT NULL,
    serialized BLOB NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    next_retry_at_ms INTEGER NOT NULL,
    created_at_ms INTEGER NOT NULL,
    updated_at_ms INTEGER NOT NULL,
    deadline_at_ms INTEGER NOT NULL,
    last_error TEXT
);
CREATE INDEX IF NOT EXISTS idx_pending_status_retry ON pending_messages(status, next_retry_at_ms);
CREATE INDEX IF NOT EXISTS idx_pending_target ON pending_messages(target_peer_id);
CREATE INDEX IF NOT EXISTS idx_pending_deadline ON pending_messages(deadline_at_ms);

CREATE TABLE IF NOT EXISTS replicated_messages (
    message_id TEXT PRIMARY KEY,
    original_target_peer_id TEXT NOT NULL,
    source_peer_id TEXT NOT NULL,
    status TEXT NOT NULL,
    deadline_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_replicated_status_deadline ON replicated_messages(status, deadline_at_ms);

CREATE TABLE IF NOT EXISTS message_replicas (
    message_id TEXT NOT NULL,
    relay_peer_id TEXT NOT NULL,
    status TEXT NOT NULL,
    assigned_at_ms INTEGER NOT NULL,
    updated_at_ms INTEGER NOT NULL,
    PRIMARY KEY (message_id, relay_peer_id)
);

CREATE TABLE IF NOT EXISTS processed_messages (
    message_id TEXT PRIMARY KEY,
    sender_peer_id TEXT NOT NULL,
    sequence_number INTEGER,
    destination_peer_id TEXT,
    serialized BLOB NOT NULL,
    processed_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_processed_at ON processed_messages(processed_at_ms);

CREATE TABLE IF NOT EXISTS peer_sequences (
    peer_id TEXT PRIMARY KEY,
    last_sequence INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS peer_vector_clocks (
    peer_id TEXT PRIMARY KEY,
    counter INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS contacts (
    peer_id TEXT PRIMARY KEY,
    alias TEXT,
    last_seen_ms INTEGER NOT NULL,
    metadata BLOB,
    is_trusted INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_contacts_last_seen ON contacts(last_seen_ms);

CREATE VIRTUAL TABLE IF NOT EXISTS contacts_fts USING fts5(peer_id, alias);

CREATE TRIGGER IF NOT EXISTS contacts_fts_insert AFTER INSERT ON contacts BEGIN
    INSERT INTO contacts_fts(rowid, peer_id, alias) VALUES (new.rowid, new.peer_id, new.alias);
END;
CREATE TRIGGER IF NOT EXISTS contacts_fts_update AFTER UPDATE ON contacts BEGIN
    UPDATE contacts_fts SET peer_id = new.peer_id, alias = new.alias WHERE rowid = new.rowid;
END;
CREATE TRIGGER IF NOT EXISTS contacts_fts_delete AFTER DELETE ON contacts BEGIN
    DELETE FROM contacts_fts WHERE rowid = old.rowid;
END;

CREATE TABLE IF NOT EXISTS peer_metadata (
    peer_id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    updated_at_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    remote_peer_id TEXT NOT NULL,
    local_ephemeral_secret BLOB NOT NULL,
    encryption_key BLOB NOT NULL,
    decryption_key BLOB NOT NULL,
    created_at_ms INTEGER NOT NULL,
    expires_at_ms INTEGER NOT NULL,
    last_used_ms INTEGER NOT NULL,
    active INTEGER NOT NULL
);
"#;

/// Open WAL mode and create every table/index/trigger if absent.
pub fn init_schema(conn: &Connection) -> StorageResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
