//! The session registry (§4.4): a cache of derived per-peer encryption
//! material, backed durably by the `sessions` table.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

use yapyap_core::PeerId;
use yapyap_crypto::agreement::StaticAgreementKey;
use yapyap_crypto::kdf::derive_session_keys;
use yapyap_storage::{PersistenceStore, SessionRow};

use crate::error::{SessionError, SessionResult};

/// Sessions outlive an hour of inactivity before they must be renegotiated.
pub const DEFAULT_SESSION_TTL_MS: i64 = 60 * 60 * 1000;

/// One cached session: the derived keys for a remote peer, plus enough
/// bookkeeping to decide whether it is still usable.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub remote_peer: PeerId,
    pub local_ephemeral_secret: Vec<u8>,
    pub encryption_key: [u8; 32],
    pub decryption_key: [u8; 32],
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
    pub last_used_ms: i64,
    pub active: bool,
}

impl Session {
    pub fn is_live(&self, now_ms: i64) -> bool {
        self.active && self.expires_at_ms > now_ms
    }

    fn to_row(&self) -> SessionRow {
        SessionRow {
            session_id: self.session_id.clone(),
            remote_peer: self.remote_peer.clone(),
            local_ephemeral_secret: self.local_ephemeral_secret.clone(),
            encryption_key: self.encryption_key.to_vec(),
            decryption_key: self.decryption_key.to_vec(),
            created_at_ms: self.created_at_ms,
            expires_at_ms: self.expires_at_ms,
            last_used_ms: self.last_used_ms,
            active: self.active,
        }
    }

    fn from_row(row: SessionRow) -> SessionResult<Self> {
        let encryption_key = to_key(&row.encryption_key)?;
        let decryption_key = to_key(&row.decryption_key)?;
        Ok(Self {
            session_id: row.session_id,
            remote_peer: row.remote_peer,
            local_ephemeral_secret: row.local_ephemeral_secret,
            encryption_key,
            decryption_key,
            created_at_ms: row.created_at_ms,
            expires_at_ms: row.expires_at_ms,
            last_used_ms: row.last_used_ms,
            active: row.active,
        })
    }
}

fn to_key(bytes: &[u8]) -> SessionResult<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| SessionError::NoSession("malformed session key".into()))
}

/// Caches derived session keys in memory, hydrating from and persisting to
/// a [`PersistenceStore`]. The in-memory map is never authoritative: a
/// restart rehydrates it wholesale and drops anything already expired.
pub struct SessionRegistry<S: PersistenceStore> {
    store: Arc<S>,
    sessions: DashMap<String, Session>,
    by_peer: DashMap<PeerId, String>,
}

impl<S: PersistenceStore> SessionRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            sessions: DashMap::new(),
            by_peer: DashMap::new(),
        }
    }

    /// Load all non-expired sessions from the store into memory.
    #[instrument(skip(self))]
    pub async fn hydrate(&self, now_ms: i64) -> SessionResult<()> {
        self.store.delete_expired_sessions(now_ms).await?;
        for row in self.store.list_sessions().await? {
            let session = Session::from_row(row)?;
            if session.is_live(now_ms) {
                self.by_peer
                    .insert(session.remote_peer.clone(), session.session_id.clone());
                self.sessions.insert(session.session_id.clone(), session);
            }
        }
        debug!(count = self.sessions.len(), "hydrated sessions");
        Ok(())
    }

    /// Derive and store a brand-new session for `remote_peer`, using our
    /// fresh ephemeral keypair and their long-lived static public key.
    #[instrument(skip(self, remote_static_public))]
    pub async fn create(
        &self,
        remote_peer: &PeerId,
        remote_static_public: &[u8; 32],
        now_ms: i64,
    ) -> SessionResult<Session> {
        let local_key = StaticAgreementKey::generate();
        let shared_secret = local_key.diffie_hellman(remote_static_public);
        let keys = derive_session_keys(shared_secret.as_bytes())?;

        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            remote_peer: remote_peer.clone(),
            local_ephemeral_secret: local_key.to_bytes().to_vec(),
            encryption_key: keys.encryption_key,
            decryption_key: keys.decryption_key,
            created_at_ms: now_ms,
            expires_at_ms: now_ms + DEFAULT_SESSION_TTL_MS,
            last_used_ms: now_ms,
            active: true,
        };

        self.store.put_session(session.to_row()).await?;
        self.by_peer
            .insert(remote_peer.clone(), session.session_id.clone());
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    /// Return the active session for `remote_peer`, creating one if absent
    /// or expired.
    pub async fn get_or_create(
        &self,
        remote_peer: &PeerId,
        remote_static_public: &[u8; 32],
        now_ms: i64,
    ) -> SessionResult<Session> {
        if let Some(session) = self.active_for(remote_peer, now_ms).await? {
            return Ok(session);
        }
        self.create(remote_peer, remote_static_public, now_ms).await
    }

    pub async fn get_by_id(&self, session_id: &str) -> SessionResult<Option<Session>> {
        if let Some(session) = self.sessions.get(session_id) {
            return Ok(Some(session.clone()));
        }
        match self.store.get_session_by_id(session_id).await? {
            Some(row) => Ok(Some(Session::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// The live session for a peer, if any, refreshing `last_used_ms`.
    pub async fn active_for(
        &self,
        remote_peer: &PeerId,
        now_ms: i64,
    ) -> SessionResult<Option<Session>> {
        if let Some(session_id) = self.by_peer.get(remote_peer).map(|e| e.clone()) {
            if let Some(mut session) = self.sessions.get_mut(&session_id) {
                if session.is_live(now_ms) {
                    session.last_used_ms = now_ms;
                    self.store.touch_session(&session_id, now_ms).await?;
                    return Ok(Some(session.clone()));
                }
            }
        }

        match self.store.active_session_for(remote_peer).await? {
            Some(row) => {
                let session = Session::from_row(row)?;
                if session.is_live(now_ms) {
                    self.by_peer
                        .insert(remote_peer.clone(), session.session_id.clone());
                    self.sessions
                        .insert(session.session_id.clone(), session.clone());
                    Ok(Some(session))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    pub async fn invalidate(&self, session_id: &str) -> SessionResult<()> {
        self.store.invalidate_session(session_id).await?;
        if let Some((_, session)) = self.sessions.remove(session_id) {
            self.by_peer.remove(&session.remote_peer);
        }
        Ok(())
    }

    /// Drop and persist-delete every session whose expiry has passed.
    pub async fn cleanup_expired(&self) -> SessionResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        self.store.delete_expired_sessions(now_ms).await?;
        self.sessions.retain(|_, session| session.is_live(now_ms));
        self.by_peer
            .retain(|_, session_id| self.sessions.contains_key(session_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yapyap_crypto::agreement::StaticAgreementKey;
    use yapyap_storage::SqliteStorage;

    fn peer(byte: u8) -> PeerId {
        PeerId::from_bytes(&[byte; 32])
    }

    #[tokio::test]
    async fn get_or_create_reuses_live_session() {
        let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let registry = SessionRegistry::new(store);
        let remote_static = StaticAgreementKey::generate();
        let remote = peer(7);

        let first = registry
            .get_or_create(&remote, &remote_static.public_key(), 1_000)
            .await
            .unwrap();
        let second = registry
            .get_or_create(&remote, &remote_static.public_key(), 2_000)
            .await
            .unwrap();

        assert_eq!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_session() {
        let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let registry = SessionRegistry::new(store);
        let remote_static = StaticAgreementKey::generate();
        let remote = peer(8);

        let first = registry
            .get_or_create(&remote, &remote_static.public_key(), 1_000)
            .await
            .unwrap();
        registry.invalidate(&first.session_id).await.unwrap();

        let second = registry
            .get_or_create(&remote, &remote_static.public_key(), 2_000)
            .await
            .unwrap();
        assert_ne!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn hydrate_drops_expired_sessions() {
        let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let remote_static = StaticAgreementKey::generate();
        let remote = peer(9);

        {
            let registry = SessionRegistry::new(store.clone());
            registry
                .get_or_create(&remote, &remote_static.public_key(), 0)
                .await
                .unwrap();
        }

        let reloaded = SessionRegistry::new(store);
        reloaded.hydrate(DEFAULT_SESSION_TTL_MS + 1).await.unwrap();
        assert!(reloaded
            .active_for(&remote, DEFAULT_SESSION_TTL_MS + 1)
            .await
            .unwrap()
            .is_none());
    }
}
