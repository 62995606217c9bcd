//! Identity persistence for the node composition root.
//!
//! Unlike the teacher's flat-file keystore, the node's two long-lived keys
//! (Ed25519 signing, X25519 agreement) are persisted through the same
//! `PersistenceStore` the router already depends on, in the `node_keys`
//! table (§6) — there is no second on-disk format to keep in sync with the
//! database.

use std::sync::Arc;

use tracing::info;

use yapyap_crypto::agreement::StaticAgreementKey;
use yapyap_crypto::identity::IdentityKeypair;
use yapyap_storage::{NodeKeys, PersistenceStore};

use crate::error::{NodeError, NodeResult};

/// Loads or generates this node's identity and agreement keys.
pub struct Keystore<S: PersistenceStore> {
    store: Arc<S>,
}

impl<S: PersistenceStore> Keystore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Load the existing identity from the store, or generate and persist a
    /// fresh one on first start.
    pub async fn load_or_generate(
        &self,
        now_ms: i64,
    ) -> NodeResult<(IdentityKeypair, StaticAgreementKey)> {
        match self.store.get_node_keys().await? {
            Some(keys) => {
                let identity = Self::decode_identity(&keys.signing_key)?;
                let agreement = Self::decode_agreement(&keys.agreement_secret)?;
                info!(peer = %identity.peer_id(), "loaded node identity from keystore");
                Ok((identity, agreement))
            }
            None => {
                info!("no existing node identity found, generating a new one");
                let identity = IdentityKeypair::generate();
                let agreement = StaticAgreementKey::generate();
                self.store
                    .put_node_keys(NodeKeys {
                        signing_key: identity.to_bytes().to_vec(),
                        agreement_secret: agreement.to_bytes().to_vec(),
                        created_at_ms: now_ms,
                    })
                    .await?;
                info!(peer = %identity.peer_id(), "generated and saved node identity");
                Ok((identity, agreement))
            }
        }
    }

    fn decode_identity(bytes: &[u8]) -> NodeResult<IdentityKeypair> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| NodeError::Keystore("stored signing key is not 32 bytes".to_string()))?;
        Ok(IdentityKeypair::from_bytes(&array))
    }

    fn decode_agreement(bytes: &[u8]) -> NodeResult<StaticAgreementKey> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| NodeError::Keystore("stored agreement key is not 32 bytes".to_string()))?;
        Ok(StaticAgreementKey::from_bytes(array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yapyap_storage::SqliteStorage;

    #[tokio::test]
    async fn generates_once_and_reloads_the_same_identity() {
        let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let keystore = Keystore::new(Arc::clone(&store));

        let (first, _) = keystore.load_or_generate(1_000).await.unwrap();
        let (second, _) = keystore.load_or_generate(2_000).await.unwrap();

        assert_eq!(first.peer_id(), second.peer_id());
    }

    #[tokio::test]
    async fn reloaded_agreement_key_agrees_with_a_remote_peer() {
        let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let keystore = Keystore::new(Arc::clone(&store));

        let (_, agreement1) = keystore.load_or_generate(1_000).await.unwrap();
        let (_, agreement2) = keystore.load_or_generate(2_000).await.unwrap();

        let remote = StaticAgreementKey::generate();
        let shared_via_1 = agreement1.diffie_hellman(&remote.public_key());
        let shared_via_2 = agreement2.diffie_hellman(&remote.public_key());
        assert_eq!(shared_via_1.as_bytes(), shared_via_2.as_bytes());
    }
}
