//! [`YapyapNode`]: the composition root that wires persistence, crypto,
//! transport, the session registry, and the router core into a single
//! handle, the way `indras_node::IndrasNode` wires its own sibling crates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, instrument};

use yapyap_core::{EventSink, Message, MessageId, PeerId, RouterEvent, Value};
use yapyap_router::{DeltaSyncPayload, Router};
use yapyap_session::SessionRegistry;
use yapyap_storage::{Contact, PersistenceStore};
use yapyap_transport::Transport;

use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::keystore::Keystore;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Forwards every router event onto a broadcast channel so `subscribe_events`
/// callers see them live; per §5/§9, emission never blocks the pipeline — a
/// lagging or absent subscriber just misses events, it never stalls `send`/
/// `receive`.
#[derive(Debug)]
struct BroadcastEventSink {
    tx: broadcast::Sender<RouterEvent>,
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: RouterEvent) {
        let _ = self.tx.send(event);
    }
}

/// A running (or not-yet-started) Message Router node.
///
/// Ties together the persistence store, the router core, and the session
/// registry, and exposes the handful of methods an external control plane
/// (HTTP/WebSocket, per §6) would call: sending a message, subscribing to
/// events, looking up peer info, and managing contacts. It does not serve
/// that control plane itself.
pub struct YapyapNode<S: PersistenceStore + 'static, T: Transport + 'static> {
    config: NodeConfig,
    store: Arc<S>,
    router: Arc<Router<S, T>>,
    sessions: Arc<SessionRegistry<S>>,
    event_tx: broadcast::Sender<RouterEvent>,
    started: AtomicBool,
}

impl<S, T> YapyapNode<S, T>
where
    S: PersistenceStore + 'static,
    T: Transport + 'static,
{
    /// Build a node atop an already-open store and transport. Loads (or
    /// generates, on first run) this node's identity, hydrates the session
    /// registry, and wires the router core. Does not start networking —
    /// call [`start`](Self::start) for that.
    #[instrument(skip(config, store, transport), fields(data_dir = %config.data_dir.display()))]
    pub async fn new(config: NodeConfig, store: Arc<S>, transport: Arc<T>) -> NodeResult<Self> {
        let now = now_ms();
        let keystore = Keystore::new(Arc::clone(&store));
        let (identity, agreement_key) = keystore.load_or_generate(now).await?;

        let sessions = Arc::new(SessionRegistry::new(Arc::clone(&store)));
        sessions.hydrate(now).await?;

        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let sink = Arc::new(BroadcastEventSink { tx: event_tx.clone() });

        let mut router_config = config.router.clone();
        if router_config.fallback_relays.is_empty() {
            router_config.fallback_relays = config.bootstrap_peers.clone();
        }

        let router = Router::new(router_config, Arc::clone(&store), transport, identity, agreement_key, sink);

        info!(peer = %router.self_id(), "node ready");

        Ok(Self {
            config,
            store,
            router,
            sessions,
            event_tx,
            started: AtomicBool::new(false),
        })
    }

    /// This node's identity.
    pub fn self_id(&self) -> &PeerId {
        self.router.self_id()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Start the router's retry scheduler. Idempotent to call twice is an
    /// error, matching the teacher's `already-started` guard.
    #[instrument(skip(self))]
    pub async fn start(&self) -> NodeResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyStarted);
        }
        self.router.start().await;
        info!("node started");
        Ok(())
    }

    /// Stop the retry scheduler and let any in-flight tick finish.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> NodeResult<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.router.shutdown().await;
        info!("node stopped");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Send a data message to `to`, through the full send pipeline (§4.6
    /// steps 1-5: vector-clock stamping, conditional encryption, durable
    /// queueing, transmit-with-retry).
    #[instrument(skip(self, payload), fields(to = %to))]
    pub async fn send_message(&self, to: PeerId, payload: Value) -> NodeResult<MessageId> {
        let message = Message::data(self.self_id().clone(), to, payload, now_ms());
        let message_id = message.id;
        self.router.send(message).await?;
        Ok(message_id)
    }

    /// Subscribe to the live event stream (queued/sent/received/delivered/
    /// failed/ack/nak). A lagging subscriber drops the oldest events rather
    /// than stalling the pipeline.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RouterEvent> {
        self.event_tx.subscribe()
    }

    /// Look up what we know about a peer.
    pub async fn peer_info(&self, peer: &PeerId) -> NodeResult<Option<Contact>> {
        Ok(self.store.get_contact(peer).await?)
    }

    /// All known contacts, most-recently-seen first.
    pub async fn contacts(&self) -> NodeResult<Vec<Contact>> {
        Ok(self.store.list_contacts().await?)
    }

    /// Add or update a contact (last-writer-wins by `last_seen`, §3).
    pub async fn upsert_contact(
        &self,
        peer: PeerId,
        alias: Option<String>,
        is_trusted: bool,
        metadata: Vec<u8>,
    ) -> NodeResult<()> {
        self.store
            .upsert_contact(Contact {
                peer,
                alias,
                last_seen_ms: now_ms(),
                metadata,
                is_trusted,
            })
            .await?;
        Ok(())
    }

    /// Drop expired sessions from the registry and the store.
    pub async fn cleanup_sessions(&self) -> NodeResult<()> {
        Ok(self.sessions.cleanup_expired().await?)
    }

    /// Build a delta sync payload to hand to a peer recovering from a
    /// partition (§4.6 "Delta sync").
    pub async fn create_delta_sync_payload(&self, since_timestamp_ms: i64) -> NodeResult<DeltaSyncPayload> {
        Ok(self.router.create_delta_sync_payload(since_timestamp_ms).await?)
    }

    /// Apply a delta sync payload received from a peer.
    pub async fn apply_delta_sync_payload(&self, payload: &DeltaSyncPayload) -> NodeResult<()> {
        Ok(self.router.apply_delta_sync_payload(payload).await?)
    }

    /// The session registry, for callers that need finer-grained control
    /// than `send_message`'s implicit per-message encryption provides.
    pub fn sessions(&self) -> &Arc<SessionRegistry<S>> {
        &self.sessions
    }

    /// The underlying store, for advanced/administrative operations.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use yapyap_storage::SqliteStorage;
    use yapyap_transport::MockNetwork;

    async fn create_test_node() -> (YapyapNode<SqliteStorage, yapyap_transport::MockTransport>, TempDir, MockNetwork)
    {
        let temp_dir = TempDir::new().unwrap();
        let config = NodeConfig::with_data_dir(temp_dir.path());
        let store = Arc::new(SqliteStorage::open(config.database_path()).unwrap());
        let network = MockNetwork::new();
        let transport = Arc::new(network.transport());
        let node = YapyapNode::new(config, store, transport).await.unwrap();
        network.listen(node.self_id().clone());
        (node, temp_dir, network)
    }

    #[tokio::test]
    async fn node_creation_generates_an_identity() {
        let (node, _temp, _network) = create_test_node().await;
        assert!(!node.is_started());
        assert!(!node.self_id().as_str().is_empty());
    }

    #[tokio::test]
    async fn restart_reuses_the_same_identity() {
        let temp_dir = TempDir::new().unwrap();
        let config = NodeConfig::with_data_dir(temp_dir.path());
        let network = MockNetwork::new();

        let store1 = Arc::new(SqliteStorage::open(config.database_path()).unwrap());
        let node1 = YapyapNode::new(config.clone(), store1, Arc::new(network.transport()))
            .await
            .unwrap();
        let first_id = node1.self_id().clone();
        drop(node1);

        let store2 = Arc::new(SqliteStorage::open(config.database_path()).unwrap());
        let node2 = YapyapNode::new(config, store2, Arc::new(network.transport()))
            .await
            .unwrap();
        assert_eq!(first_id, *node2.self_id());
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let (node, _temp, _network) = create_test_node().await;
        node.start().await.unwrap();
        assert!(matches!(node.start().await, Err(NodeError::AlreadyStarted)));
        node.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn send_message_queues_and_transmits_to_a_listening_peer() {
        let (alice, _temp, network) = create_test_node().await;
        let bob_id = PeerId::from_bytes(&[9u8; 32]);
        let mut bob_rx = network.listen(bob_id.clone());

        alice
            .send_message(bob_id, Value::String("hi bob".into()))
            .await
            .unwrap();

        assert!(bob_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn contacts_round_trip() {
        let (node, _temp, _network) = create_test_node().await;
        let peer = PeerId::from_bytes(&[3u8; 32]);

        node.upsert_contact(peer.clone(), Some("Alice".into()), true, vec![1, 2, 3])
            .await
            .unwrap();

        let fetched = node.peer_info(&peer).await.unwrap().unwrap();
        assert_eq!(fetched.alias.as_deref(), Some("Alice"));

        let all = node.contacts().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn subscribe_events_observes_a_queued_event() {
        let (node, _temp, network) = create_test_node().await;
        let bob_id = PeerId::from_bytes(&[4u8; 32]);
        let _bob_rx = network.listen(bob_id.clone());
        let mut events = node.subscribe_events();

        node.send_message(bob_id, Value::Null).await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(matches!(event, RouterEvent::Queued { .. }));
    }
}
