//! End-to-end router scenarios: happy path, duplicate suppression,
//! out-of-order delivery, relay escalation, tampered relay rejection, and
//! rate-limited flood suppression.

use std::sync::Arc;

use yapyap_core::{Message, NullEventSink, PeerId, Value};
use yapyap_crypto::agreement::StaticAgreementKey;
use yapyap_crypto::identity::IdentityKeypair;
use yapyap_router::{Router, RouterConfig};
use yapyap_storage::{PersistenceStore, SqliteStorage};
use yapyap_transport::MockNetwork;

struct TestNode {
    router: Arc<Router<SqliteStorage, yapyap_transport::MockTransport>>,
    store: Arc<SqliteStorage>,
    identity: IdentityKeypair,
}

fn spin_up(network: &MockNetwork, config: RouterConfig) -> TestNode {
    let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let identity = IdentityKeypair::generate();
    let agreement = StaticAgreementKey::generate();
    let transport = Arc::new(network.transport());
    let router = Router::new(
        config,
        Arc::clone(&store),
        transport,
        IdentityKeypair::from_bytes(&identity.to_bytes()),
        agreement,
        Arc::new(NullEventSink),
    );
    network.listen(identity.peer_id());
    TestNode { router, store, identity }
}

fn peer(byte: u8) -> PeerId {
    PeerId::from_bytes(&[byte; 32])
}

#[tokio::test]
async fn happy_path_delivers_a_data_message() {
    let network = MockNetwork::new();
    let bob = spin_up(&network, RouterConfig::default());
    let alice_id = peer(1);

    let message = Message::data(alice_id.clone(), bob.identity.peer_id(), Value::String("hi bob".into()), 1_000);
    let message_id = message.id.to_string();
    bob.router.receive(message).await.unwrap();

    assert!(bob.store.is_processed(&message_id).await.unwrap());
}

#[tokio::test]
async fn duplicate_message_is_suppressed() {
    let network = MockNetwork::new();
    let bob = spin_up(&network, RouterConfig::default());
    let alice_id = peer(9);

    let message = Message::data(alice_id.clone(), bob.identity.peer_id(), Value::String("hi".into()), 1_000);
    let message_id = message.id.to_string();

    bob.router.receive(message.clone()).await.unwrap();
    bob.router.receive(message).await.unwrap();

    assert!(bob.store.is_processed(&message_id).await.unwrap());
}

#[tokio::test]
async fn out_of_order_messages_are_buffered_then_drained() {
    let network = MockNetwork::new();
    let bob = spin_up(&network, RouterConfig::default());
    let alice_id = peer(11);

    let mut second = Message::data(alice_id.clone(), bob.identity.peer_id(), Value::String("second".into()), 1_000);
    second.sequence_number = Some(2);
    bob.router.receive(second).await.unwrap();
    assert_eq!(bob.store.last_sequence(&alice_id).await.unwrap(), 0);

    let mut first = Message::data(alice_id.clone(), bob.identity.peer_id(), Value::String("first".into()), 1_000);
    first.sequence_number = Some(1);
    bob.router.receive(first).await.unwrap();

    assert_eq!(bob.store.last_sequence(&alice_id).await.unwrap(), 2);
}

#[tokio::test]
async fn tampered_relay_envelope_is_rejected() {
    let relay_signer = IdentityKeypair::generate();
    let original = Message::data(peer(3), peer(4), Value::String("via relay".into()), 1_000);

    let mut envelope =
        yapyap_router::relay::build_relay_envelope(&relay_signer, peer(4), original, None, None).unwrap();
    envelope.original_message.payload = Value::String("tampered".into());

    assert!(yapyap_router::relay::verify_relay_envelope(&envelope).is_err());
}

#[tokio::test]
async fn relay_envelope_addressed_to_self_is_unwrapped_and_ingested() {
    let network = MockNetwork::new();
    let bob = spin_up(&network, RouterConfig::default());
    let relay_signer = IdentityKeypair::generate();
    let alice_id = peer(7);

    let original = Message::data(alice_id.clone(), bob.identity.peer_id(), Value::String("via relay".into()), 1_000);
    let original_id = original.id.to_string();

    let envelope = yapyap_router::relay::build_relay_envelope(
        &relay_signer,
        bob.identity.peer_id(),
        original,
        Some("retry-exhausted".to_string()),
        None,
    )
    .unwrap();

    let relay_message = yapyap_router::relay::encode_relay_envelope(&envelope, relay_signer.peer_id(), 1_500);
    bob.router.receive(relay_message).await.unwrap();

    assert!(bob.store.is_processed(&original_id).await.unwrap());
}

#[tokio::test]
async fn rate_limited_flood_admits_only_the_first_message() {
    let mut config = RouterConfig::default();
    config.origin_rate_per_sec = 1;
    config.origin_rate_burst = 1;
    config.sender_rate_per_sec = 1;
    config.sender_rate_burst = 1;

    let network = MockNetwork::new();
    let bob = spin_up(&network, config);
    let alice_id = peer(21);

    let mut first = Message::data(alice_id.clone(), bob.identity.peer_id(), Value::String("one".into()), 1_000);
    first.sequence_number = Some(1);
    let mut second = Message::data(alice_id.clone(), bob.identity.peer_id(), Value::String("two".into()), 1_000);
    second.sequence_number = Some(2);

    bob.router.receive(first).await.unwrap();
    bob.router.receive(second).await.unwrap();

    assert_eq!(bob.store.last_sequence(&alice_id).await.unwrap(), 1);
}

#[tokio::test]
async fn ack_marks_queue_entry_delivered() {
    let network = MockNetwork::new();
    let alice = spin_up(&network, RouterConfig::default());
    let bob_id = peer(5);

    let outbound = Message::data(alice.identity.peer_id(), bob_id.clone(), Value::String("hi".into()), 1_000);
    let message_id = outbound.id.to_string();
    alice
        .store
        .queue_outbound(&message_id, b"payload", &bob_id, 100_000, 1_000)
        .await
        .unwrap();

    let ack = outbound.ack_for(bob_id, 1_500);
    alice.router.receive(ack).await.unwrap();

    let retryable = alice.store.get_retryable(1_500).await.unwrap();
    assert!(retryable.is_empty());
}

#[tokio::test]
async fn retry_tick_marks_failed_past_max_attempts() {
    let mut config = RouterConfig::default();
    config.max_attempts = 0;
    config.reconnect_attempts = 0;

    let network = MockNetwork::new();
    let alice = spin_up(&network, config);
    let unreachable_target = peer(99);

    let message = Message::data(alice.identity.peer_id(), unreachable_target.clone(), Value::Null, 1_000);
    let message_id = message.id.to_string();
    let serialized = yapyap_codec::encode(&message).unwrap();
    alice
        .store
        .queue_outbound(&message_id, &serialized, &unreachable_target, 100_000, 1_000)
        .await
        .unwrap();

    alice.router.retry_tick().await.unwrap();

    let retryable = alice.store.get_retryable(100_000).await.unwrap();
    assert!(retryable.is_empty());
}
