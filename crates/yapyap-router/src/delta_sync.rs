//! Delta sync (§4.6 "Delta sync", §8 R2): the partition-recovery and
//! peer-reunion mechanism.

use std::collections::BTreeMap;

use yapyap_core::PeerId;
use yapyap_storage::{PendingMessageSummary, PersistenceStore};

use crate::error::RouterResult;

/// The payload exchanged during delta sync.
#[derive(Debug, Clone)]
pub struct DeltaSyncPayload {
    pub origin: PeerId,
    pub since_timestamp_ms: i64,
    pub now_ms: i64,
    pub processed_ids: Vec<String>,
    pub pending_messages: Vec<PendingMessageSummary>,
    pub vector_clock: BTreeMap<PeerId, u64>,
}

const DELTA_SYNC_PAGE_SIZE: usize = 1_000;

/// Build a delta sync payload summarizing everything this node has learned
/// since `since_timestamp_ms`.
pub async fn create_delta_sync_payload<S: PersistenceStore>(
    store: &S,
    origin: PeerId,
    since_timestamp_ms: i64,
    now_ms: i64,
) -> RouterResult<DeltaSyncPayload> {
    let processed_ids = store
        .processed_ids_since(since_timestamp_ms, DELTA_SYNC_PAGE_SIZE)
        .await?;
    let pending_messages = store
        .pending_since(since_timestamp_ms, DELTA_SYNC_PAGE_SIZE)
        .await?;
    let vector_clock = store.all_vector_clocks().await?;

    Ok(DeltaSyncPayload {
        origin,
        since_timestamp_ms,
        now_ms,
        processed_ids,
        pending_messages,
        vector_clock,
    })
}

/// Apply a received delta sync payload: raise vector-clock entries by
/// monotone max, and requeue any pending message not already processed
/// (§8 R2).
pub async fn apply_delta_sync_payload<S: PersistenceStore>(
    store: &S,
    payload: &DeltaSyncPayload,
    now_ms: i64,
) -> RouterResult<()> {
    for (peer, counter) in &payload.vector_clock {
        store.update_vector_clock(peer, *counter).await?;
    }

    for pending in &payload.pending_messages {
        if store.is_processed(&pending.message_id).await? {
            continue;
        }
        store
            .queue_outbound(
                &pending.message_id,
                &pending.serialized,
                &pending.target,
                now_ms + pending.ttl_ms,
                now_ms,
            )
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use yapyap_storage::{IncomingMessage, SqliteStorage};

    fn peer(byte: u8) -> PeerId {
        PeerId::from_bytes(&[byte; 32])
    }

    #[tokio::test]
    async fn apply_raises_vector_clock_and_requeues_unprocessed() {
        let sender_store = SqliteStorage::open_in_memory().unwrap();
        sender_store
            .persist_incoming_atomically(
                IncomingMessage {
                    message_id: "m1".into(),
                    from: peer(1),
                    sequence: Some(1),
                    destination: Some(peer(2)),
                    data: b"payload".to_vec(),
                    vector_clock: None,
                },
                1_000,
            )
            .await
            .unwrap();
        sender_store
            .queue_outbound("m1", b"payload", &peer(2), 100_000, 1_000)
            .await
            .unwrap();
        sender_store.update_vector_clock(&peer(1), 5).await.unwrap();

        let payload = create_delta_sync_payload(&sender_store, peer(1), 0, 2_000)
            .await
            .unwrap();

        let receiver_store = SqliteStorage::open_in_memory().unwrap();
        apply_delta_sync_payload(&receiver_store, &payload, 2_000)
            .await
            .unwrap();

        assert_eq!(receiver_store.vector_clock_for(&peer(1)).await.unwrap(), 5);
        let retryable = receiver_store.get_retryable(2_000).await.unwrap();
        assert_eq!(retryable.len(), 1);
    }

    #[tokio::test]
    async fn apply_skips_already_processed_messages() {
        let receiver_store = SqliteStorage::open_in_memory().unwrap();
        receiver_store
            .persist_incoming_atomically(
                IncomingMessage {
                    message_id: "m1".into(),
                    from: peer(1),
                    sequence: Some(1),
                    destination: Some(peer(2)),
                    data: b"payload".to_vec(),
                    vector_clock: None,
                },
                1_000,
            )
            .await
            .unwrap();

        let payload = DeltaSyncPayload {
            origin: peer(1),
            since_timestamp_ms: 0,
            now_ms: 2_000,
            processed_ids: vec!["m1".into()],
            pending_messages: vec![PendingMessageSummary {
                message_id: "m1".into(),
                target: peer(2),
                serialized: b"payload".to_vec(),
                ttl_ms: 1_000,
            }],
            vector_clock: BTreeMap::new(),
        };

        apply_delta_sync_payload(&receiver_store, &payload, 2_000)
            .await
            .unwrap();

        let retryable = receiver_store.get_retryable(2_000).await.unwrap();
        assert!(retryable.is_empty());
    }
}
