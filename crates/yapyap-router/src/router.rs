//! The router core (§4.6): send/receive pipelines, the retry scheduler, and
//! the delta sync helpers, wired as an actor owning all the router's
//! in-memory, non-durable state.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use yapyap_core::{
    merge_vector_clocks, EventSink, Message, MessageId, MessageKind, PeerId, RouterEvent, Value,
    VectorClock,
};
use yapyap_crypto::agreement::StaticAgreementKey;
use yapyap_crypto::envelope::{decrypt_payload, encrypt_payload};
use yapyap_crypto::identity::IdentityKeypair;
use yapyap_storage::{IncomingMessage, PersistenceStore};
use yapyap_transport::{
    close_with_timeout, dial_with_timeout, send_with_timeout, Transport, TransportTimeouts,
};

use crate::config::RouterConfig;
use crate::dedup::DedupCache;
use crate::delta_sync::{self, DeltaSyncPayload};
use crate::error::{RouterError, RouterResult};
use crate::rate_limit::RateLimiter;
use crate::relay::{
    build_relay_envelope, decode_relay_envelope, encode_relay_envelope, select_relay_candidates,
    verify_relay_envelope,
};
use crate::reorder::ReorderBuffers;
use crate::reputation::ReputationTable;

const MESSAGE_PROTOCOL_ID: &str = "/yapyap/message/1.0.0";

/// A pluggable mapping from a message to the key its origin-level rate
/// limit bucket is keyed by. Defaults to the sender id (§4.6 step 1).
pub type OriginKeyFn = Box<dyn Fn(&Message) -> String + Send + Sync>;

fn default_origin_key(message: &Message) -> String {
    message.from.as_str().to_string()
}

/// Owns the in-memory state the router's pipelines mutate: dedup cache,
/// reorder buffers, rate limiters, and reputation table. Never the source
/// of truth for anything durable — a restart rebuilds it empty and the
/// store carries on regardless (§9 "read-through the store").
pub struct Router<S: PersistenceStore, T: Transport> {
    config: RouterConfig,
    store: Arc<S>,
    transport: Arc<T>,
    identity: IdentityKeypair,
    agreement_key: StaticAgreementKey,
    self_id: PeerId,
    event_sink: Arc<dyn EventSink>,
    origin_key_fn: OriginKeyFn,

    dedup: DedupCache,
    reorder: ReorderBuffers,
    origin_rate: RateLimiter,
    sender_rate: RateLimiter,
    reputation: ReputationTable,

    shutdown: tokio::sync::Notify,
    retry_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<S, T> Router<S, T>
where
    S: PersistenceStore + 'static,
    T: Transport + 'static,
{
    pub fn new(
        config: RouterConfig,
        store: Arc<S>,
        transport: Arc<T>,
        identity: IdentityKeypair,
        agreement_key: StaticAgreementKey,
        event_sink: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        let self_id = identity.peer_id();
        Arc::new(Self {
            origin_rate: RateLimiter::new(config.origin_rate_per_sec, config.origin_rate_burst),
            sender_rate: RateLimiter::new(config.sender_rate_per_sec, config.sender_rate_burst),
            dedup: DedupCache::new(config.dedup_lru_capacity),
            reorder: ReorderBuffers::new(config.reorder_buffer_capacity),
            reputation: ReputationTable::new(),
            config,
            store,
            transport,
            identity,
            agreement_key,
            self_id,
            event_sink,
            origin_key_fn: Box::new(default_origin_key),
            shutdown: tokio::sync::Notify::new(),
            retry_task: tokio::sync::Mutex::new(None),
        })
    }

    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    fn emit(&self, event: RouterEvent) {
        self.event_sink.emit(event);
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Start the periodic retry scheduler (§4.6 "Retry scheduler").
    pub async fn start(self: &Arc<Self>) {
        let router = Arc::clone(self);
        let mut ticker = tokio::time::interval(router.config.retry_tick_interval);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = router.retry_tick().await {
                            warn!(%err, "retry tick failed");
                        }
                    }
                    _ = router.shutdown.notified() => break,
                }
            }
        });
        *self.retry_task.lock().await = Some(handle);
    }

    /// Stop the retry scheduler. In-flight transmits are left to their own
    /// timeouts (§5 "Cancellation and timeouts").
    pub async fn shutdown(&self) {
        self.shutdown.notify_waiters();
        if let Some(handle) = self.retry_task.lock().await.take() {
            let _ = handle.await;
        }
    }

    // ---- Send pipeline (§4.6 "Send pipeline") ----------------------------

    #[instrument(skip(self, message), fields(message_id = %message.id))]
    pub async fn send(&self, mut message: Message) -> RouterResult<()> {
        let now_ms = Self::now_ms();

        // Step 1: vector-clock bookkeeping.
        let self_counter = self.store.vector_clock_for(&self.self_id).await? + 1;
        self.store.update_vector_clock(&self.self_id, self_counter).await?;
        if message.sequence_number.is_none() {
            message.sequence_number = Some(self_counter);
        }
        let mut clock: VectorClock = self.store.all_vector_clocks().await?;
        if let Some(incoming) = &message.vector_clock {
            merge_vector_clocks(&mut clock, incoming);
        }
        clock.insert(self.self_id.clone(), self_counter);
        message.vector_clock = Some(clock);

        // Step 4: end-to-end encryption, if the recipient's key is known.
        if !message.payload.is_null() {
            if let Some(public_key_bytes) = self.store.get_peer_metadata(&message.to).await? {
                if let Ok(public_key) = <[u8; 32]>::try_from(public_key_bytes.as_slice()) {
                    message.payload =
                        encrypt_payload(&self.identity, &public_key, &message.payload)?;
                }
            }
        }

        // Step 2: persist durably before anything goes over the wire.
        let serialized = yapyap_codec::encode(&message)?;
        let deadline_at_ms = message.deadline_ms(now_ms);
        self.store
            .queue_outbound(&message.id.to_string(), &serialized, &message.to, deadline_at_ms, now_ms)
            .await?;

        // Step 3: best-effort event.
        self.emit(RouterEvent::Queued {
            message_id: message.id,
            target: message.to.clone(),
        });

        // Step 5: transmit now, with bounded reconnect attempts.
        let mut last_err = None;
        for _ in 0..=self.config.reconnect_attempts {
            match self.transmit(&message.to, &message).await {
                Ok(()) => {
                    self.emit(RouterEvent::Sent {
                        message_id: message.id,
                        target: message.to.clone(),
                    });
                    return Ok(());
                }
                Err(err) => {
                    let _ = self.transport.hang_up(&message.to).await;
                    last_err = Some(err);
                }
            }
        }

        // The queue entry remains pending; the retry scheduler takes over.
        Err(last_err.expect("loop always runs at least once"))
    }

    /// Dial, write one framed envelope, and close, all under independent
    /// timeouts (§4.5, §4.6 step 5).
    async fn transmit(&self, target: &PeerId, message: &Message) -> RouterResult<()> {
        let timeouts = self.config.transport_timeouts;
        let serialized = yapyap_codec::encode(message)?;

        let stream = dial_with_timeout(target, &timeouts, async {
            self.transport.dial_protocol(target, MESSAGE_PROTOCOL_ID).await
        })
        .await?;

        let mut framer = yapyap_codec::Framer::new(stream);
        let write_result = send_with_timeout(target, &timeouts, async {
            framer
                .write_frame(&serialized)
                .await
                .map_err(|e| yapyap_transport::TransportError::Other {
                    target: target.to_string(),
                    message: e.to_string(),
                })
        })
        .await;

        if let Err(err) = write_result {
            return Err(RouterError::from(err));
        }

        close_with_timeout(target, &timeouts, async {
            self.transport.close(framer.into_inner()).await
        })
        .await?;

        Ok(())
    }

    // ---- Receive pipeline (§4.6 "Receive pipeline") ----------------------

    pub async fn receive(&self, message: Message) -> RouterResult<()> {
        Box::pin(self.receive_inner(message)).await
    }

    fn receive_inner<'a>(
        &'a self,
        message: Message,
    ) -> Pin<Box<dyn Future<Output = RouterResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let now_ms = Self::now_ms();

            // Steps 1-2: rate gates.
            let origin_key = (self.origin_key_fn)(&message);
            if !self.origin_rate.try_acquire(&origin_key) {
                self.reputation.adjust(&message.from, -2);
                debug!(origin_key, "origin rate limit denied message");
                return Ok(());
            }
            if !self.sender_rate.try_acquire(message.from.as_str()) {
                self.reputation.adjust(&message.from, -2);
                debug!(sender = %message.from, "sender rate limit denied message");
                return Ok(());
            }

            // Step 3: opportunistic handover, best effort.
            if message.from != self.self_id {
                self.flush_pending_for(&message.from).await;
            }

            // Step 4: ack/nak shortcut.
            match message.kind {
                MessageKind::Ack => return self.handle_ack(&message, now_ms).await,
                MessageKind::Nak => return self.handle_nak(&message, now_ms).await,
                _ => {}
            }

            // Step 5: timestamp skew.
            if !message.within_skew(now_ms) {
                self.reputation.adjust(&message.from, -2);
                return Ok(());
            }

            // Step 6: relay envelope handling.
            if message.kind == MessageKind::RelayEnvelope {
                return self.handle_relay_envelope(&message, now_ms).await;
            }

            self.ingest_data_message(message, now_ms).await
        })
    }

    async fn handle_ack(&self, ack: &Message, now_ms: i64) -> RouterResult<()> {
        let original_id = match &ack.payload {
            Value::String(s) => s.clone(),
            _ => return Ok(()),
        };
        self.store.mark_delivered(&original_id, now_ms).await?;
        for replica in self.store.get_message_replicas(&original_id).await? {
            self.store
                .mark_replica_stored(&original_id, &replica.relay_peer, now_ms)
                .await?;
        }
        if let Ok(message_id) = original_id.parse::<MessageId>() {
            self.emit(RouterEvent::AckReceived {
                message_id,
                from: ack.from.clone(),
            });
            self.emit(RouterEvent::Delivered { message_id });
        }
        Ok(())
    }

    async fn handle_nak(&self, nak: &Message, now_ms: i64) -> RouterResult<()> {
        let original_id = match &nak.payload {
            Value::String(s) => s.clone(),
            _ => return Ok(()),
        };
        let reason = "nak-received".to_string();
        let retryable = self.store.get_retryable(i64::MAX).await?;
        let attempts = retryable
            .iter()
            .find(|q| q.message_id == original_id)
            .map(|q| q.attempts)
            .unwrap_or(0);
        let delay = self.config.backoff_for(attempts);
        self.store
            .schedule_retry(&original_id, now_ms + delay.as_millis() as i64, &reason, now_ms)
            .await?;
        if let Ok(message_id) = original_id.parse::<MessageId>() {
            self.emit(RouterEvent::NakReceived {
                message_id,
                from: nak.from.clone(),
                reason,
            });
        }
        Ok(())
    }

    async fn handle_relay_envelope(&self, message: &Message, now_ms: i64) -> RouterResult<()> {
        let envelope = match decode_relay_envelope(message) {
            Ok(envelope) => envelope,
            Err(_) => {
                self.reputation.adjust(&message.from, -5);
                return Ok(());
            }
        };

        if verify_relay_envelope(&envelope).is_err() {
            self.reputation.adjust(&message.from, -5);
            return Ok(());
        }

        if envelope.target == self.self_id {
            return self.receive_inner(envelope.original_message).await;
        }

        self.store
            .assign_replica(&envelope.original_message.id.to_string(), &self.self_id, now_ms)
            .await?;
        let deadline = now_ms + envelope.original_message.ttl_ms.unwrap_or(Message::DEFAULT_TTL_MS);
        let serialized = yapyap_codec::encode(&envelope.original_message)?;
        self.store
            .queue_outbound(
                &envelope.original_message.id.to_string(),
                &serialized,
                &envelope.target,
                deadline,
                now_ms,
            )
            .await?;
        Ok(())
    }

    async fn ingest_data_message(&self, mut message: Message, now_ms: i64) -> RouterResult<()> {
        let message_id_str = message.id.to_string();

        // Step 7: duplicate check.
        if self.store.is_processed(&message_id_str).await? || self.dedup.contains(&message_id_str) {
            self.emit(RouterEvent::Received {
                message_id: message.id,
                from: message.from.clone(),
                was_duplicate: true,
            });
            if message.kind == MessageKind::Data {
                self.send_ack(&message, now_ms).await;
            }
            self.reputation.adjust(&message.from, -1);
            return Ok(());
        }

        // Step 8: sequence validation.
        if let Some(seq) = message.sequence_number {
            let last = self.store.last_sequence(&message.from).await?;
            if seq <= last {
                self.reputation.adjust(&message.from, -3);
                return Ok(());
            }
            if seq > last + 1 {
                self.reorder.insert(message.from.clone(), seq, message);
                return Ok(());
            }
        }

        // Step 9: vector-clock validation.
        if let Some(clock) = &message.vector_clock {
            if let Some(&remote_counter) = clock.get(&message.from) {
                let local_counter = self.store.vector_clock_for(&message.from).await?;
                if remote_counter < local_counter {
                    self.reputation.adjust(&message.from, -3);
                    return Ok(());
                }
            }
        }

        // Decrypt end-to-end payload if present.
        if message.payload.is_encrypted_envelope() {
            message.payload =
                decrypt_payload(&message.from, &self.agreement_key, &message.payload)?;
        }

        self.persist_and_deliver(message, now_ms).await?;

        // Step 11: drain the reorder buffer for this sender.
        self.drain_reorder_buffer(now_ms).await?;
        Ok(())
    }

    async fn persist_and_deliver(&self, message: Message, now_ms: i64) -> RouterResult<()> {
        let message_id_str = message.id.to_string();
        let serialized = yapyap_codec::encode(&message)?;

        let outcome = self
            .store
            .persist_incoming_atomically(
                IncomingMessage {
                    message_id: message_id_str.clone(),
                    from: message.from.clone(),
                    sequence: message.sequence_number,
                    destination: Some(message.to.clone()),
                    data: serialized,
                    vector_clock: message.vector_clock.clone(),
                },
                now_ms,
            )
            .await?;

        self.dedup.insert(&message_id_str);

        self.emit(RouterEvent::Received {
            message_id: message.id,
            from: message.from.clone(),
            was_duplicate: outcome.duplicate,
        });

        if !outcome.duplicate && message.kind == MessageKind::Data {
            self.send_ack(&message, now_ms).await;
        }

        Ok(())
    }

    async fn drain_reorder_buffer(&self, now_ms: i64) -> RouterResult<()> {
        // A bounded number of senders' worth of draining per call keeps this
        // from looping forever if buffers keep refilling concurrently.
        let mut drained_any = true;
        while drained_any {
            drained_any = false;
            let senders = self.reorder.senders();
            for sender in senders {
                let last = self.store.last_sequence(&sender).await?;
                if let Some(next) = self.reorder.take(&sender, last + 1) {
                    drained_any = true;
                    self.ingest_data_message(next, now_ms).await?;
                }
            }
        }
        Ok(())
    }

    async fn send_ack(&self, message: &Message, now_ms: i64) {
        let ack = message.ack_for(self.self_id.clone(), now_ms);
        let serialized = match yapyap_codec::encode(&ack) {
            Ok(bytes) => bytes,
            Err(_) => return,
        };
        let deadline = now_ms + Message::DEFAULT_TTL_MS;
        let _ = self
            .store
            .queue_outbound(&ack.id.to_string(), &serialized, &ack.to, deadline, now_ms)
            .await;
        let _ = self.transmit(&ack.to, &ack).await;
    }

    async fn flush_pending_for(&self, peer: &PeerId) {
        if let Ok(entries) = self.store.get_pending_for_peer(peer, 16, Self::now_ms()).await {
            for entry in entries {
                if let Ok(message) = yapyap_codec::decode::<Message>(&entry.serialized) {
                    let _ = self.transmit(peer, &message).await;
                }
            }
        }
    }

    // ---- Retry scheduler (§4.6 "Retry scheduler") ------------------------

    #[instrument(skip(self))]
    pub async fn retry_tick(&self) -> RouterResult<()> {
        let now_ms = Self::now_ms();
        for entry in self.store.get_retryable(now_ms).await? {
            if entry.attempts >= self.config.max_attempts {
                self.store
                    .mark_failed(&entry.message_id, "max-retries-exceeded", now_ms)
                    .await?;
                for replica in self.store.get_message_replicas(&entry.message_id).await? {
                    self.store
                        .mark_replica_failed(&entry.message_id, &replica.relay_peer, now_ms)
                        .await?;
                }
                if let Ok(message_id) = entry.message_id.parse::<MessageId>() {
                    self.emit(RouterEvent::Failed {
                        message_id,
                        reason: "max-retries-exceeded".to_string(),
                    });
                }
                continue;
            }

            let Ok(message) = yapyap_codec::decode::<Message>(&entry.serialized) else {
                continue;
            };

            match self.transmit(&entry.target, &message).await {
                Ok(()) => {
                    self.store.mark_delivered(&entry.message_id, now_ms).await?;
                    if let Ok(message_id) = entry.message_id.parse::<MessageId>() {
                        self.emit(RouterEvent::Delivered { message_id });
                    }
                }
                Err(err) => {
                    let mut reason = err.to_string();
                    if entry.attempts >= self.config.relay_escalation_attempts
                        && self.escalate_to_relay(&entry.target, &message, now_ms, &reason).await?
                    {
                        reason = format!("fallback-routed:{reason}");
                    }
                    let delay = self.config.backoff_for(entry.attempts);
                    self.store
                        .schedule_retry(&entry.message_id, now_ms + delay.as_millis() as i64, &reason, now_ms)
                        .await?;
                }
            }
        }

        self.store
            .cleanup(now_ms, self.config.processed_retention.as_millis() as i64)
            .await?;
        Ok(())
    }

    /// §4.6 "Relay escalation".
    async fn escalate_to_relay(
        &self,
        target: &PeerId,
        message: &Message,
        now_ms: i64,
        last_transport_error: &str,
    ) -> RouterResult<bool> {
        let existing = self.store.get_message_replicas(&message.id.to_string()).await?;
        let live: Vec<PeerId> = existing
            .iter()
            .filter(|r| r.status != yapyap_storage::ReplicaStatus::Failed)
            .map(|r| r.relay_peer.clone())
            .collect();

        let relays = if live.len() >= self.config.relay_replica_count {
            live
        } else {
            let candidates = self
                .store
                .list_routing_cache()
                .await?
                .into_iter()
                .filter(|c| c.is_available)
                .map(|c| c.peer);
            select_relay_candidates(
                target,
                &self.self_id,
                candidates,
                &self.reputation,
                self.config.reputation_block_threshold,
                self.config.relay_replica_count,
                &self.config.fallback_relays,
            )
        };

        if relays.is_empty() {
            return Ok(false);
        }

        self.store
            .upsert_replicated(yapyap_storage::ReplicaRecord {
                message_id: message.id.to_string(),
                original_target: target.clone(),
                source: self.self_id.clone(),
                status: yapyap_storage::ReplicaStatus::Assigned,
                deadline_at_ms: message.deadline_ms(now_ms),
            })
            .await?;

        let mut any_succeeded = false;
        for relay in relays {
            let envelope = build_relay_envelope(
                &self.identity,
                target.clone(),
                message.clone(),
                Some("retry-exhausted".to_string()),
                Some(last_transport_error.to_string()),
            )?;
            self.store
                .assign_replica(&message.id.to_string(), &relay, now_ms)
                .await?;

            let relay_message = encode_relay_envelope(&envelope, self.self_id.clone(), now_ms);
            match self.transmit(&relay, &relay_message).await {
                Ok(()) => {
                    self.store.mark_replica_stored(&message.id.to_string(), &relay, now_ms).await?;
                    self.reputation.adjust(&relay, 2);
                    any_succeeded = true;
                }
                Err(_) => {
                    self.store.mark_replica_failed(&message.id.to_string(), &relay, now_ms).await?;
                    self.reputation.adjust(&relay, -4);
                }
            }
        }
        Ok(any_succeeded)
    }

    // ---- Delta sync --------------------------------------------------

    pub async fn create_delta_sync_payload(&self, since_timestamp_ms: i64) -> RouterResult<DeltaSyncPayload> {
        delta_sync::create_delta_sync_payload(
            self.store.as_ref(),
            self.self_id.clone(),
            since_timestamp_ms,
            Self::now_ms(),
        )
        .await
    }

    pub async fn apply_delta_sync_payload(&self, payload: &DeltaSyncPayload) -> RouterResult<()> {
        delta_sync::apply_delta_sync_payload(self.store.as_ref(), payload, Self::now_ms()).await
    }
}
