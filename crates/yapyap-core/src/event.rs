//! Router-emitted events and the sink that carries them out (§5, §9).
//!
//! "Logger/event-bus singletons in the source should be passed explicitly;
//! the router accepts an `event_sink` with a non-blocking `emit` method."

use crate::message::MessageId;
use crate::peer_id::PeerId;

/// Events the router emits best-effort; emission never blocks message flow.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    Queued { message_id: MessageId, target: PeerId },
    Sent { message_id: MessageId, target: PeerId },
    Received { message_id: MessageId, from: PeerId, was_duplicate: bool },
    Delivered { message_id: MessageId },
    Failed { message_id: MessageId, reason: String },
    AckReceived { message_id: MessageId, from: PeerId },
    NakReceived { message_id: MessageId, from: PeerId, reason: String },
}

/// A non-blocking sink for [`RouterEvent`]s. Implementations must not block
/// or fail the caller's pipeline; a full channel should drop the event.
pub trait EventSink: Send + Sync + std::fmt::Debug {
    fn emit(&self, event: RouterEvent);
}

/// An `EventSink` that discards everything, for tests and headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: RouterEvent) {}
}
