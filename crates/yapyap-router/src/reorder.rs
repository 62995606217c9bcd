//! Per-sender reorder buffer (§4.6 step 8, §8 I2): holds messages that
//! arrived ahead of the sender's expected sequence number until the gap is
//! filled, evicting the oldest buffered sequence if the cap is hit.

use std::collections::BTreeMap;

use dashmap::DashMap;

use yapyap_core::{Message, PeerId};

pub struct ReorderBuffers {
    capacity: usize,
    by_sender: DashMap<PeerId, BTreeMap<u64, Message>>,
}

impl ReorderBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            by_sender: DashMap::new(),
        }
    }

    /// Buffer `message` under `sender`/`sequence`, evicting the oldest
    /// buffered sequence if the per-sender buffer is full.
    pub fn insert(&self, sender: PeerId, sequence: u64, message: Message) {
        let mut buffer = self.by_sender.entry(sender).or_default();
        buffer.insert(sequence, message);
        while buffer.len() > self.capacity {
            if let Some((&oldest, _)) = buffer.iter().next() {
                buffer.remove(&oldest);
            }
        }
    }

    /// Pop the buffered message for `sender` at exactly `sequence`, if any.
    pub fn take(&self, sender: &PeerId, sequence: u64) -> Option<Message> {
        let mut buffer = self.by_sender.get_mut(sender)?;
        buffer.remove(&sequence)
    }

    /// Senders with at least one buffered message right now.
    pub fn senders(&self) -> Vec<PeerId> {
        self.by_sender
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yapyap_core::{Message, MessageKind};

    fn peer(byte: u8) -> PeerId {
        PeerId::from_bytes(&[byte; 32])
    }

    fn msg(seq: u64) -> Message {
        let mut m = Message::data(peer(1), peer(2), yapyap_core::Value::Null, 0);
        m.sequence_number = Some(seq);
        m
    }

    #[test]
    fn takes_exact_sequence_and_nothing_else() {
        let buffers = ReorderBuffers::new(8);
        buffers.insert(peer(1), 3, msg(3));
        assert!(buffers.take(&peer(1), 2).is_none());
        assert!(buffers.take(&peer(1), 3).is_some());
        assert!(buffers.take(&peer(1), 3).is_none());
    }

    #[test]
    fn evicts_oldest_sequence_past_capacity() {
        let buffers = ReorderBuffers::new(2);
        buffers.insert(peer(1), 5, msg(5));
        buffers.insert(peer(1), 6, msg(6));
        buffers.insert(peer(1), 7, msg(7));
        assert!(buffers.take(&peer(1), 5).is_none());
        assert!(buffers.take(&peer(1), 6).is_some());
        assert!(buffers.take(&peer(1), 7).is_some());
    }

    #[test]
    fn senders_lists_only_those_with_buffered_entries() {
        let buffers = ReorderBuffers::new(8);
        buffers.insert(peer(1), 5, msg(5));
        assert_eq!(buffers.senders(), vec![peer(1)]);

        buffers.take(&peer(1), 5);
        assert!(buffers.senders().is_empty());
    }
}
