//! Peer reputation table (§4.6 steps 1-2, 5, 6, 7, 8, §9).

use dashmap::DashMap;

use yapyap_core::PeerId;

pub struct ReputationTable {
    scores: DashMap<PeerId, i64>,
}

impl ReputationTable {
    pub fn new() -> Self {
        Self {
            scores: DashMap::new(),
        }
    }

    pub fn score(&self, peer: &PeerId) -> i64 {
        self.scores.get(peer).map(|s| *s).unwrap_or(0)
    }

    pub fn adjust(&self, peer: &PeerId, delta: i64) -> i64 {
        let mut entry = self.scores.entry(peer.clone()).or_insert(0);
        *entry += delta;
        *entry
    }

    pub fn is_blocked(&self, peer: &PeerId, threshold: i64) -> bool {
        self.score(peer) <= threshold
    }
}

impl Default for ReputationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(byte: u8) -> PeerId {
        PeerId::from_bytes(&[byte; 32])
    }

    #[test]
    fn adjustments_accumulate() {
        let table = ReputationTable::new();
        table.adjust(&peer(1), -2);
        table.adjust(&peer(1), -3);
        assert_eq!(table.score(&peer(1)), -5);
    }

    #[test]
    fn blocked_below_threshold() {
        let table = ReputationTable::new();
        table.adjust(&peer(1), -45);
        assert!(table.is_blocked(&peer(1), -40));
        assert!(!table.is_blocked(&peer(2), -40));
    }
}
