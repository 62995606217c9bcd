//! Bounded insertion-ordered dedup cache (§9 "LRU dedup"). A fast-path
//! check only; the persistent `processed_messages` table is the source of
//! truth, so eviction policy here has no correctness consequence.

use std::collections::VecDeque;

use dashmap::DashSet;

pub struct DedupCache {
    capacity: usize,
    seen: DashSet<String>,
    order: std::sync::Mutex<VecDeque<String>>,
}

impl DedupCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: DashSet::new(),
            order: std::sync::Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.seen.contains(message_id)
    }

    /// Record `message_id` as seen, evicting the oldest entry if at
    /// capacity. Returns whether this was a new insertion.
    pub fn insert(&self, message_id: &str) -> bool {
        if !self.seen.insert(message_id.to_string()) {
            return false;
        }

        let mut order = self.order.lock().expect("dedup order lock poisoned");
        order.push_back(message_id.to_string());
        if order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_duplicates() {
        let cache = DedupCache::new(8);
        assert!(cache.insert("m1"));
        assert!(!cache.insert("m1"));
        assert!(cache.contains("m1"));
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let cache = DedupCache::new(2);
        cache.insert("m1");
        cache.insert("m2");
        cache.insert("m3");
        assert!(!cache.contains("m1"));
        assert!(cache.contains("m2"));
        assert!(cache.contains("m3"));
    }
}
