//! Token bucket rate limiting (§4.6 steps 1-2, §8 I7).

use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A per-key token bucket limiter: one bucket per distinct key (an origin
/// key or a sender id), refilled continuously at `rate_per_sec` up to
/// `burst`.
pub struct RateLimiter {
    rate_per_sec: f64,
    burst: f64,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        Self {
            rate_per_sec: rate_per_sec as f64,
            burst: burst as f64,
            buckets: DashMap::new(),
        }
    }

    /// Attempt to take one token for `key`. Returns whether the message is
    /// admitted.
    pub fn try_acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut bucket = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: self.burst,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_burst_then_denies() {
        let limiter = RateLimiter::new(1, 2);
        assert!(limiter.try_acquire("a"));
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, 1);
        assert!(limiter.try_acquire("a"));
        assert!(limiter.try_acquire("b"));
        assert!(!limiter.try_acquire("a"));
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(1000, 1);
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.try_acquire("a"));
    }
}
