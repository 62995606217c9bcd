//! Router configuration (§4.6, §5, §9): every source-defined magic number
//! lives here as a tunable, not a literal buried in the pipeline.

use std::time::Duration;

use yapyap_core::PeerId;

/// Tunables for the router's send/receive/retry pipelines.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Default message time-to-live, used when a message carries none.
    pub default_ttl: Duration,
    /// Base delay for exponential backoff (§8 I4).
    pub backoff_base: Duration,
    /// Cap on the computed backoff delay.
    pub backoff_cap: Duration,
    /// Attempts past which a queue entry is marked permanently failed.
    pub max_attempts: u32,
    /// Attempts at which relay escalation kicks in.
    pub relay_escalation_attempts: u32,
    /// Number of relay candidates to select per escalated message.
    pub relay_replica_count: usize,
    /// Bootstrap peers used to pad relay selection when the cache is thin.
    pub fallback_relays: Vec<PeerId>,
    /// Reputation at or below which a peer is excluded from relay selection.
    pub reputation_block_threshold: i64,
    /// Interval between `retryTick` invocations.
    pub retry_tick_interval: Duration,
    /// Reconnect attempts within a single `send` call.
    pub reconnect_attempts: u32,

    /// Origin-key token bucket: tokens refilled per second, burst size.
    pub origin_rate_per_sec: u32,
    pub origin_rate_burst: u32,
    /// Sender token bucket: tokens refilled per second, burst size.
    pub sender_rate_per_sec: u32,
    pub sender_rate_burst: u32,

    /// Reorder buffer capacity per sender (§5 buffer caps).
    pub reorder_buffer_capacity: usize,
    /// Dedup LRU capacity.
    pub dedup_lru_capacity: usize,
    /// Processed-record retention horizon for `cleanup`.
    pub processed_retention: Duration,

    pub transport_timeouts: yapyap_transport::TransportTimeouts,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(24 * 60 * 60),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            max_attempts: 8,
            relay_escalation_attempts: 3,
            relay_replica_count: 3,
            fallback_relays: Vec::new(),
            reputation_block_threshold: -40,
            retry_tick_interval: Duration::from_secs(5),
            reconnect_attempts: 1,
            origin_rate_per_sec: 60,
            origin_rate_burst: 120,
            sender_rate_per_sec: 30,
            sender_rate_burst: 60,
            reorder_buffer_capacity: 512,
            dedup_lru_capacity: 10_000,
            processed_retention: Duration::from_secs(7 * 24 * 60 * 60),
            transport_timeouts: yapyap_transport::TransportTimeouts::default(),
        }
    }
}

/// Warnings surfaced by [`RouterConfig::validate`]: configurations that
/// compile but are almost certainly misconfigured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    BackoffBaseExceedsCap,
    MaxAttemptsBelowEscalationThreshold,
    RelayReplicaCountIsZero,
    RetryTickIntervalTooShort,
    ReputationThresholdNotNegative,
    DedupLruTooSmall,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::BackoffBaseExceedsCap => write!(f, "backoff_base exceeds backoff_cap"),
            ConfigWarning::MaxAttemptsBelowEscalationThreshold => {
                write!(f, "max_attempts is at or below relay_escalation_attempts")
            }
            ConfigWarning::RelayReplicaCountIsZero => write!(f, "relay_replica_count is zero"),
            ConfigWarning::RetryTickIntervalTooShort => {
                write!(f, "retry_tick_interval is below 1s")
            }
            ConfigWarning::ReputationThresholdNotNegative => {
                write!(f, "reputation_block_threshold should be negative")
            }
            ConfigWarning::DedupLruTooSmall => write!(f, "dedup_lru_capacity is below 16"),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.backoff_base > self.backoff_cap {
            warnings.push(ConfigWarning::BackoffBaseExceedsCap);
        }
        if self.max_attempts <= self.relay_escalation_attempts {
            warnings.push(ConfigWarning::MaxAttemptsBelowEscalationThreshold);
        }
        if self.relay_replica_count == 0 {
            warnings.push(ConfigWarning::RelayReplicaCountIsZero);
        }
        if self.retry_tick_interval < Duration::from_secs(1) {
            warnings.push(ConfigWarning::RetryTickIntervalTooShort);
        }
        if self.reputation_block_threshold >= 0 {
            warnings.push(ConfigWarning::ReputationThresholdNotNegative);
        }
        if self.dedup_lru_capacity < 16 {
            warnings.push(ConfigWarning::DedupLruTooSmall);
        }

        warnings
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Backoff delay for the i-th retry (§8 I4): `base * 2^attempts`, capped.
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_warnings() {
        assert!(RouterConfig::default().is_valid());
    }

    #[test]
    fn backoff_for_doubles_and_caps() {
        let config = RouterConfig::default();
        assert_eq!(config.backoff_for(0), Duration::from_secs(1));
        assert_eq!(config.backoff_for(1), Duration::from_secs(2));
        assert_eq!(config.backoff_for(2), Duration::from_secs(4));
        assert_eq!(config.backoff_for(10), Duration::from_secs(60));
    }

    #[test]
    fn flags_inverted_backoff_bounds() {
        let mut config = RouterConfig::default();
        config.backoff_base = Duration::from_secs(120);
        let warnings = config.validate();
        assert!(warnings.contains(&ConfigWarning::BackoffBaseExceedsCap));
    }
}
