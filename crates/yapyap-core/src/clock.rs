//! Time abstraction so backoff and expiry logic is testable without sleeping.

use chrono::{DateTime, Utc};

/// Abstraction over wall-clock time and sleeping, injected wherever the
/// router needs "now" or needs to wait — keeps retry/backoff tests
/// deterministic.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`.
    fn sleep(&self, duration: std::time::Duration) -> futures_sleep::BoxSleep;
}

/// Real-time clock backed by `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: std::time::Duration) -> futures_sleep::BoxSleep {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// A small private module so `Clock::sleep`'s boxed future type has a home
/// without pulling `futures` in as a dependency just for `BoxFuture`.
pub mod futures_sleep {
    use std::future::Future;
    use std::pin::Pin;

    pub type BoxSleep = Pin<Box<dyn Future<Output = ()> + Send>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_reports_plausible_now() {
        let clock = SystemClock;
        let now = clock.now();
        assert!(now.timestamp() > 1_700_000_000);
    }
}
