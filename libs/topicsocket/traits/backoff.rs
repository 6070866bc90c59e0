use std::time::Duration;

/// Trait for computing the wait before the next reconnect attempt
///
/// Implementations must be pure and deterministic: the same failure count
/// always maps to the same delay, and delays are monotonically
/// non-decreasing in the failure count.
///
/// A policy never terminates retries. The session keeps reconnecting until
/// the caller explicitly disconnects; an inherently unreliable transport is
/// not a reason to give up.
pub trait BackoffPolicy: Send + Sync {
    /// Get the delay before the next reconnection attempt
    ///
    /// # Arguments
    /// * `consecutive_failures` - Number of failed attempts in a row
    ///   (1 on the first failure; reset to 0 by a successful connect)
    fn delay(&self, consecutive_failures: u32) -> Duration;
}

/// Stepped backoff policy
///
/// Waits 5 seconds between attempts while the connection is freshly broken,
/// then widens the window as failures accumulate:
///
/// | failures in a row | delay |
/// |-------------------|-------|
/// | > 20              | 600 s |
/// | > 16              | 300 s |
/// | > 12              | 120 s |
/// | > 8               |  60 s |
/// | > 4               |  20 s |
/// | > 2               |  10 s |
/// | otherwise         |   5 s |
///
/// No jitter, no cap beyond 600 s. The steps bound reconnection storm
/// frequency against a struggling broker while still recovering quickly
/// from transient blips.
#[derive(Debug, Clone, Copy, Default)]
pub struct SteppedBackoff;

impl BackoffPolicy for SteppedBackoff {
    fn delay(&self, consecutive_failures: u32) -> Duration {
        let secs = if consecutive_failures > 20 {
            600
        } else if consecutive_failures > 16 {
            300
        } else if consecutive_failures > 12 {
            120
        } else if consecutive_failures > 8 {
            60
        } else if consecutive_failures > 4 {
            20
        } else if consecutive_failures > 2 {
            10
        } else {
            5
        };
        Duration::from_secs(secs)
    }
}

/// Fixed delay backoff policy
///
/// Always waits the same amount of time between reconnection attempts.
/// Mostly useful in tests and latency-sensitive embedders.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffPolicy for FixedDelay {
    fn delay(&self, _consecutive_failures: u32) -> Duration {
        self.delay
    }
}
