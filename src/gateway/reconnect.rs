//! Reconnection scheduler
//!
//! Exponential backoff: `min(base * 2^attempt, max)`. The attempt counter
//! grows with every failed cycle and only drops back to zero when a
//! connection reaches `Ready`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::config::ReconnectConfig;

/// Backoff delay for the given attempt
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(max, |delay| delay.min(max))
}

/// What the supervisor should do after a connection cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then open a new connection
    RetryAfter(Duration),
    /// Too many failed cycles; stop for good
    GiveUp,
}

/// Tracks failed cycles and computes the next delay
#[derive(Debug)]
pub struct ReconnectScheduler {
    policy: ReconnectConfig,
    attempts: AtomicU32,
}

impl ReconnectScheduler {
    /// Create a scheduler with zero failed attempts
    pub fn new(policy: ReconnectConfig) -> Self {
        ReconnectScheduler {
            policy,
            attempts: AtomicU32::new(0),
        }
    }

    /// Failed cycles since the last `Ready`
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Called when a connection reaches `Ready`
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }

    /// Record a failed cycle and decide what comes next
    pub fn on_failure(&self) -> RetryDecision {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(max) = self.policy.max_attempts {
            if attempt >= max {
                return RetryDecision::GiveUp;
            }
        }
        RetryDecision::RetryAfter(backoff_delay(
            self.policy.base_delay,
            self.policy.max_delay,
            attempt,
        ))
    }

    /// Connection dropped while waiting for pairing approval: poll at the
    /// fixed pairing interval without counting a failure
    pub fn on_pairing_pending(&self) -> RetryDecision {
        RetryDecision::RetryAfter(self.policy.pairing_poll_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_backoff_sequence() {
        let delays: Vec<Duration> = (0..4).map(|a| backoff_delay(ms(1000), ms(30_000), a)).collect();
        assert_eq!(delays, vec![ms(1000), ms(2000), ms(4000), ms(8000)]);

        assert_eq!(backoff_delay(ms(1000), ms(30_000), 5), ms(30_000));
        assert_eq!(backoff_delay(ms(1000), ms(30_000), 31), ms(30_000));
        assert_eq!(backoff_delay(ms(1000), ms(30_000), 64), ms(30_000));
    }

    #[test]
    fn test_attempts_reset_on_ready() {
        let scheduler = ReconnectScheduler::new(ReconnectConfig::default());

        assert_eq!(scheduler.on_failure(), RetryDecision::RetryAfter(ms(1000)));
        assert_eq!(scheduler.on_failure(), RetryDecision::RetryAfter(ms(2000)));
        assert_eq!(scheduler.attempts(), 2);

        scheduler.reset();
        assert_eq!(scheduler.attempts(), 0);
        assert_eq!(scheduler.on_failure(), RetryDecision::RetryAfter(ms(1000)));
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let scheduler = ReconnectScheduler::new(ReconnectConfig {
            max_attempts: Some(2),
            ..Default::default()
        });

        assert!(matches!(scheduler.on_failure(), RetryDecision::RetryAfter(_)));
        assert!(matches!(scheduler.on_failure(), RetryDecision::RetryAfter(_)));
        assert_eq!(scheduler.on_failure(), RetryDecision::GiveUp);
    }

    #[test]
    fn test_pairing_poll_does_not_count() {
        let scheduler = ReconnectScheduler::new(ReconnectConfig::default());
        assert_eq!(scheduler.on_pairing_pending(), RetryDecision::RetryAfter(ms(5000)));
        assert_eq!(scheduler.attempts(), 0);
    }
}
