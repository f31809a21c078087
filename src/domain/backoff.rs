//! Reconnection Backoff
//!
//! Exponential backoff for feed reconnection. The delay before the Nth
//! consecutive reconnect attempt is `base_delay * 2^(N-1)`; a successful
//! open resets the sequence. Optional jitter randomizes each delay by
//! `±jitter_factor` without changing the attempt accounting.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Reconnection limits for a single feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Consecutive failed cycles tolerated before giving up.
    /// Zero disables reconnection entirely.
    pub max_attempts: u32,
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Jitter as a fraction of the delay (0.1 = ±10%). Zero disables it.
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            jitter_factor: 0.0,
        }
    }
}

impl ReconnectPolicy {
    /// Policy without jitter.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            jitter_factor: 0.0,
        }
    }

    /// Un-jittered delay for the reconnect following `attempts` prior
    /// consecutive failures. Saturates instead of overflowing.
    #[must_use]
    pub fn delay_for(&self, attempts: u32) -> Duration {
        2u32.checked_pow(attempts)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

/// Per-connection backoff state. Owned exclusively by one connection.
#[derive(Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    /// Fresh backoff state.
    #[must_use]
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Record a failed or closed cycle and return the delay before the
    /// next attempt, or `None` once `max_attempts` is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }

        let delay = self.policy.delay_for(self.attempts);
        self.attempts += 1;
        Some(self.apply_jitter(delay))
    }

    /// Reset after a successful open.
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive failed cycles since the last successful open.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether another reconnect is allowed.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.attempts < self.policy.max_attempts
    }

    /// Policy this backoff enforces.
    #[must_use]
    pub const fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.policy.jitter_factor <= 0.0 || delay == Duration::MAX {
            return delay;
        }

        let base = delay.as_secs_f64();
        let range = base * self.policy.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-range..=range);
        Duration::try_from_secs_f64((base + jitter).max(0.001)).unwrap_or(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, base_ms: u64) -> ReconnectPolicy {
        ReconnectPolicy::new(max_attempts, Duration::from_millis(base_ms))
    }

    #[test]
    fn test_delays_double_per_attempt() {
        let mut backoff = Backoff::new(policy(10, 100));
        let delays: Vec<_> = (0..4).filter_map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
        assert_eq!(backoff.attempts(), 4);
    }

    #[test]
    fn test_exhausts_at_max_attempts() {
        let mut backoff = Backoff::new(policy(3, 10));
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(!backoff.can_retry());
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempts(), 3);
    }

    #[test]
    fn test_reset_restores_base_delay() {
        let mut backoff = Backoff::new(policy(5, 100));
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_zero_attempts_never_retries() {
        let mut backoff = Backoff::new(policy(0, 100));
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn test_delay_saturates() {
        assert_eq!(policy(100, 1000).delay_for(64), Duration::MAX);
    }

    #[test]
    fn test_jitter_bounds() {
        let jittered = ReconnectPolicy {
            jitter_factor: 0.1,
            ..policy(1, 1000)
        };
        for _ in 0..100 {
            let mut backoff = Backoff::new(jittered);
            let ms = backoff.next_delay().unwrap().as_millis();
            assert!((900..=1100).contains(&ms), "delay {ms}ms outside ±10%");
        }
    }
}
