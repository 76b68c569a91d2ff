//! Exponential reconnect backoff with jitter.
//!
//! The n-th retry (counting from 0) waits `min(base * 2^n, cap)`, then
//! scaled by a random factor in `[1 - jitter, 1 + jitter]`.  With the default
//! policy (base 1 s, cap 30 s, jitter 0.2) the delays are roughly
//! 1 s, 2 s, 4 s, 8 s, 16 s, 30 s, 30 s, ...
//!
//! # Why jitter? (for beginners)
//!
//! When a broker or the Studio restarts, every table loses its connection at
//! the same moment.  Without jitter they would all retry at exactly the same
//! instants and hit the server in synchronised waves.  A small random spread
//! breaks those waves up.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tunable backoff constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub cap_ms: u64,
    /// Fraction in `[0, 1)`.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            cap_ms: 30_000,
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// The delay before retry `attempt` (0-based), without jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let ms = self.base_ms.saturating_mul(factor).min(self.cap_ms);
        Duration::from_millis(ms)
    }
}

/// Stateful backoff counter for one reconnect loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Retries handed out since the last [`Backoff::reset`].
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay before the next retry and advances the counter.
    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.policy.nominal_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        jittered(nominal, self.policy.jitter)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

fn jittered(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let spread = jitter.min(0.99);
    let factor = rand::thread_rng().gen_range(1.0 - spread..=1.0 + spread);
    delay.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nominal_delay_doubles_until_cap() {
        // Arrange
        let policy = BackoffPolicy::default();

        // Act
        let delays: Vec<u64> = (0..7)
            .map(|n| policy.nominal_delay(n).as_millis() as u64)
            .collect();

        // Assert
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn test_nominal_delay_does_not_overflow_for_huge_attempts() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.nominal_delay(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        // Arrange
        let mut backoff = Backoff::new(BackoffPolicy::default());

        // Act / Assert
        for _ in 0..100 {
            backoff.reset();
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(800), "{delay:?} below -20%");
            assert!(delay <= Duration::from_millis(1_200), "{delay:?} above +20%");
        }
    }

    #[test]
    fn test_zero_jitter_is_exact_and_reset_restarts_sequence() {
        // Arrange
        let mut backoff = Backoff::new(BackoffPolicy {
            base_ms: 100,
            cap_ms: 1_000,
            jitter: 0.0,
        });

        // Act
        let first = backoff.next_delay();
        let second = backoff.next_delay();
        backoff.reset();
        let after_reset = backoff.next_delay();

        // Assert
        assert_eq!(first, Duration::from_millis(100));
        assert_eq!(second, Duration::from_millis(200));
        assert_eq!(after_reset, Duration::from_millis(100));
        assert_eq!(backoff.attempt(), 1);
    }
}
