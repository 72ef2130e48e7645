//! Retry policy: backoff between `request_tries` attempts inside one execution.
//!
//! Across cycles there is no backoff; the entry simply stays in the store.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Number of requests per execution (including the first). Always >= 1.
    pub tries: u32,

    /// Delay before the second request. Zero disables sleeping.
    pub base_delay: Duration,

    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(tries: u32, base_delay: Duration) -> Self {
        Self {
            tries: tries.max(1),
            base_delay,
            multiplier: 2.0,
        }
    }

    /// Retry immediately, `tries` times in total.
    pub fn immediate(tries: u32) -> Self {
        Self::new(tries, Duration::ZERO)
    }

    /// Delay after the `attempts`-th failed request (1-indexed):
    /// `base_delay * multiplier^(attempts - 1)`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = base_secs * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }

    pub fn has_more(&self, attempts: u32) -> bool {
        attempts < self.tries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_increases() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2));

        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
        assert_eq!(policy.next_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn immediate_policy_never_sleeps() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.next_delay(1), Duration::ZERO);
        assert_eq!(policy.next_delay(2), Duration::ZERO);
    }

    #[test]
    fn tries_bound_attempts() {
        let policy = RetryPolicy::immediate(3);
        assert!(policy.has_more(1));
        assert!(policy.has_more(2));
        assert!(!policy.has_more(3));

        // 0 は 1 回に丸める
        assert_eq!(RetryPolicy::immediate(0).tries, 1);
    }
}
