//! Retry policy for activity attempts
//!
//! A policy is stored with every scheduled activity, so it is part of the
//! workflow log and must stay serializable. Durations are persisted as
//! milliseconds.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activity::ActivityError;

/// How the wait between attempts grows
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Same wait before every retry
    #[default]
    Fixed,

    /// Wait multiplied by `coefficient` after every retry, up to `max_interval`
    Exponential {
        coefficient: f64,
        #[serde(with = "duration_millis")]
        max_interval: Duration,
    },
}

/// Attempt budget and wait schedule for one activity
///
/// # Example
///
/// ```
/// use docflow_durable::RetryPolicy;
/// use std::time::Duration;
///
/// // First retry after 5 seconds, at most 3 attempts in total
/// let policy = RetryPolicy::fixed(Duration::from_millis(5000), 3);
///
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(5));
/// assert!(!policy.has_attempts_remaining(3));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Attempts in total, the first one included
    pub max_attempts: u32,

    /// Wait before the first retry
    #[serde(with = "duration_millis")]
    pub interval: Duration,

    #[serde(default)]
    pub backoff: Backoff,

    /// Fraction of the wait added or removed at random (0.0-1.0)
    #[serde(default)]
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1), 5)
    }
}

impl RetryPolicy {
    /// Same wait before every retry
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            backoff: Backoff::Fixed,
            jitter: 0.0,
        }
    }

    /// Doubling wait capped at one minute, with 10% jitter
    pub fn exponential(initial: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval: initial,
            backoff: Backoff::Exponential {
                coefficient: 2.0,
                max_interval: Duration::from_secs(60),
            },
            jitter: 0.1,
        }
    }

    /// A single attempt
    pub fn no_retry() -> Self {
        Self::fixed(Duration::ZERO, 1)
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Cap the wait; only meaningful for exponential backoff
    pub fn with_max_interval(mut self, cap: Duration) -> Self {
        if let Backoff::Exponential { max_interval, .. } = &mut self.backoff {
            *max_interval = cap;
        }
        self
    }

    /// Wait before the given attempt (1-based) may start
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let base = match &self.backoff {
            Backoff::Fixed => self.interval.as_secs_f64(),
            Backoff::Exponential {
                coefficient,
                max_interval,
            } => {
                let grown = self.interval.as_secs_f64() * coefficient.powi(attempt as i32 - 2);
                grown.min(max_interval.as_secs_f64().max(self.interval.as_secs_f64()))
            }
        };

        if self.jitter <= 0.0 || base <= 0.0 {
            return Duration::from_secs_f64(base);
        }
        let spread = base * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread..spread);
        Duration::from_secs_f64((base + offset).max(0.0))
    }

    pub fn has_attempts_remaining(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Whether a failed attempt gets another try
    pub fn allows_retry(&self, error: &ActivityError, attempt: u32) -> bool {
        error.retryable && self.has_attempts_remaining(attempt)
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fixed_waits_the_same_before_each_retry() {
        let policy = RetryPolicy::fixed(Duration::from_millis(5000), 3);

        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_doubles_up_to_cap() {
        let policy = RetryPolicy::exponential(Duration::from_secs(1), 10)
            .with_jitter(0.0)
            .with_max_interval(Duration::from_secs(5));

        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::fixed(Duration::from_secs(10), 5).with_jitter(0.1);

        for _ in 0..50 {
            let delay = policy.delay_for_attempt(2);
            assert!(delay >= Duration::from_secs(9));
            assert!(delay <= Duration::from_secs(11));
        }
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5), 3);

        assert!(policy.allows_retry(&ActivityError::retryable("flaky"), 1));
        assert!(policy.allows_retry(&ActivityError::retryable("flaky"), 2));
        assert!(!policy.allows_retry(&ActivityError::retryable("flaky"), 3));
        assert!(!policy.allows_retry(&ActivityError::non_retryable("fatal"), 1));
        assert!(!RetryPolicy::no_retry().has_attempts_remaining(1));
        assert_eq!(RetryPolicy::fixed(Duration::ZERO, 0).max_attempts, 1);
    }

    #[test]
    fn test_persisted_form() {
        let policy = RetryPolicy::fixed(Duration::from_millis(5000), 3);
        let value = serde_json::to_value(&policy).unwrap();
        assert_eq!(
            value,
            json!({
                "max_attempts": 3,
                "interval": 5000,
                "backoff": {"kind": "fixed"},
                "jitter": 0.0
            })
        );

        // Older records without backoff or jitter read as fixed
        let parsed: RetryPolicy =
            serde_json::from_value(json!({"max_attempts": 3, "interval": 5000})).unwrap();
        assert_eq!(parsed, policy);
    }
}
