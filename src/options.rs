use std::time::Duration;

use serde::Deserialize;

use crate::backoff::backoff_delay;

/// Configures retry attempts and exponential backoff.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    pub initial_interval_ms: u64,
    /// Upper bound for any single delay in milliseconds.
    pub max_interval_ms: u64,
    /// Growth factor applied per failed attempt.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Builds a policy from durations.
    pub fn new(
        max_attempts: u32,
        initial_interval: Duration,
        max_interval: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_interval_ms: duration_to_ms(initial_interval),
            max_interval_ms: duration_to_ms(max_interval),
            backoff_multiplier,
        }
    }

    /// Policy that sends exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub(crate) fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the retry that follows `attempt_index + 1` failures.
    pub fn delay_before_retry(&self, attempt_index: u32) -> Duration {
        backoff_delay(
            attempt_index,
            self.backoff_multiplier,
            self.initial_interval(),
            self.max_interval(),
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_ms: 1_000,
            max_interval_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Configures the overall timeout and retry behavior.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Bound for a whole call across all attempts, in milliseconds.
    /// `0` disables it.
    pub timeout_ms: u64,
    /// Retry policy.
    pub retry: RetryConfig,
}

impl ClientOptions {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 15 * 60 * 1_000,
            retry: RetryConfig::default(),
        }
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ClientOptions, RetryConfig};

    #[test]
    fn defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.timeout(), Some(Duration::from_secs(900)));
        assert_eq!(options.retry.max_attempts, 3);
        assert_eq!(options.retry.initial_interval(), Duration::from_secs(1));
        assert_eq!(options.retry.max_interval(), Duration::from_secs(30));
    }

    #[test]
    fn zero_timeout_disables_bound() {
        let options = ClientOptions {
            timeout_ms: 0,
            ..ClientOptions::default()
        };
        assert_eq!(options.timeout(), None);
    }

    #[test]
    fn zero_attempts_still_sends_once() {
        let retry = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(retry.effective_max_attempts(), 1);
        assert_eq!(RetryConfig::no_retry().effective_max_attempts(), 1);
    }

    #[test]
    fn delay_before_retry_uses_policy() {
        let retry = RetryConfig::new(
            3,
            Duration::from_millis(100),
            Duration::from_millis(500),
            2.0,
        );
        assert_eq!(retry.delay_before_retry(0), Duration::from_millis(100));
        assert_eq!(retry.delay_before_retry(1), Duration::from_millis(200));
        assert_eq!(retry.delay_before_retry(2), Duration::from_millis(400));
        assert_eq!(retry.delay_before_retry(3), Duration::from_millis(500));
    }

    #[test]
    fn deserializes_partial_options_with_defaults() {
        let options: ClientOptions =
            serde_json::from_str(r#"{"timeout_ms": 5000, "retry": {"max_attempts": 5}}"#).unwrap();
        assert_eq!(options.timeout_ms, 5_000);
        assert_eq!(options.retry.max_attempts, 5);
        assert_eq!(options.retry.backoff_multiplier, 2.0);
    }
}
