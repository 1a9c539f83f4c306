//! Transfer configuration and retry policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Payload size at which uploads switch to multipart (5 MiB)
pub const MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Hard upper bound on parallel part uploads
pub const MAX_CONCURRENCY_CAP: usize = 10;

/// Hard upper bound on attempts per upload, the first included
pub const MAX_ATTEMPTS_CAP: u32 = 3;

/// Hard upper bound on a single backoff delay in milliseconds
pub const MAX_BACKOFF_CAP_MS: u64 = 10_000;

/// Transfer engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Payloads of at least this many bytes use multipart
    pub multipart_threshold: u64,
    /// Size of each multipart part (the last part may be shorter)
    pub part_size: u64,
    /// Maximum parallel part uploads, clamped to `1..=MAX_CONCURRENCY_CAP`
    pub max_concurrency: usize,
    /// Whole-upload retry policy
    pub retry: RetryPolicy,
}

impl TransferConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With multipart threshold
    #[inline]
    #[must_use]
    pub fn with_multipart_threshold(mut self, bytes: u64) -> Self {
        self.multipart_threshold = bytes;
        self
    }

    /// With part size
    #[inline]
    #[must_use]
    pub fn with_part_size(mut self, bytes: u64) -> Self {
        self.part_size = bytes.max(1);
        self
    }

    /// With max concurrency
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Concurrency actually used for multipart uploads
    #[inline]
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.clamp(1, MAX_CONCURRENCY_CAP)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            multipart_threshold: MULTIPART_THRESHOLD,
            part_size: MULTIPART_THRESHOLD,
            max_concurrency: MAX_CONCURRENCY_CAP,
            retry: RetryPolicy::default(),
        }
    }
}

/// Capped exponential backoff applied to a whole upload call
///
/// The delay before attempt `n + 1` is `initial * 2^(n - 1)`, capped at `max`.
/// With the defaults that is 2 s then 4 s across three attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first, at most `MAX_ATTEMPTS_CAP`
    pub max_attempts: u32,
    /// First backoff delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds, at most `MAX_BACKOFF_CAP_MS`
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Policy with explicit bounds
    #[must_use]
    pub fn new(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: u64::try_from(initial.as_millis()).unwrap_or(u64::MAX),
            max_backoff_ms: u64::try_from(max.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Policy that never retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Attempts allowed, clamped to `1..=MAX_ATTEMPTS_CAP`
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.clamp(1, MAX_ATTEMPTS_CAP)
    }

    /// Backoff ceiling actually applied, never above `MAX_BACKOFF_CAP_MS`
    #[inline]
    #[must_use]
    pub fn backoff_ceiling_ms(&self) -> u64 {
        self.max_backoff_ms.min(MAX_BACKOFF_CAP_MS)
    }

    /// Delay to wait after the given failed attempt (1-based)
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64 << exponent;
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.backoff_ceiling_ms());
        Duration::from_millis(millis)
    }

    /// All delays a fully failing upload would wait through
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.attempts()).map(|a| self.delay_after(a)).collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_config() {
        let config = TransferConfig::default();
        assert_eq!(config.multipart_threshold, 5 * 1024 * 1024);
        assert_eq!(config.effective_concurrency(), 10);
        assert_eq!(config.retry.attempts(), 3);
    }

    #[test]
    fn concurrency_is_clamped() {
        assert_eq!(TransferConfig::new().with_max_concurrency(0).effective_concurrency(), 1);
        assert_eq!(TransferConfig::new().with_max_concurrency(64).effective_concurrency(), 10);
        assert_eq!(TransferConfig::new().with_max_concurrency(4).effective_concurrency(), 4);
    }

    #[test]
    fn default_backoff_sequence() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delays(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
        assert_eq!(policy.delay_after(4), Duration::from_secs(10));
        assert_eq!(policy.delay_after(40), Duration::from_secs(10));
    }

    #[test]
    fn oversized_policy_is_clamped() {
        let policy = RetryPolicy::new(6, Duration::from_secs(2), Duration::from_secs(60));
        assert_eq!(policy.attempts(), MAX_ATTEMPTS_CAP);
        assert_eq!(policy.backoff_ceiling_ms(), MAX_BACKOFF_CAP_MS);
        assert_eq!(policy.delay_after(5), Duration::from_secs(10));
        assert_eq!(
            policy.delays(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).attempts(), 1);
    }

    #[test]
    fn config_from_partial_json() {
        let config: TransferConfig =
            serde_json::from_str(r#"{"max_concurrency": 4, "retry": {"max_attempts": 2}}"#)
                .unwrap();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_backoff_ms, 2_000);
        assert_eq!(config.part_size, MULTIPART_THRESHOLD);
    }

    proptest! {
        #[test]
        fn prop_delays_non_decreasing_and_capped(
            initial in 1u64..5_000,
            max in 1u64..20_000,
            attempts in 1u32..12,
        ) {
            let policy = RetryPolicy { max_attempts: attempts, initial_backoff_ms: initial, max_backoff_ms: max };
            let delays = policy.delays();
            prop_assert_eq!(delays.len() as u32, attempts.min(MAX_ATTEMPTS_CAP) - 1);
            for pair in delays.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
            for d in &delays {
                prop_assert!(*d <= Duration::from_millis(max));
                prop_assert!(*d <= Duration::from_millis(MAX_BACKOFF_CAP_MS));
            }
        }
    }
}
