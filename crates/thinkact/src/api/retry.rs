//! Retry policy for the think phase.
//!
//! Model calls that fail with a network, timeout, or DNS error are retried
//! with exponential backoff: `min(initial * multiplier^(attempt-1), max)`.
//! With the defaults that is 2s, 4s, 8s, ... capped at 60s. Anything else
//! ends the retry loop immediately.

use std::time::Duration;

/// Configuration for think-phase retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of model-call attempts per think (including the first).
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(2000),
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of attempts. Uses the default
    /// backoff schedule.
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }

    /// Delay to sleep after `attempt` failed (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self
            .multiplier
            .checked_pow(exponent)
            .map(u128::from)
            .unwrap_or(u128::MAX);
        let millis = self.initial_delay.as_millis().saturating_mul(factor);
        let capped = millis.min(self.max_delay.as_millis());
        Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX))
    }
}

/// Substrings that mark a model-call failure as transient.
const RETRYABLE_PATTERNS: &[&str] = &[
    "Failed to resolve",
    "timeout",
    "connection",
    "DNS",
    "WebClientRequestException",
    "DnsNameResolverTimeoutException",
];

/// Whether an error message indicates a transient (retryable) failure.
pub fn is_retryable_error(error: &str) -> bool {
    RETRYABLE_PATTERNS.iter().any(|p| error.contains(p))
}
