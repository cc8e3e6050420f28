//! Backoff and bounded retry.
//!
//! Used in two places: the delay between fallback candidates, and the bounded
//! retry wrapped around store calls.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base
    Constant,
}

impl BackoffStrategy {
    /// Un-jittered delay for a zero-based attempt, capped at `max`.
    #[must_use]
    pub fn delay(&self, base: Duration, attempt: u32, max: Duration) -> Duration {
        let raw = match self {
            Self::Exponential => base.saturating_mul(2u32.saturating_pow(attempt)),
            Self::Linear => base.saturating_mul(attempt.saturating_add(1)),
            Self::Constant => base,
        };
        raw.min(max)
    }
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
}

impl JitterStrategy {
    /// Applies jitter to a delay.
    #[must_use]
    pub fn apply(&self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Self::None => delay,
            Self::Full if millis == 0 => delay,
            Self::Full => Duration::from_millis(rand::thread_rng().gen_range(0..=millis)),
            Self::Equal => {
                let half = millis / 2;
                if half == 0 {
                    delay
                } else {
                    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
                }
            }
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    2000
}

/// Configuration for bounded retry of store operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Jittered delay after the given zero-based failed attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff_strategy.delay(
            Duration::from_millis(self.base_delay_ms),
            attempt,
            Duration::from_millis(self.max_delay_ms),
        );
        self.jitter_strategy.apply(delay)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is reached. The last error is returned unchanged.
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    key: &str,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let remaining = attempt + 1 < config.max_attempts;
                if !remaining || !is_retryable(&e) {
                    return Err(e);
                }
                let delay = config.delay_for(attempt);
                tracing::debug!(
                    operation = key,
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_exponential_backoff_doubles() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);
        let strategy = BackoffStrategy::Exponential;
        assert_eq!(strategy.delay(base, 0, max), Duration::from_secs(1));
        assert_eq!(strategy.delay(base, 1, max), Duration::from_secs(2));
        assert_eq!(strategy.delay(base, 2, max), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let delay = BackoffStrategy::Exponential.delay(
            Duration::from_millis(1000),
            10,
            Duration::from_millis(5000),
        );
        assert_eq!(delay, Duration::from_millis(5000));
    }

    #[test]
    fn test_linear_and_constant_backoff() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(10);
        assert_eq!(BackoffStrategy::Linear.delay(base, 2, max), Duration::from_millis(300));
        assert_eq!(BackoffStrategy::Constant.delay(base, 5, max), base);
    }

    #[test]
    fn test_full_jitter_bounds() {
        let delay = Duration::from_millis(100);
        for _ in 0..50 {
            assert!(JitterStrategy::Full.apply(delay) <= delay);
        }
        assert_eq!(JitterStrategy::None.apply(delay), delay);
    }

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 50);
        assert_eq!(config.max_delay_ms, 2000);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_base_delay_ms(1)
            .with_jitter(JitterStrategy::None);
        let calls = AtomicU32::new(0);

        let result: Result<u32, String> = with_retry_if(
            &config,
            "flaky",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(format!("attempt {n}"))
                    } else {
                        Ok(n)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_at_max_attempts() {
        let config = RetryConfig::new()
            .with_max_attempts(3)
            .with_base_delay_ms(1)
            .with_jitter(JitterStrategy::None);
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = with_retry_if(
            &config,
            "down",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("always fails".to_string()) }
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let config = RetryConfig::new().with_base_delay_ms(1);
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = with_retry_if(
            &config,
            "permanent",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("constraint violation".to_string()) }
            },
            |_| false,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
