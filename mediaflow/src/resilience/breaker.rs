//! Sliding-window circuit breaker.

use super::{HealthStore, InMemoryHealthStore};
use crate::config::BreakerConfig;
use crate::utils::{Clock, SystemClock};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-provider circuit breaker over a shared [`HealthStore`].
///
/// A provider's circuit is open while its failures inside the window reach
/// the threshold. There is no half-open probe: the circuit closes when old
/// failures age out or a success resets the count.
///
/// Store errors are logged and treated as a closed circuit so a health
/// store outage never blocks generation.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    store: Arc<dyn HealthStore>,
    clock: Arc<dyn Clock>,
    config: BreakerConfig,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl CircuitBreaker {
    /// Creates a breaker backed by a process-local store.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            store: Arc::new(InMemoryHealthStore::new()),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Uses a shared health store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn HealthStore>) -> Self {
        self.store = store;
        self
    }

    /// Uses a custom clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Records one failure for `provider`.
    pub async fn record_failure(&self, provider: &str) {
        let now = self.clock.now();
        match self
            .store
            .record_failure(provider, now, self.config.window())
            .await
        {
            Ok(count) if count == self.config.failure_threshold => {
                warn!(
                    provider,
                    failures = count,
                    window_seconds = self.config.window_seconds,
                    "Circuit opened"
                );
            }
            Ok(count) => debug!(provider, failures = count, "Recorded provider failure"),
            Err(e) => warn!(provider, error = %e, "Could not record provider failure"),
        }
    }

    /// Returns true if `provider` should be skipped. Always false when the
    /// breaker is disabled.
    pub async fn is_open(&self, provider: &str) -> bool {
        self.config.is_enabled()
            && self.failure_count(provider).await >= self.config.failure_threshold
    }

    /// Failures of `provider` currently inside the window.
    pub async fn failure_count(&self, provider: &str) -> usize {
        let now = self.clock.now();
        match self
            .store
            .failure_count(provider, now, self.config.window())
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(provider, error = %e, "Health lookup failed; treating circuit as closed");
                0
            }
        }
    }

    /// Clears the failure history of `provider`.
    pub async fn reset(&self, provider: &str) {
        if let Err(e) = self.store.clear(provider).await {
            warn!(provider, error = %e, "Could not reset provider health");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PersistenceError;
    use crate::utils::{ManualClock, Timestamp};
    use async_trait::async_trait;
    use std::time::Duration;

    fn breaker_with_clock() -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let breaker = CircuitBreaker::new(BreakerConfig::default()).with_clock(clock.clone());
        (breaker, clock)
    }

    #[tokio::test]
    async fn test_opens_at_threshold() {
        let (breaker, _clock) = breaker_with_clock();

        for _ in 0..4 {
            breaker.record_failure("runway_gen3").await;
        }
        assert!(!breaker.is_open("runway_gen3").await);

        breaker.record_failure("runway_gen3").await;
        assert!(breaker.is_open("runway_gen3").await);
        assert!(!breaker.is_open("kling-v1").await);
    }

    #[tokio::test]
    async fn test_closes_after_window() {
        let (breaker, clock) = breaker_with_clock();
        for _ in 0..5 {
            breaker.record_failure("seedance-lite").await;
        }
        assert!(breaker.is_open("seedance-lite").await);

        clock.advance(Duration::from_secs(59));
        assert!(breaker.is_open("seedance-lite").await);

        clock.advance(Duration::from_secs(1));
        assert!(!breaker.is_open("seedance-lite").await);
        assert_eq!(breaker.failure_count("seedance-lite").await, 0);
    }

    #[tokio::test]
    async fn test_zero_threshold_disables_breaker() {
        let breaker = CircuitBreaker::new(BreakerConfig::default().with_failure_threshold(0));
        assert!(!breaker.is_open("gen4_image").await);

        for _ in 0..10 {
            breaker.record_failure("gen4_image").await;
        }
        assert!(!breaker.is_open("gen4_image").await);
        assert_eq!(breaker.failure_count("gen4_image").await, 10);
    }

    #[tokio::test]
    async fn test_reset_closes_circuit() {
        let (breaker, _clock) = breaker_with_clock();
        for _ in 0..5 {
            breaker.record_failure("gen4_image").await;
        }
        breaker.reset("gen4_image").await;
        assert!(!breaker.is_open("gen4_image").await);
    }

    #[tokio::test]
    async fn test_spread_out_failures_never_open() {
        let (breaker, clock) = breaker_with_clock();
        for _ in 0..10 {
            breaker.record_failure("flux-pro").await;
            clock.advance(Duration::from_secs(15));
        }
        assert!(!breaker.is_open("flux-pro").await);
    }

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl HealthStore for BrokenStore {
        async fn record_failure(
            &self,
            _provider: &str,
            _at: Timestamp,
            _window: Duration,
        ) -> Result<usize, PersistenceError> {
            Err(PersistenceError::transient("record_failure", "unreachable"))
        }

        async fn failure_count(
            &self,
            _provider: &str,
            _now: Timestamp,
            _window: Duration,
        ) -> Result<usize, PersistenceError> {
            Err(PersistenceError::transient("failure_count", "unreachable"))
        }

        async fn clear(&self, _provider: &str) -> Result<(), PersistenceError> {
            Err(PersistenceError::transient("clear", "unreachable"))
        }
    }

    #[tokio::test]
    async fn test_store_outage_keeps_circuit_closed() {
        let breaker = CircuitBreaker::default().with_store(Arc::new(BrokenStore));
        breaker.record_failure("wav2lip").await;
        breaker.reset("wav2lip").await;
        assert!(!breaker.is_open("wav2lip").await);
    }
}
