//! Shared provider health state.

use crate::errors::PersistenceError;
use crate::utils::Timestamp;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::time::Duration;

/// Failure timestamps per provider, shared by every worker.
///
/// Implementations must make `record_failure` atomic per provider so
/// concurrent workers never lose a failure.
#[async_trait]
pub trait HealthStore: Send + Sync + Debug {
    /// Appends a failure and returns the count still inside `window`.
    async fn record_failure(
        &self,
        provider: &str,
        at: Timestamp,
        window: Duration,
    ) -> Result<usize, PersistenceError>;

    /// Counts failures inside `window` as of `now`.
    async fn failure_count(
        &self,
        provider: &str,
        now: Timestamp,
        window: Duration,
    ) -> Result<usize, PersistenceError>;

    /// Forgets every failure of the provider.
    async fn clear(&self, provider: &str) -> Result<(), PersistenceError>;
}

/// Process-local [`HealthStore`].
#[derive(Debug, Default)]
pub struct InMemoryHealthStore {
    failures: DashMap<String, VecDeque<Timestamp>>,
}

impl InMemoryHealthStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of providers with tracked failures.
    #[must_use]
    pub fn tracked_providers(&self) -> usize {
        self.failures.len()
    }
}

fn prune(entries: &mut VecDeque<Timestamp>, now: Timestamp, window: Duration) {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
    while let Some(oldest) = entries.front() {
        if now.signed_duration_since(*oldest) >= window {
            entries.pop_front();
        } else {
            break;
        }
    }
}

#[async_trait]
impl HealthStore for InMemoryHealthStore {
    async fn record_failure(
        &self,
        provider: &str,
        at: Timestamp,
        window: Duration,
    ) -> Result<usize, PersistenceError> {
        let mut entries = self.failures.entry(provider.to_string()).or_default();
        entries.push_back(at);
        prune(&mut entries, at, window);
        Ok(entries.len())
    }

    async fn failure_count(
        &self,
        provider: &str,
        now: Timestamp,
        window: Duration,
    ) -> Result<usize, PersistenceError> {
        Ok(self.failures.get_mut(provider).map_or(0, |mut entries| {
            prune(&mut entries, now, window);
            entries.len()
        }))
    }

    async fn clear(&self, provider: &str) -> Result<(), PersistenceError> {
        self.failures.remove(provider);
        Ok(())
    }
}
