//! Wired-up test fixtures.

use crate::config::{BreakerConfig, CoordinatorConfig, SelectorConfig};
use crate::core::Tier;
use crate::errors::MediaflowError;
use crate::events::CollectingEventSink;
use crate::ledger::{Job, StageTemplate};
use crate::pipeline::PipelineCoordinator;
use crate::policy::TierPolicyTable;
use crate::resilience::{CircuitBreaker, FallbackSelector, InMemoryHealthStore};
use crate::store::InMemoryJobStore;
use crate::utils::ManualClock;
use std::sync::Arc;

/// In-memory coordinator, breaker and selector sharing one manual clock and
/// one collecting event sink.
#[derive(Debug, Clone)]
pub struct TestHarness {
    /// Job and ledger rows.
    pub store: Arc<InMemoryJobStore>,
    /// Shared time source.
    pub clock: Arc<ManualClock>,
    /// Every emitted event.
    pub events: Arc<CollectingEventSink>,
    /// Coordinator over `store`.
    pub coordinator: Arc<PipelineCoordinator>,
    /// Breaker over an in-memory health store.
    pub breaker: Arc<CircuitBreaker>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl TestHarness {
    /// Creates a harness with the given coordinator settings.
    #[must_use]
    pub fn new(config: CoordinatorConfig) -> Self {
        let store = Arc::new(InMemoryJobStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let events = Arc::new(CollectingEventSink::new());
        let coordinator = Arc::new(
            PipelineCoordinator::new(store.clone(), config)
                .with_clock(clock.clone())
                .with_events(events.clone()),
        );
        let breaker = Arc::new(
            CircuitBreaker::new(BreakerConfig::default())
                .with_store(Arc::new(InMemoryHealthStore::new()))
                .with_clock(clock.clone()),
        );
        Self {
            store,
            clock,
            events,
            coordinator,
            breaker,
        }
    }

    /// A selector over `policies` with a 1ms backoff base.
    #[must_use]
    pub fn selector(&self, policies: TierPolicyTable) -> FallbackSelector {
        FallbackSelector::new(
            Arc::new(policies),
            self.breaker.clone(),
            SelectorConfig::default().with_backoff_base_ms(1),
        )
        .with_events(self.events.clone())
    }

    /// Creates and initializes a job.
    pub async fn job(&self, tier: Tier, template: &StageTemplate) -> Result<Job, MediaflowError> {
        let job = self.coordinator.create_job("test-user", tier).await?;
        self.coordinator.initialize(job.id, template).await
    }
}
