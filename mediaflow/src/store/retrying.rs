//! Bounded retry around store calls.

use super::JobStore;
use crate::core::StepName;
use crate::errors::PersistenceError;
use crate::ledger::{Job, PipelineStepRecord};
use crate::resilience::{with_retry_if, RetryConfig};
use crate::utils::Timestamp;
use async_trait::async_trait;
use std::future::Future;
use uuid::Uuid;

/// A [`JobStore`] decorator that retries transient [`PersistenceError`]s.
///
/// Permanent errors and the final transient error propagate unchanged.
#[derive(Debug, Clone)]
pub struct RetryingStore<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: JobStore> RetryingStore<S> {
    /// Wraps `inner` with the given retry policy.
    #[must_use]
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn run<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, PersistenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PersistenceError>>,
    {
        let result = with_retry_if(&self.config, operation, call, |e| e.transient).await;
        if let Err(ref e) = result {
            tracing::warn!(operation, transient = e.transient, error = %e, "Store call failed");
        }
        result
    }
}

#[async_trait]
impl<S: JobStore> JobStore for RetryingStore<S> {
    async fn insert_job(&self, job: Job) -> Result<(), PersistenceError> {
        self.run("insert_job", || self.inner.insert_job(job.clone())).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, PersistenceError> {
        self.run("get_job", || self.inner.get_job(job_id)).await
    }

    async fn update_job(&self, job: Job) -> Result<(), PersistenceError> {
        self.run("update_job", || self.inner.update_job(job.clone())).await
    }

    async fn insert_steps(
        &self,
        job_id: Uuid,
        steps: Vec<PipelineStepRecord>,
    ) -> Result<bool, PersistenceError> {
        self.run("insert_steps", || self.inner.insert_steps(job_id, steps.clone()))
            .await
    }

    async fn get_steps(&self, job_id: Uuid) -> Result<Vec<PipelineStepRecord>, PersistenceError> {
        self.run("get_steps", || self.inner.get_steps(job_id)).await
    }

    async fn get_step(
        &self,
        job_id: Uuid,
        step: StepName,
    ) -> Result<Option<PipelineStepRecord>, PersistenceError> {
        self.run("get_step", || self.inner.get_step(job_id, step)).await
    }

    async fn update_step(&self, record: PipelineStepRecord) -> Result<(), PersistenceError> {
        self.run("update_step", || self.inner.update_step(record.clone()))
            .await
    }

    async fn claim_step(
        &self,
        job_id: Uuid,
        step: StepName,
        at: Timestamp,
    ) -> Result<Option<PipelineStepRecord>, PersistenceError> {
        self.run("claim_step", || self.inner.claim_step(job_id, step, at))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Tier;
    use crate::resilience::JitterStrategy;
    use crate::store::MockJobStore;
    use mockall::Sequence;

    fn fast_retry() -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(3)
            .with_base_delay_ms(1)
            .with_jitter(JitterStrategy::None)
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let job = Job::new("owner", Tier::Free);
        let job_id = job.id;

        let mut mock = MockJobStore::new();
        let mut seq = Sequence::new();
        mock.expect_get_job()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(PersistenceError::transient("get_job", "connection reset")));
        mock.expect_get_job()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(job.clone())));

        let store = RetryingStore::new(mock, fast_retry());
        let loaded = store.get_job(job_id).await.unwrap();
        assert_eq!(loaded.map(|j| j.id), Some(job_id));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let mut mock = MockJobStore::new();
        mock.expect_update_step()
            .times(1)
            .returning(|_| Err(PersistenceError::permanent("update_step", "row missing")));

        let store = RetryingStore::new(mock, fast_retry());
        let record = PipelineStepRecord::new(Uuid::new_v4(), StepName::Video, 1);
        let err = store.update_step(record).await.unwrap_err();
        assert!(!err.transient);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let mut mock = MockJobStore::new();
        mock.expect_get_steps()
            .times(3)
            .returning(|_| Err(PersistenceError::transient("get_steps", "timeout")));

        let store = RetryingStore::new(mock, fast_retry());
        let err = store.get_steps(Uuid::new_v4()).await.unwrap_err();
        assert!(err.transient);
        assert_eq!(err.operation, "get_steps");
    }
}
