//! Mock providers and stages.

use crate::core::StepName;
use crate::errors::{MediaflowError, PersistenceError, ProviderError};
use crate::ledger::{Job, PipelineStepRecord, StepData};
use crate::pipeline::StageHandler;
use crate::providers::{GenerationProvider, ProviderRequest, ProviderResponse};
use crate::store::{InMemoryJobStore, JobStore};
use crate::utils::Timestamp;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use uuid::Uuid;

/// Replays scripted responses keyed by the provider id in the request.
///
/// Responses for one id are consumed in order; the last one repeats.
/// Ids without a script fail.
#[derive(Debug)]
pub struct ScriptedProvider {
    param_name: String,
    scripts: Mutex<HashMap<String, VecDeque<Result<ProviderResponse, String>>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    /// Creates a provider reading the id from `param_name`.
    #[must_use]
    pub fn new(param_name: impl Into<String>) -> Self {
        Self {
            param_name: param_name.into(),
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn push(self, id: &str, outcome: Result<ProviderResponse, String>) -> Self {
        self.scripts
            .lock()
            .entry(id.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Queues a response for `id`.
    #[must_use]
    pub fn respond(self, id: &str, response: ProviderResponse) -> Self {
        self.push(id, Ok(response))
    }

    /// Queues a success with one output url.
    #[must_use]
    pub fn succeed(self, id: &str, url: &str) -> Self {
        self.respond(id, ProviderResponse::success_url(url))
    }

    /// Queues a raised error.
    #[must_use]
    pub fn fail(self, id: &str, message: &str) -> Self {
        self.push(id, Err(message.to_string()))
    }

    /// Provider ids in invocation order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.get_str(&self.param_name).unwrap_or_default().to_string())
            .collect()
    }

    /// Every request received.
    #[must_use]
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().clone()
    }

    /// Number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let id = request.get_str(&self.param_name).unwrap_or_default().to_string();
        self.requests.lock().push(request);

        let outcome = {
            let mut scripts = self.scripts.lock();
            match scripts.get_mut(&id) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match outcome {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ProviderError::new(id, message)),
            None => Err(ProviderError::new(id, "no scripted response")),
        }
    }
}

/// A stage handler that always returns the same output.
#[derive(Debug)]
pub struct StaticStage {
    data: StepData,
    calls: Mutex<usize>,
}

impl StaticStage {
    /// Creates a stage returning `data`.
    #[must_use]
    pub fn new(data: StepData) -> Self {
        Self {
            data,
            calls: Mutex::new(0),
        }
    }

    /// Number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl StageHandler for StaticStage {
    async fn run(&self, _job: &Job, _step: StepName) -> Result<StepData, MediaflowError> {
        *self.calls.lock() += 1;
        Ok(self.data.clone())
    }
}

/// A stage handler that always fails.
#[derive(Debug)]
pub struct FailingStage {
    message: String,
    calls: Mutex<usize>,
}

impl FailingStage {
    /// Creates a stage failing with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: Mutex::new(0),
        }
    }

    /// Number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl StageHandler for FailingStage {
    async fn run(&self, _job: &Job, _step: StepName) -> Result<StepData, MediaflowError> {
        *self.calls.lock() += 1;
        Err(MediaflowError::Stage(self.message.clone()))
    }
}

/// An [`InMemoryJobStore`] whose chosen `update_job` calls fail.
///
/// Calls are numbered from 1. Failed writes are not applied.
#[derive(Debug, Default)]
pub struct FlakyJobStore {
    inner: InMemoryJobStore,
    failing_updates: BTreeSet<usize>,
    update_calls: Mutex<usize>,
}

impl FlakyJobStore {
    /// Wraps an empty store with no failures scheduled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the `n`th `update_job` call with a permanent error.
    #[must_use]
    pub fn fail_update(mut self, n: usize) -> Self {
        self.failing_updates.insert(n);
        self
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &InMemoryJobStore {
        &self.inner
    }

    /// Number of `update_job` calls seen so far.
    #[must_use]
    pub fn update_calls(&self) -> usize {
        *self.update_calls.lock()
    }
}

#[async_trait]
impl JobStore for FlakyJobStore {
    async fn insert_job(&self, job: Job) -> Result<(), PersistenceError> {
        self.inner.insert_job(job).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, PersistenceError> {
        self.inner.get_job(job_id).await
    }

    async fn update_job(&self, job: Job) -> Result<(), PersistenceError> {
        let call = {
            let mut calls = self.update_calls.lock();
            *calls += 1;
            *calls
        };
        if self.failing_updates.contains(&call) {
            return Err(PersistenceError::permanent("update_job", "db down"));
        }
        self.inner.update_job(job).await
    }

    async fn insert_steps(
        &self,
        job_id: Uuid,
        steps: Vec<PipelineStepRecord>,
    ) -> Result<bool, PersistenceError> {
        self.inner.insert_steps(job_id, steps).await
    }

    async fn get_steps(&self, job_id: Uuid) -> Result<Vec<PipelineStepRecord>, PersistenceError> {
        self.inner.get_steps(job_id).await
    }

    async fn get_step(
        &self,
        job_id: Uuid,
        step: StepName,
    ) -> Result<Option<PipelineStepRecord>, PersistenceError> {
        self.inner.get_step(job_id, step).await
    }

    async fn update_step(&self, record: PipelineStepRecord) -> Result<(), PersistenceError> {
        self.inner.update_step(record).await
    }

    async fn claim_step(
        &self,
        job_id: Uuid,
        step: StepName,
        at: Timestamp,
    ) -> Result<Option<PipelineStepRecord>, PersistenceError> {
        self.inner.claim_step(job_id, step, at).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_replay_in_order() {
        let provider = ScriptedProvider::new("model")
            .fail("kling-v1", "HTTP 500")
            .succeed("kling-v1", "https://cdn/v.mp4");
        let request = || ProviderRequest::new().with_provider("model", "kling-v1");

        assert!(provider.generate(request()).await.is_err());
        assert!(provider.generate(request()).await.is_ok());
        assert!(provider.generate(request()).await.is_ok());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_unscripted_id_fails() {
        let provider = ScriptedProvider::new("model");
        let err = provider
            .generate(ProviderRequest::new().with_provider("model", "veo-3"))
            .await
            .unwrap_err();
        assert_eq!(err.provider, "veo-3");
        assert_eq!(provider.calls(), vec!["veo-3"]);
    }

    #[tokio::test]
    async fn test_flaky_store_fails_only_scheduled_update() {
        let store = FlakyJobStore::new().fail_update(2);
        let job = Job::new("user-1", crate::core::Tier::Free);
        store.insert_job(job.clone()).await.unwrap();

        assert!(store.update_job(job.clone()).await.is_ok());
        let err = store.update_job(job.clone()).await.unwrap_err();
        assert!(!err.transient);
        assert!(store.update_job(job).await.is_ok());
        assert_eq!(store.update_calls(), 3);
    }
}
