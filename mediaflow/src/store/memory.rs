//! In-memory job store.

use super::JobStore;
use crate::core::StepName;
use crate::errors::PersistenceError;
use crate::ledger::{Job, PipelineStepRecord};
use crate::utils::Timestamp;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A process-local [`JobStore`].
///
/// Each call takes the relevant lock once, so `claim_step` and
/// `insert_steps` are atomic with respect to other callers.
#[derive(Debug, Default, Clone)]
pub struct InMemoryJobStore {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
    steps: Arc<Mutex<HashMap<Uuid, Vec<PipelineStepRecord>>>>,
}

impl InMemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of job rows.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Number of ledger rows across all jobs.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.lock().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_job(&self, job: Job) -> Result<(), PersistenceError> {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&job.id) {
            return Err(PersistenceError::permanent(
                "insert_job",
                format!("job {} already exists", job.id),
            ));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, PersistenceError> {
        Ok(self.jobs.lock().get(&job_id).cloned())
    }

    async fn update_job(&self, job: Job) -> Result<(), PersistenceError> {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(&job.id) {
            Some(row) => {
                *row = job;
                Ok(())
            }
            None => Err(PersistenceError::permanent(
                "update_job",
                format!("job {} does not exist", job.id),
            )),
        }
    }

    async fn insert_steps(
        &self,
        job_id: Uuid,
        mut steps: Vec<PipelineStepRecord>,
    ) -> Result<bool, PersistenceError> {
        let mut ledger = self.steps.lock();
        if ledger.get(&job_id).is_some_and(|rows| !rows.is_empty()) {
            return Ok(false);
        }
        steps.sort_by_key(|s| s.step_order);
        ledger.insert(job_id, steps);
        Ok(true)
    }

    async fn get_steps(&self, job_id: Uuid) -> Result<Vec<PipelineStepRecord>, PersistenceError> {
        Ok(self.steps.lock().get(&job_id).cloned().unwrap_or_default())
    }

    async fn get_step(
        &self,
        job_id: Uuid,
        step: StepName,
    ) -> Result<Option<PipelineStepRecord>, PersistenceError> {
        Ok(self
            .steps
            .lock()
            .get(&job_id)
            .and_then(|rows| rows.iter().find(|r| r.step == step).cloned()))
    }

    async fn update_step(&self, record: PipelineStepRecord) -> Result<(), PersistenceError> {
        let mut ledger = self.steps.lock();
        let row = ledger
            .get_mut(&record.job_id)
            .and_then(|rows| rows.iter_mut().find(|r| r.step == record.step))
            .ok_or_else(|| {
                PersistenceError::permanent(
                    "update_step",
                    format!("no '{}' row for job {}", record.step, record.job_id),
                )
            })?;
        *row = record;
        Ok(())
    }

    async fn claim_step(
        &self,
        job_id: Uuid,
        step: StepName,
        at: Timestamp,
    ) -> Result<Option<PipelineStepRecord>, PersistenceError> {
        let mut ledger = self.steps.lock();
        let Some(row) = ledger
            .get_mut(&job_id)
            .and_then(|rows| rows.iter_mut().find(|r| r.step == step))
        else {
            return Ok(None);
        };

        if row.start(at).is_err() {
            return Ok(None);
        }
        Ok(Some(row.clone()))
    }
}
