//! The step state machine driver.

use super::{next_actionable, PipelineStatusReport};
use crate::config::CoordinatorConfig;
use crate::core::{JobStatus, StepName, StepStatus, Tier};
use crate::errors::{MediaflowError, StepOrderError};
use crate::events::{EventKind, EventSink, NoOpEventSink, PipelineEvent};
use crate::ledger::{Job, PipelinePhase, PipelineState, PipelineStepRecord, StageTemplate, StepData};
use crate::store::JobStore;
use crate::utils::{Clock, SystemClock, Timestamp};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Drives per-job step sequencing over a [`JobStore`].
///
/// Every transition is read-modify-write on the ledger row followed by a
/// rewrite of the job row, whose status and pipeline state are always
/// recomputed from the ledger. Only [`JobStore::claim_step`] is relied on
/// for atomicity.
#[derive(Clone)]
pub struct PipelineCoordinator {
    store: Arc<dyn JobStore>,
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PipelineCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCoordinator")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

fn phase_for(steps: &[PipelineStepRecord]) -> PipelinePhase {
    if !steps.is_empty() && steps.iter().all(|s| s.status.is_settled()) {
        PipelinePhase::Completed
    } else if steps.iter().any(|s| s.status == StepStatus::Failed) {
        PipelinePhase::Failed
    } else if steps
        .iter()
        .all(|s| s.status == StepStatus::Pending && s.retry_count == 0)
    {
        PipelinePhase::Initialized
    } else {
        PipelinePhase::Running
    }
}

/// Rewrites the ledger-derived fields of the job row.
///
/// Outputs of completed rows are copied back so a lost job-row write is
/// repaired by the next transition.
fn refresh(job: &mut Job, steps: &[PipelineStepRecord], now: Timestamp) {
    job.status = JobStatus::derive(steps);
    for row in steps.iter().filter(|s| s.status == StepStatus::Completed) {
        if let Some(ref data) = row.step_data {
            job.outputs.insert(row.step, data.clone());
        }
    }
    if let Some(ref mut state) = job.pipeline_state {
        state.phase = phase_for(steps);
        state.steps_completed = steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        state.total_steps = steps.len();
    }
    job.updated_at = now;
}

impl PipelineCoordinator {
    /// Creates a coordinator over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, config: CoordinatorConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Uses a custom clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sends transition events to `sink`.
    #[must_use]
    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Creates and persists a job row.
    pub async fn create_job(
        &self,
        owner: impl Into<String> + Send,
        tier: Tier,
    ) -> Result<Job, MediaflowError> {
        let now = self.clock.now();
        let mut job = Job::new(owner, tier);
        job.created_at = now;
        job.updated_at = now;
        self.store.insert_job(job.clone()).await?;
        debug!(job_id = %job.id, %tier, "Created job");
        Ok(job)
    }

    /// Loads a job row.
    pub async fn job(&self, job_id: Uuid) -> Result<Job, MediaflowError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or(MediaflowError::JobNotFound(job_id))
    }

    /// Loads the ledger of an initialized job.
    pub async fn steps(&self, job_id: Uuid) -> Result<Vec<PipelineStepRecord>, MediaflowError> {
        let steps = self.store.get_steps(job_id).await?;
        if steps.is_empty() {
            return Err(MediaflowError::NotInitialized(job_id));
        }
        Ok(steps)
    }

    async fn step(&self, job_id: Uuid, step: StepName) -> Result<PipelineStepRecord, MediaflowError> {
        self.store
            .get_step(job_id, step)
            .await?
            .ok_or(MediaflowError::StepNotFound { job_id, step })
    }

    /// Creates one ledger row per template step and marks the job resumable.
    ///
    /// Fails with [`MediaflowError::AlreadyInitialized`] once the job row is
    /// initialized. Rows left behind by an initialization whose job-row write
    /// failed are adopted when they match `template`.
    pub async fn initialize(
        &self,
        job_id: Uuid,
        template: &StageTemplate,
    ) -> Result<Job, MediaflowError> {
        template.validate()?;
        let mut job = self.job(job_id).await?;
        if job.is_initialized() {
            return Err(MediaflowError::AlreadyInitialized(job_id));
        }

        let rows: Vec<PipelineStepRecord> = template
            .steps()
            .iter()
            .zip(1u32..)
            .map(|(step, order)| PipelineStepRecord::new(job_id, *step, order))
            .collect();
        let now = self.clock.now();
        let mut state = PipelineState::initialized(template);
        if self.store.insert_steps(job_id, rows).await? {
            job.pipeline_state = Some(state);
            job.status = JobStatus::Pending;
            job.updated_at = now;
        } else {
            let existing = self.store.get_steps(job_id).await?;
            let steps: Vec<StepName> = existing.iter().map(|s| s.step).collect();
            if steps != template.steps() {
                warn!(job_id = %job_id, "Ledger rows already exist; refusing to initialize twice");
                return Err(MediaflowError::AlreadyInitialized(job_id));
            }
            warn!(job_id = %job_id, "Adopting ledger rows from an interrupted initialization");
            state.current_step = next_actionable(&existing).or(state.current_step);
            job.pipeline_state = Some(state);
            refresh(&mut job, &existing, now);
        }
        job.can_resume = true;
        self.store.update_job(job.clone()).await?;

        info!(
            job_id = %job_id,
            template_version = template.version(),
            total_steps = template.len(),
            "Pipeline initialized"
        );
        self.events
            .emit(
                PipelineEvent::new(EventKind::PipelineInitialized)
                    .with_job(job_id)
                    .with_data(serde_json::json!({
                        "template_version": template.version(),
                        "steps": template.steps(),
                    })),
            )
            .await;
        Ok(job)
    }

    /// First step in template order that may run, or `None` when every step
    /// is settled or an earlier step is still processing.
    pub async fn next_step(&self, job_id: Uuid) -> Result<Option<StepName>, MediaflowError> {
        Ok(next_actionable(&self.steps(job_id).await?))
    }

    /// Returns true if `step` is pending or failed.
    pub async fn can_resume_from(&self, job_id: Uuid, step: StepName) -> Result<bool, MediaflowError> {
        Ok(self.step(job_id, step).await?.status.is_actionable())
    }

    /// Claims `step` for this worker: `pending | failed -> processing`.
    ///
    /// Loses to concurrent claimers with [`MediaflowError::ClaimConflict`].
    pub async fn mark_step_started(
        &self,
        job_id: Uuid,
        step: StepName,
    ) -> Result<PipelineStepRecord, MediaflowError> {
        if self.config.enforce_step_order {
            let expected = next_actionable(&self.steps(job_id).await?);
            if expected != Some(step) {
                return Err(StepOrderError {
                    job_id,
                    requested: step,
                    expected,
                }
                .into());
            }
        }

        let now = self.clock.now();
        let Some(claimed) = self.store.claim_step(job_id, step, now).await? else {
            let current = self.step(job_id, step).await?;
            warn!(job_id = %job_id, %step, status = %current.status, "Step claim lost");
            return Err(MediaflowError::ClaimConflict {
                job_id,
                step,
                status: current.status,
            });
        };

        let mut job = self.job(job_id).await?;
        let steps = self.steps(job_id).await?;
        if let Some(ref mut state) = job.pipeline_state {
            state.current_step = Some(step);
        }
        refresh(&mut job, &steps, now);
        self.store.update_job(job).await?;

        info!(job_id = %job_id, %step, attempt = claimed.retry_count + 1, "Step started");
        self.events
            .emit(PipelineEvent::for_step(EventKind::StepStarted, job_id, step))
            .await;
        Ok(claimed)
    }

    /// Records a successful step and its output.
    pub async fn mark_step_completed(
        &self,
        job_id: Uuid,
        step: StepName,
        data: Option<StepData>,
    ) -> Result<Job, MediaflowError> {
        let now = self.clock.now();
        let mut record = self.step(job_id, step).await?;
        record.complete(now, data)?;
        self.store.update_step(record).await?;

        let mut job = self.job(job_id).await?;
        let steps = self.steps(job_id).await?;
        job.failed_at_step = None;
        job.error = None;
        refresh(&mut job, &steps, now);
        let finished = job.status == JobStatus::Completed;
        if finished {
            job.can_resume = false;
        }
        self.store.update_job(job.clone()).await?;

        info!(job_id = %job_id, %step, "Step completed");
        self.events
            .emit(PipelineEvent::for_step(EventKind::StepCompleted, job_id, step))
            .await;
        if finished {
            self.pipeline_completed(&job).await;
        }
        Ok(job)
    }

    /// Records a failed step attempt and where to resume.
    ///
    /// The job stays resumable while the step's failure count is within the
    /// retry policy; past it the job is terminally failed.
    pub async fn mark_step_failed(
        &self,
        job_id: Uuid,
        step: StepName,
        err: impl Into<String> + Send,
    ) -> Result<Job, MediaflowError> {
        let err = err.into();
        let now = self.clock.now();
        let mut record = self.step(job_id, step).await?;
        record.fail(err.clone())?;
        let step_retries = record.retry_count;
        self.store.update_step(record).await?;

        let mut job = self.job(job_id).await?;
        let steps = self.steps(job_id).await?;
        refresh(&mut job, &steps, now);
        job.status = JobStatus::Failed;
        job.failed_at_step = Some(step);
        job.error = Some(err.clone());
        job.retry_count += 1;
        job.can_resume = self.config.step_retry.allows(step_retries);
        if let Some(ref mut state) = job.pipeline_state {
            state.current_step = Some(step);
            state.phase = PipelinePhase::Failed;
        }
        self.store.update_job(job.clone()).await?;

        if job.can_resume {
            warn!(
                job_id = %job_id,
                %step,
                retry_count = step_retries,
                error = %err,
                "Step failed; job is resumable"
            );
        } else {
            error!(
                job_id = %job_id,
                %step,
                retry_count = step_retries,
                max_step_retries = self.config.step_retry.max_step_retries,
                error = %err,
                "Step failed; retry budget exhausted"
            );
        }
        self.events
            .emit(
                PipelineEvent::for_step(EventKind::StepFailed, job_id, step).with_data(
                    serde_json::json!({
                        "error": err,
                        "retry_count": step_retries,
                        "can_resume": job.can_resume,
                    }),
                ),
            )
            .await;
        Ok(job)
    }

    /// Marks a pending or failed step as skipped.
    pub async fn mark_step_skipped(&self, job_id: Uuid, step: StepName) -> Result<Job, MediaflowError> {
        let now = self.clock.now();
        let mut record = self.step(job_id, step).await?;
        record.skip(now)?;
        self.store.update_step(record).await?;

        let mut job = self.job(job_id).await?;
        let steps = self.steps(job_id).await?;
        if job.failed_at_step == Some(step) {
            job.failed_at_step = None;
            job.error = None;
        }
        refresh(&mut job, &steps, now);
        let finished = job.status == JobStatus::Completed;
        if finished {
            job.can_resume = false;
        }
        self.store.update_job(job.clone()).await?;

        info!(job_id = %job_id, %step, "Step skipped");
        self.events
            .emit(PipelineEvent::for_step(EventKind::StepSkipped, job_id, step))
            .await;
        if finished {
            self.pipeline_completed(&job).await;
        }
        Ok(job)
    }

    /// Puts a failed (or orphaned processing) step back to pending.
    ///
    /// The step's `retry_count` is kept. A job whose retry budget is spent
    /// stays failed and is refused with
    /// [`MediaflowError::RetryBudgetExhausted`].
    pub async fn reset_for_retry(
        &self,
        job_id: Uuid,
        step: StepName,
    ) -> Result<PipelineStepRecord, MediaflowError> {
        let now = self.clock.now();
        let mut job = self.job(job_id).await?;
        if job.status == JobStatus::Failed && !job.can_resume {
            warn!(job_id = %job_id, %step, "Refusing reset; retry budget exhausted");
            return Err(MediaflowError::RetryBudgetExhausted { job_id, step });
        }
        let mut record = self.step(job_id, step).await?;
        record.reset()?;
        self.store.update_step(record.clone()).await?;

        let steps = self.steps(job_id).await?;
        refresh(&mut job, &steps, now);
        if let Some(ref mut state) = job.pipeline_state {
            state.current_step = Some(step);
        }
        self.store.update_job(job).await?;

        info!(job_id = %job_id, %step, retry_count = record.retry_count, "Step reset for retry");
        self.events
            .emit(PipelineEvent::for_step(EventKind::StepReset, job_id, step))
            .await;
        Ok(record)
    }

    /// Progress report for polling endpoints.
    pub async fn status(&self, job_id: Uuid) -> Result<PipelineStatusReport, MediaflowError> {
        let job = self.job(job_id).await?;
        let steps = self.store.get_steps(job_id).await?;
        Ok(PipelineStatusReport::build(&job, steps))
    }

    async fn pipeline_completed(&self, job: &Job) {
        info!(job_id = %job.id, outputs = job.outputs.len(), "Pipeline completed");
        self.events
            .emit(PipelineEvent::new(EventKind::PipelineCompleted).with_job(job.id))
            .await;
    }
}
