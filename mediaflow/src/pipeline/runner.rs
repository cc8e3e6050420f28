//! Queue-facing entry points.

use super::PipelineCoordinator;
use crate::core::{JobStatus, StepName, StepStatus};
use crate::errors::MediaflowError;
use crate::ledger::{Job, StageTemplate, StepData};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Executes one kind of step.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Produces the step's output for `job`.
    ///
    /// Errors for which [`MediaflowError::is_step_failure`] holds are recorded
    /// on the ledger; any other error propagates to the caller.
    async fn run(&self, job: &Job, step: StepName) -> Result<StepData, MediaflowError>;
}

/// What one [`StageRunner::advance`] call did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    /// The step completed; `next` is the step to enqueue, if any.
    Completed {
        /// The step that ran.
        step: StepName,
        /// Following step.
        next: Option<StepName>,
    },
    /// The step failed and was recorded on the ledger.
    Failed {
        /// The step that ran.
        step: StepName,
        /// Human-readable error.
        error: String,
        /// Whether the job may be retried from `step`.
        can_resume: bool,
    },
    /// Every step is completed or skipped.
    Finished,
}

impl AdvanceOutcome {
    /// Step the worker should enqueue next, if any.
    #[must_use]
    pub fn next_step(&self) -> Option<StepName> {
        match self {
            Self::Completed { next, .. } => *next,
            Self::Failed { .. } | Self::Finished => None,
        }
    }
}

/// Advances jobs one step per call.
///
/// The runner never enqueues work itself: the returned [`AdvanceOutcome`]
/// tells the worker what to chain next.
#[derive(Clone)]
pub struct StageRunner {
    coordinator: Arc<PipelineCoordinator>,
    template: StageTemplate,
    handlers: HashMap<StepName, Arc<dyn StageHandler>>,
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut steps: Vec<_> = self.handlers.keys().copied().collect();
        steps.sort();
        f.debug_struct("StageRunner")
            .field("template", &self.template)
            .field("handlers", &steps)
            .finish_non_exhaustive()
    }
}

impl StageRunner {
    /// Creates a runner that initializes fresh jobs from `template`.
    #[must_use]
    pub fn new(coordinator: Arc<PipelineCoordinator>, template: StageTemplate) -> Self {
        Self {
            coordinator,
            template,
            handlers: HashMap::new(),
        }
    }

    /// Registers the handler for `step`.
    #[must_use]
    pub fn with_handler(mut self, step: StepName, handler: Arc<dyn StageHandler>) -> Self {
        self.handlers.insert(step, handler);
        self
    }

    /// Registers one handler for several steps.
    #[must_use]
    pub fn with_handler_for(
        mut self,
        steps: impl IntoIterator<Item = StepName>,
        handler: Arc<dyn StageHandler>,
    ) -> Self {
        for step in steps {
            self.handlers.insert(step, handler.clone());
        }
        self
    }

    /// The coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &Arc<PipelineCoordinator> {
        &self.coordinator
    }

    /// Runs the next actionable step of `job_id`.
    ///
    /// Initializes the ledger on first call. A job whose retry budget is spent
    /// is reported as failed without invoking any handler.
    pub async fn advance(&self, job_id: Uuid) -> Result<AdvanceOutcome, MediaflowError> {
        let mut job = self.coordinator.job(job_id).await?;
        if !job.is_initialized() {
            job = self.coordinator.initialize(job_id, &self.template).await?;
        }

        if job.status == JobStatus::Failed && !job.can_resume {
            if let Some(step) = job.failed_at_step {
                warn!(job_id = %job_id, %step, "Job failed permanently; not advancing");
                return Ok(AdvanceOutcome::Failed {
                    step,
                    error: job.error.unwrap_or_default(),
                    can_resume: false,
                });
            }
        }

        let Some(step) = self.coordinator.next_step(job_id).await? else {
            let steps = self.coordinator.steps(job_id).await?;
            if let Some(busy) = steps.iter().find(|s| s.status == StepStatus::Processing) {
                return Err(MediaflowError::ClaimConflict {
                    job_id,
                    step: busy.step,
                    status: busy.status,
                });
            }
            debug!(job_id = %job_id, "Nothing left to run");
            return Ok(AdvanceOutcome::Finished);
        };

        let handler = self
            .handlers
            .get(&step)
            .cloned()
            .ok_or(MediaflowError::MissingHandler(step))?;

        self.coordinator.mark_step_started(job_id, step).await?;
        let job = self.coordinator.job(job_id).await?;

        match handler.run(&job, step).await {
            Ok(data) => {
                self.coordinator
                    .mark_step_completed(job_id, step, Some(data))
                    .await?;
                let next = self.coordinator.next_step(job_id).await?;
                Ok(AdvanceOutcome::Completed { step, next })
            }
            Err(e) if e.is_step_failure() => {
                let error = e.to_string();
                let job = self
                    .coordinator
                    .mark_step_failed(job_id, step, error.clone())
                    .await?;
                Ok(AdvanceOutcome::Failed {
                    step,
                    error,
                    can_resume: job.can_resume,
                })
            }
            Err(e) => {
                warn!(job_id = %job_id, %step, error = %e, "Stage aborted; step left processing");
                Err(e)
            }
        }
    }

    /// Advances until the job finishes or a step fails.
    pub async fn drive(&self, job_id: Uuid) -> Result<AdvanceOutcome, MediaflowError> {
        loop {
            let outcome = self.advance(job_id).await?;
            match outcome {
                AdvanceOutcome::Completed { next: Some(_), .. } => continue,
                AdvanceOutcome::Completed { next: None, .. } => {
                    let job = self.coordinator.job(job_id).await?;
                    if job.status == JobStatus::Completed {
                        return Ok(AdvanceOutcome::Finished);
                    }
                    return Ok(outcome);
                }
                AdvanceOutcome::Failed { .. } | AdvanceOutcome::Finished => return Ok(outcome),
            }
        }
    }

    /// Advances several jobs concurrently, one step each.
    pub async fn advance_all(
        &self,
        job_ids: impl IntoIterator<Item = Uuid>,
    ) -> Vec<(Uuid, Result<AdvanceOutcome, MediaflowError>)> {
        let mut pending: FuturesUnordered<_> = job_ids
            .into_iter()
            .map(|job_id| async move { (job_id, self.advance(job_id).await) })
            .collect();

        let mut results = Vec::new();
        while let Some(result) = pending.next().await {
            results.push(result);
        }
        info!(jobs = results.len(), "Advanced batch");
        results
    }
}
