//! Read-only progress report.

use crate::core::{JobStatus, StepName, StepStatus};
use crate::ledger::{Job, PipelineState, PipelineStepRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate view of a job's ledger for progress polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatusReport {
    /// The job id.
    pub job_id: Uuid,
    /// Derived aggregate status.
    pub status: JobStatus,
    /// Completed steps.
    pub completed: usize,
    /// Failed steps.
    pub failed: usize,
    /// Skipped steps.
    pub skipped: usize,
    /// Ledger rows.
    pub total: usize,
    /// Settled steps as a percentage of the ledger, 0 to 100.
    pub percentage: f64,
    /// Step most recently started.
    pub current_step: Option<StepName>,
    /// Resume cursor.
    pub next_step: Option<StepName>,
    /// Whether a retry action may re-invoke the failed step.
    pub can_resume: bool,
    /// Step to resume from after a failure.
    pub failed_at_step: Option<StepName>,
    /// Raw ledger rows in template order.
    pub steps: Vec<PipelineStepRecord>,
    /// Raw pipeline state of the job row.
    pub pipeline_state: Option<PipelineState>,
}

impl PipelineStatusReport {
    pub(crate) fn build(job: &Job, steps: Vec<PipelineStepRecord>) -> Self {
        let count = |status: StepStatus| steps.iter().filter(|s| s.status == status).count();
        let completed = count(StepStatus::Completed);
        let failed = count(StepStatus::Failed);
        let skipped = count(StepStatus::Skipped);
        let total = steps.len();

        #[allow(clippy::cast_precision_loss)]
        let percentage = if total == 0 {
            0.0
        } else {
            ((completed + skipped) as f64 / total as f64 * 1000.0).round() / 10.0
        };

        Self {
            job_id: job.id,
            status: job.status,
            completed,
            failed,
            skipped,
            total,
            percentage,
            current_step: job.pipeline_state.as_ref().and_then(|s| s.current_step),
            next_step: super::next_actionable(&steps),
            can_resume: job.can_resume,
            failed_at_step: job.failed_at_step,
            steps,
            pipeline_state: job.pipeline_state.clone(),
        }
    }

    /// Returns true once every step is completed or skipped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.total > 0 && self.completed + self.skipped == self.total
    }
}
