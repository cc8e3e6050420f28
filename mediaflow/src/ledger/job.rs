//! Job rows and pipeline state.

use super::{PipelineStepRecord, StageTemplate, StepData};
use crate::core::{JobStatus, StepName, StepStatus, Tier};
use crate::utils::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Coarse lifecycle of a job's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// Ledger rows exist, nothing has started.
    #[default]
    Initialized,
    /// At least one step has started.
    Running,
    /// The last transition was a failure.
    Failed,
    /// Every step is completed or skipped.
    Completed,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Running => write!(f, "running"),
            Self::Failed => write!(f, "failed"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Progress summary stored on the job row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Lifecycle phase.
    pub phase: PipelinePhase,
    /// Version of the template the ledger was created from.
    pub template_version: u32,
    /// Step most recently started, or the first step before anything ran.
    pub current_step: Option<StepName>,
    /// Number of completed steps.
    pub steps_completed: usize,
    /// Number of ledger rows.
    pub total_steps: usize,
}

impl PipelineState {
    /// State right after ledger creation.
    #[must_use]
    pub fn initialized(template: &StageTemplate) -> Self {
        Self {
            phase: PipelinePhase::Initialized,
            template_version: template.version(),
            current_step: template.steps().first().copied(),
            steps_completed: 0,
            total_steps: template.len(),
        }
    }
}

/// One content-generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job id.
    pub id: Uuid,
    /// Requesting user.
    pub owner: String,
    /// Subscription tier used for provider selection.
    pub tier: Tier,
    /// Aggregate status derived from the ledger.
    pub status: JobStatus,
    /// Whether a retry action may re-invoke the failed step.
    pub can_resume: bool,
    /// Number of step failures across the job's lifetime.
    pub retry_count: u32,
    /// Step to resume from after a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at_step: Option<StepName>,
    /// Human-readable error of the last failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Outputs of completed steps.
    #[serde(default)]
    pub outputs: BTreeMap<StepName, StepData>,
    /// Progress summary, present once initialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_state: Option<PipelineState>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
}

impl Job {
    /// Creates a fresh job for `owner` on `tier`.
    #[must_use]
    pub fn new(owner: impl Into<String>, tier: Tier) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            tier,
            status: JobStatus::Pending,
            can_resume: false,
            retry_count: 0,
            failed_at_step: None,
            error: None,
            outputs: BTreeMap::new(),
            pipeline_state: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true once ledger rows have been created.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.pipeline_state.is_some()
    }

    /// Output of a completed step, if any.
    #[must_use]
    pub fn output(&self, step: StepName) -> Option<&StepData> {
        self.outputs.get(&step)
    }
}

impl JobStatus {
    /// Derives the aggregate status from ledger rows.
    ///
    /// The furthest row that is not settled decides: a failure anywhere wins,
    /// then the latest processing step, then the latest completed step.
    #[must_use]
    pub fn derive(steps: &[PipelineStepRecord]) -> Self {
        if steps.is_empty() {
            return Self::Pending;
        }
        if steps.iter().all(|s| s.status.is_settled()) {
            return Self::Completed;
        }
        if steps.iter().any(|s| s.status == StepStatus::Failed) {
            return Self::Failed;
        }

        let furthest = |status: StepStatus| {
            steps
                .iter()
                .filter(|s| s.status == status)
                .max_by_key(|s| s.step_order)
                .map(|s| s.step)
        };

        if let Some(step) = furthest(StepStatus::Processing) {
            return Self::Processing(step);
        }
        if let Some(step) = furthest(StepStatus::Completed) {
            return Self::StepCompleted(step);
        }
        Self::Pending
    }
}
