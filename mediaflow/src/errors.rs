//! Error types for the mediaflow pipeline core.
//!
//! Provider failures are absorbed by the fallback selector and only surface
//! once every candidate is exhausted. Persistence failures propagate to the
//! queue worker untouched, after the bounded retry in
//! [`crate::store::RetryingStore`].

use crate::core::{Capability, ProviderStatus, StepName, StepStatus, Tier};
use crate::resilience::{AttemptOutcome, AttemptRecord};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// The main error type for mediaflow operations.
#[derive(Debug, Error)]
pub enum MediaflowError {
    /// A single provider invocation failed.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// Provider selection could not produce a result.
    #[error("{0}")]
    Selection(#[from] SelectionError),

    /// A step was advanced out of template order.
    #[error("{0}")]
    StepOrder(#[from] StepOrderError),

    /// The row store failed.
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// The stage template is malformed.
    #[error("{0}")]
    Template(#[from] TemplateError),

    /// No job row exists for the id.
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// The job has no ledger row for the step.
    #[error("Step '{step}' not found for job {job_id}")]
    StepNotFound {
        /// The job id.
        job_id: Uuid,
        /// The missing step.
        step: StepName,
    },

    /// Ledger rows already exist for the job.
    #[error("Pipeline already initialized for job {0}")]
    AlreadyInitialized(Uuid),

    /// The job has no ledger rows yet.
    #[error("Pipeline not initialized for job {0}")]
    NotInitialized(Uuid),

    /// Another worker claimed the step first.
    #[error("Step '{step}' of job {job_id} is no longer claimable (status: {status})")]
    ClaimConflict {
        /// The job id.
        job_id: Uuid,
        /// The contested step.
        step: StepName,
        /// Status observed after the failed claim.
        status: StepStatus,
    },

    /// The requested status change is not an edge of the step state machine.
    #[error("Invalid transition for step '{step}' of job {job_id}: {from} -> {to}")]
    InvalidTransition {
        /// The job id.
        job_id: Uuid,
        /// The step.
        step: StepName,
        /// Current status.
        from: StepStatus,
        /// Requested status.
        to: StepStatus,
    },

    /// The job failed past its retry policy and cannot be reset.
    #[error("Job {job_id} exhausted its retry budget at step '{step}'")]
    RetryBudgetExhausted {
        /// The job id.
        job_id: Uuid,
        /// The step that failed last.
        step: StepName,
    },

    /// Tier policy could not be loaded or is inconsistent.
    #[error("Policy error: {0}")]
    Policy(String),

    /// No handler is registered for a step.
    #[error("No stage handler registered for step '{0}'")]
    MissingHandler(StepName),

    /// A stage handler failed outside provider selection.
    #[error("Stage execution error: {0}")]
    Stage(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MediaflowError {
    /// Returns true if the error should be recorded against the step ledger
    /// rather than bubbled to the queue for redelivery.
    #[must_use]
    pub fn is_step_failure(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Selection(_) | Self::Stage(_) | Self::Serialization(_)
        )
    }
}

/// One provider invocation failed or returned an error status.
#[derive(Debug, Clone, Error)]
#[error("Provider '{provider}' failed: {message}")]
pub struct ProviderError {
    /// The provider id.
    pub provider: String,
    /// Error detail.
    pub message: String,
    /// Whether retrying the same provider could help.
    pub retryable: bool,
}

impl ProviderError {
    /// Creates a provider error.
    #[must_use]
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Marks the error as retryable.
    #[must_use]
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

/// Every candidate either failed or was skipped by its circuit breaker.
#[derive(Debug, Clone)]
pub struct ExhaustionError {
    /// Capability requested, when resolved from a tier policy.
    pub capability: Option<Capability>,
    /// Tier requested, when resolved from a tier policy.
    pub tier: Option<Tier>,
    /// Full attempt trail in candidate order.
    pub attempts: Vec<AttemptRecord>,
    /// Error of the last attempted candidate.
    pub last_error: Option<String>,
}

impl ExhaustionError {
    /// Exhaustion is always reported with an error status.
    #[must_use]
    pub fn status(&self) -> ProviderStatus {
        ProviderStatus::Error
    }

    /// Number of candidates actually invoked.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.outcome != AttemptOutcome::Skipped)
            .count()
    }

    /// Number of candidates skipped because their breaker was open.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.attempts.len() - self.attempted()
    }

    /// Converts to a JSON payload suitable for the job error column.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status(),
            "capability": self.capability,
            "tier": self.tier,
            "error": self.last_error,
            "attempts": self.attempts,
        })
    }
}

impl fmt::Display for ExhaustionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "All providers exhausted")?;
        if let (Some(capability), Some(tier)) = (self.capability, self.tier) {
            write!(f, " for {capability}/{tier}")?;
        }
        write!(
            f,
            " ({} attempted, {} skipped)",
            self.attempted(),
            self.skipped()
        )?;
        match self.last_error {
            Some(ref err) => write!(f, ": {err}"),
            None => write!(f, ": every candidate circuit is open"),
        }
    }
}

impl std::error::Error for ExhaustionError {}

/// Provider selection failure.
#[derive(Debug, Clone, Error)]
pub enum SelectionError {
    /// Every candidate failed or was skipped.
    #[error("{0}")]
    Exhausted(#[from] ExhaustionError),

    /// No policy entry and no caller default exists.
    #[error("No tier policy for {capability}/{tier} and no default providers configured")]
    PolicyMissing {
        /// The capability.
        capability: Capability,
        /// The tier.
        tier: Tier,
    },

    /// The candidate list was empty.
    #[error("No provider candidates to try")]
    NoCandidates,
}

impl SelectionError {
    /// Returns the attempt trail, if any candidates were considered.
    #[must_use]
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Self::Exhausted(err) => &err.attempts,
            Self::PolicyMissing { .. } | Self::NoCandidates => &[],
        }
    }
}

/// A step was advanced while it was not the coordinator's next step.
#[derive(Debug, Clone, Error)]
#[error(
    "Step '{requested}' of job {job_id} is not actionable; next step is {}",
    .expected.map_or_else(|| "none".to_string(), |s| format!("'{s}'"))
)]
pub struct StepOrderError {
    /// The job id.
    pub job_id: Uuid,
    /// The step that was requested.
    pub requested: StepName,
    /// The step the resume cursor points at.
    pub expected: Option<StepName>,
}

/// The row store failed.
#[derive(Debug, Clone, Error)]
#[error("Persistence error during {operation}: {message}")]
pub struct PersistenceError {
    /// The store operation that failed.
    pub operation: String,
    /// Error detail.
    pub message: String,
    /// Whether a retry may succeed.
    pub transient: bool,
}

impl PersistenceError {
    /// Creates a transient persistence error.
    #[must_use]
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            transient: true,
        }
    }

    /// Creates a permanent persistence error.
    #[must_use]
    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            transient: false,
        }
    }
}

/// The stage template is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template has no steps.
    #[error("Stage template v{version} has no steps")]
    Empty {
        /// Template version.
        version: u32,
    },

    /// A step appears more than once.
    #[error("Stage template v{version} lists step '{step}' more than once")]
    DuplicateStep {
        /// Template version.
        version: u32,
        /// The repeated step.
        step: StepName,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(provider: &str, outcome: AttemptOutcome) -> AttemptRecord {
        AttemptRecord {
            provider: provider.to_string(),
            slot: crate::core::CandidateSlot::Primary,
            outcome,
            error: None,
        }
    }

    #[test]
    fn test_exhaustion_error_counts() {
        let err = ExhaustionError {
            capability: Some(Capability::Image),
            tier: Some(Tier::Free),
            attempts: vec![
                attempt("a", AttemptOutcome::Skipped),
                attempt("b", AttemptOutcome::Failed),
                attempt("c", AttemptOutcome::Failed),
            ],
            last_error: Some("timeout".to_string()),
        };

        assert_eq!(err.attempted(), 2);
        assert_eq!(err.skipped(), 1);
        assert_eq!(err.status(), ProviderStatus::Error);
        let msg = err.to_string();
        assert!(msg.contains("image/free"));
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn test_exhaustion_error_all_skipped_message() {
        let err = ExhaustionError {
            capability: None,
            tier: None,
            attempts: vec![attempt("a", AttemptOutcome::Skipped)],
            last_error: None,
        };
        assert!(err.to_string().contains("circuit is open"));
        assert_eq!(err.to_json()["status"], "error");
    }

    #[test]
    fn test_step_order_error_message() {
        let err = StepOrderError {
            job_id: Uuid::nil(),
            requested: StepName::LipSync,
            expected: Some(StepName::Video),
        };
        assert!(err.to_string().contains("next step is 'video'"));

        let done = StepOrderError {
            expected: None,
            ..err
        };
        assert!(done.to_string().ends_with("none"));
    }

    #[test]
    fn test_step_failure_classification() {
        let provider: MediaflowError = ProviderError::new("p", "boom").into();
        assert!(provider.is_step_failure());

        let persistence: MediaflowError = PersistenceError::transient("update_job", "down").into();
        assert!(!persistence.is_step_failure());
    }
}
