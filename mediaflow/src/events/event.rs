//! Typed pipeline events.

use crate::core::StepName;
use crate::utils::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Ledger rows created.
    #[serde(rename = "pipeline.initialized")]
    PipelineInitialized,
    /// Last step completed.
    #[serde(rename = "pipeline.completed")]
    PipelineCompleted,
    /// A step was claimed.
    #[serde(rename = "step.started")]
    StepStarted,
    /// A step completed.
    #[serde(rename = "step.completed")]
    StepCompleted,
    /// A step failed.
    #[serde(rename = "step.failed")]
    StepFailed,
    /// A failed step was put back to pending.
    #[serde(rename = "step.reset")]
    StepReset,
    /// A step was skipped.
    #[serde(rename = "step.skipped")]
    StepSkipped,
    /// A candidate was passed over because its breaker is open.
    #[serde(rename = "provider.skipped")]
    ProviderSkipped,
    /// A candidate invocation failed.
    #[serde(rename = "provider.failed")]
    ProviderFailed,
    /// A candidate invocation succeeded.
    #[serde(rename = "provider.succeeded")]
    ProviderSucceeded,
    /// No candidate succeeded.
    #[serde(rename = "provider.exhausted")]
    ProviderExhausted,
}

impl EventKind {
    /// Dotted event name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PipelineInitialized => "pipeline.initialized",
            Self::PipelineCompleted => "pipeline.completed",
            Self::StepStarted => "step.started",
            Self::StepCompleted => "step.completed",
            Self::StepFailed => "step.failed",
            Self::StepReset => "step.reset",
            Self::StepSkipped => "step.skipped",
            Self::ProviderSkipped => "provider.skipped",
            Self::ProviderFailed => "provider.failed",
            Self::ProviderSucceeded => "provider.succeeded",
            Self::ProviderExhausted => "provider.exhausted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Event type.
    pub kind: EventKind,
    /// Job concerned, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    /// Step concerned, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepName>,
    /// Provider concerned, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Extra payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Emission time.
    pub at: Timestamp,
}

impl PipelineEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            job_id: None,
            step: None,
            provider: None,
            data: None,
            at: Utc::now(),
        }
    }

    /// Creates a step-scoped event.
    #[must_use]
    pub fn for_step(kind: EventKind, job_id: Uuid, step: StepName) -> Self {
        Self::new(kind).with_job(job_id).with_step(step)
    }

    /// Creates a provider-scoped event.
    #[must_use]
    pub fn for_provider(kind: EventKind, provider: impl Into<String>) -> Self {
        let mut event = Self::new(kind);
        event.provider = Some(provider.into());
        event
    }

    /// Sets the job.
    #[must_use]
    pub fn with_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Sets the step.
    #[must_use]
    pub fn with_step(mut self, step: StepName) -> Self {
        self.step = Some(step);
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
