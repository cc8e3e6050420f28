//! Step ledger rows.

use crate::core::{StepName, StepStatus};
use crate::errors::MediaflowError;
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Output reference produced by a completed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepData {
    /// Synthesized narration.
    Audio {
        /// Location of the audio file.
        url: String,
        /// Length in seconds, when reported.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<f64>,
        /// Provider that produced it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
    },
    /// One image per scene.
    Images {
        /// Image locations in scene order.
        urls: Vec<String>,
        /// Provider that produced them.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
    },
    /// Synthesized video.
    Video {
        /// Location of the video file.
        url: String,
        /// Length in seconds, when reported.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<f64>,
        /// Provider that produced it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
    },
    /// Audio and video merged into one file.
    Merge {
        /// Location of the merged file.
        url: String,
    },
    /// Lip-synced final video.
    LipSync {
        /// Location of the final file.
        url: String,
        /// Provider that produced it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
    },
    /// Provider accepted the work; the artifact arrives through polling.
    Pending {
        /// Provider holding the work.
        provider: String,
        /// Handle to poll for completion.
        polling_handle: String,
    },
}

impl StepData {
    /// The main artifact location, if the output is materialized.
    #[must_use]
    pub fn primary_url(&self) -> Option<&str> {
        match self {
            Self::Audio { url, .. }
            | Self::Video { url, .. }
            | Self::Merge { url }
            | Self::LipSync { url, .. } => Some(url),
            Self::Images { urls, .. } => urls.first().map(String::as_str),
            Self::Pending { .. } => None,
        }
    }

    /// Returns true if the artifact still has to be polled for.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

/// One row of a job's step ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStepRecord {
    /// Row id.
    pub id: Uuid,
    /// Owning job.
    pub job_id: Uuid,
    /// Which stage this row tracks.
    pub step: StepName,
    /// Position in the template, starting at 1.
    pub step_order: u32,
    /// Current status.
    pub status: StepStatus,
    /// When the latest attempt started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    /// When the step completed or was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    /// Number of recorded failures. Never decremented.
    pub retry_count: u32,
    /// Error of the latest failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stage output reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_data: Option<StepData>,
}

impl PipelineStepRecord {
    /// Creates a pending row.
    #[must_use]
    pub fn new(job_id: Uuid, step: StepName, step_order: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            step,
            step_order,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            error: None,
            step_data: None,
        }
    }

    fn invalid(&self, to: StepStatus) -> MediaflowError {
        MediaflowError::InvalidTransition {
            job_id: self.job_id,
            step: self.step,
            from: self.status,
            to,
        }
    }

    /// pending | failed -> processing
    pub fn start(&mut self, at: Timestamp) -> Result<(), MediaflowError> {
        if !self.status.is_actionable() {
            return Err(self.invalid(StepStatus::Processing));
        }
        self.status = StepStatus::Processing;
        self.started_at = Some(at);
        self.completed_at = None;
        self.error = None;
        Ok(())
    }

    /// processing -> completed
    pub fn complete(&mut self, at: Timestamp, data: Option<StepData>) -> Result<(), MediaflowError> {
        if self.status != StepStatus::Processing {
            return Err(self.invalid(StepStatus::Completed));
        }
        self.status = StepStatus::Completed;
        self.completed_at = Some(at);
        self.error = None;
        if data.is_some() {
            self.step_data = data;
        }
        Ok(())
    }

    /// pending | processing -> failed, bumping the retry counter.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), MediaflowError> {
        if !matches!(self.status, StepStatus::Pending | StepStatus::Processing) {
            return Err(self.invalid(StepStatus::Failed));
        }
        self.status = StepStatus::Failed;
        self.retry_count += 1;
        self.error = Some(error.into());
        Ok(())
    }

    /// failed | processing -> pending. `retry_count` is kept as an audit trail.
    ///
    /// Resetting a `processing` row is how an external reaper releases a step
    /// whose worker died.
    pub fn reset(&mut self) -> Result<(), MediaflowError> {
        if !matches!(self.status, StepStatus::Failed | StepStatus::Processing) {
            return Err(self.invalid(StepStatus::Pending));
        }
        self.status = StepStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error = None;
        Ok(())
    }

    /// pending | failed -> skipped
    pub fn skip(&mut self, at: Timestamp) -> Result<(), MediaflowError> {
        if !self.status.is_actionable() {
            return Err(self.invalid(StepStatus::Skipped));
        }
        self.status = StepStatus::Skipped;
        self.completed_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> PipelineStepRecord {
        PipelineStepRecord::new(Uuid::new_v4(), StepName::Video, 1)
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut step = record();
        step.start(Utc::now()).unwrap();
        assert_eq!(step.status, StepStatus::Processing);
        assert!(step.started_at.is_some());

        let data = StepData::Video {
            url: "s3://out/video.mp4".to_string(),
            duration_seconds: Some(12.5),
            provider: Some("runway".to_string()),
        };
        step.complete(Utc::now(), Some(data.clone())).unwrap();
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.step_data, Some(data));
    }

    #[test]
    fn test_completed_is_terminal() {
        let mut step = record();
        step.start(Utc::now()).unwrap();
        step.complete(Utc::now(), None).unwrap();

        assert!(step.start(Utc::now()).is_err());
        assert!(step.fail("late").is_err());
        assert!(step.reset().is_err());
    }

    #[test]
    fn test_reset_keeps_retry_count() {
        let mut step = record();
        step.start(Utc::now()).unwrap();
        step.fail("provider timeout").unwrap();
        assert_eq!(step.retry_count, 1);
        assert_eq!(step.error.as_deref(), Some("provider timeout"));

        step.reset().unwrap();
        assert_eq!(step.status, StepStatus::Pending);
        assert_eq!(step.retry_count, 1);
        assert!(step.error.is_none());
        assert!(step.started_at.is_none());
    }

    #[test]
    fn test_cannot_complete_without_start() {
        let mut step = record();
        let err = step.complete(Utc::now(), None).unwrap_err();
        assert!(matches!(
            err,
            MediaflowError::InvalidTransition {
                from: StepStatus::Pending,
                to: StepStatus::Completed,
                ..
            }
        ));
    }

    #[test]
    fn test_step_data_serialization() {
        let data = StepData::Images {
            urls: vec!["a.png".to_string(), "b.png".to_string()],
            provider: None,
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "images");
        assert_eq!(data.primary_url(), Some("a.png"));

        let pending = StepData::Pending {
            provider: "kling".to_string(),
            polling_handle: "task-42".to_string(),
        };
        assert!(pending.is_pending());
        assert_eq!(pending.primary_url(), None);
    }
}
