//! Step and job status enums.

use super::Capability;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stage of the content-generation pipeline.
///
/// Declaration order is the canonical pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    /// Narration / voice synthesis.
    Audio,
    /// Per-scene image synthesis.
    Images,
    /// Image-to-video synthesis.
    Video,
    /// Audio and video merge.
    Merge,
    /// Lip-sync of the merged video against the narration.
    LipSync,
}

impl StepName {
    /// All steps in canonical order.
    pub const ALL: [Self; 5] = [
        Self::Audio,
        Self::Images,
        Self::Video,
        Self::Merge,
        Self::LipSync,
    ];

    /// The provider capability this step consumes, if any.
    ///
    /// `Merge` runs locally and never goes through provider selection.
    #[must_use]
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Self::Audio => Some(Capability::Audio),
            Self::Images => Some(Capability::Image),
            Self::Video => Some(Capability::Video),
            Self::Merge => None,
            Self::LipSync => Some(Capability::LipSync),
        }
    }

    /// Returns the snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Images => "images",
            Self::Video => "video",
            Self::Merge => "merge",
            Self::LipSync => "lip_sync",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(Self::Audio),
            "images" | "image" => Ok(Self::Images),
            "video" => Ok(Self::Video),
            "merge" => Ok(Self::Merge),
            "lip_sync" | "lipsync" => Ok(Self::LipSync),
            other => Err(format!("unknown step '{other}'")),
        }
    }
}

/// Status of a single ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting to be picked up.
    #[default]
    Pending,
    /// Claimed by a worker.
    Processing,
    /// Finished successfully.
    Completed,
    /// Last attempt failed; eligible for resume.
    Failed,
    /// Deliberately not run.
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StepStatus {
    /// Returns true if the step may be handed out by the resume cursor.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    /// Returns true if later steps may proceed past this one.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

/// Aggregate status of a job, derived from its step ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum JobStatus {
    /// Nothing has started yet.
    #[default]
    Pending,
    /// The given step is being worked on.
    Processing(StepName),
    /// The given step is done and the next one has not started.
    StepCompleted(StepName),
    /// Every step is completed or skipped.
    Completed,
    /// The last transition was a failure.
    Failed,
}

impl JobStatus {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing(step) => write!(f, "{step}_processing"),
            Self::StepCompleted(step) => write!(f, "{step}_completed"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_name_canonical_order() {
        let mut sorted = StepName::ALL;
        sorted.sort();
        assert_eq!(sorted, StepName::ALL);
        assert!(StepName::Video < StepName::LipSync);
    }

    #[test]
    fn test_step_name_capability() {
        assert_eq!(StepName::Images.capability(), Some(Capability::Image));
        assert_eq!(StepName::Merge.capability(), None);
    }

    #[test]
    fn test_step_name_parse() {
        assert_eq!("LipSync".parse::<StepName>(), Ok(StepName::LipSync));
        assert_eq!("image".parse::<StepName>(), Ok(StepName::Images));
        assert!("scenes".parse::<StepName>().is_err());
    }

    #[test]
    fn test_step_status_actionable() {
        assert!(StepStatus::Pending.is_actionable());
        assert!(StepStatus::Failed.is_actionable());
        assert!(!StepStatus::Processing.is_actionable());
        assert!(!StepStatus::Completed.is_actionable());
        assert!(!StepStatus::Skipped.is_actionable());
    }

    #[test]
    fn test_step_status_serialize() {
        let json = serde_json::to_string(&StepStatus::Processing).unwrap();
        assert_eq!(json, r#""processing""#);
    }

    #[test]
    fn test_job_status_display() {
        assert_eq!(JobStatus::Processing(StepName::Video).to_string(), "video_processing");
        assert_eq!(JobStatus::StepCompleted(StepName::LipSync).to_string(), "lip_sync_completed");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_job_status_serde_round_trip() {
        let status = JobStatus::Processing(StepName::Audio);
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json, serde_json::json!({"state": "processing", "step": "audio"}));

        let back: JobStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, status);
    }
}
