//! Versioned stage templates.

use crate::core::StepName;
use crate::errors::TemplateError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An ordered, versioned list of pipeline steps.
///
/// Construct through [`StageTemplate::new`] so the list is validated, or use
/// [`StageTemplate::standard`] for the full five-stage pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTemplate")]
pub struct StageTemplate {
    version: u32,
    steps: Vec<StepName>,
}

#[derive(Deserialize)]
struct RawTemplate {
    version: u32,
    steps: Vec<StepName>,
}

impl TryFrom<RawTemplate> for StageTemplate {
    type Error = TemplateError;

    fn try_from(raw: RawTemplate) -> Result<Self, Self::Error> {
        Self::new(raw.version, raw.steps)
    }
}

impl StageTemplate {
    /// Version of [`StageTemplate::standard`].
    pub const STANDARD_VERSION: u32 = 1;

    /// Creates a validated template.
    pub fn new(version: u32, steps: Vec<StepName>) -> Result<Self, TemplateError> {
        let template = Self { version, steps };
        template.validate()?;
        Ok(template)
    }

    /// The complete pipeline: audio, images, video, merge, lip-sync.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            version: Self::STANDARD_VERSION,
            steps: StepName::ALL.to_vec(),
        }
    }

    /// Checks the template is non-empty and free of duplicates.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.steps.is_empty() {
            return Err(TemplateError::Empty {
                version: self.version,
            });
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(*step) {
                return Err(TemplateError::DuplicateStep {
                    version: self.version,
                    step: *step,
                });
            }
        }
        Ok(())
    }

    /// Template version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepName] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a validated template.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Zero-based position of a step, if present.
    #[must_use]
    pub fn position(&self, step: StepName) -> Option<usize> {
        self.steps.iter().position(|s| *s == step)
    }
}

impl Default for StageTemplate {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_template_is_complete() {
        let template = StageTemplate::standard();
        assert_eq!(template.version(), 1);
        assert_eq!(template.len(), 5);
        assert_eq!(template.steps(), &StepName::ALL);
        assert!(template.validate().is_ok());
    }

    #[test]
    fn test_custom_template() {
        let template = StageTemplate::new(2, vec![StepName::Video, StepName::LipSync]).unwrap();
        assert_eq!(template.position(StepName::LipSync), Some(1));
        assert_eq!(template.position(StepName::Audio), None);
    }

    #[test]
    fn test_empty_template_rejected() {
        let err = StageTemplate::new(3, vec![]).unwrap_err();
        assert_eq!(err, TemplateError::Empty { version: 3 });
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let err = StageTemplate::new(1, vec![StepName::Video, StepName::Video]).unwrap_err();
        assert_eq!(
            err,
            TemplateError::DuplicateStep {
                version: 1,
                step: StepName::Video
            }
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: StageTemplate =
            serde_json::from_str(r#"{"version": 4, "steps": ["video", "lip_sync"]}"#).unwrap();
        assert_eq!(ok.len(), 2);

        let bad = serde_json::from_str::<StageTemplate>(r#"{"version": 4, "steps": []}"#);
        assert!(bad.is_err());
    }
}
