//! Attempt trail and selection result.

use crate::core::{Capability, CandidateSlot, Tier};
use crate::providers::ProviderResponse;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The provider returned success or processing.
    Success,
    /// The provider raised or returned an error status.
    Failed,
    /// Not invoked because the breaker was open.
    Skipped,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// One entry of the attempt trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Provider id.
    pub provider: String,
    /// Position in the candidate list.
    pub slot: CandidateSlot,
    /// Outcome.
    pub outcome: AttemptOutcome,
    /// Failure detail, or the skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptRecord {
    pub(crate) fn success(provider: &str, slot: CandidateSlot) -> Self {
        Self {
            provider: provider.to_string(),
            slot,
            outcome: AttemptOutcome::Success,
            error: None,
        }
    }

    pub(crate) fn failed(provider: &str, slot: CandidateSlot, error: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            slot,
            outcome: AttemptOutcome::Failed,
            error: Some(error.into()),
        }
    }

    pub(crate) fn skipped(provider: &str, slot: CandidateSlot) -> Self {
        Self {
            provider: provider.to_string(),
            slot,
            outcome: AttemptOutcome::Skipped,
            error: Some("circuit open".to_string()),
        }
    }
}

/// Successful selection: the provider response plus how it was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackResult {
    /// The winning provider's response.
    pub response: ProviderResponse,
    /// Id of the provider that produced it.
    pub provider_used: String,
    /// Which slot the winner occupied.
    pub model_tier_used: CandidateSlot,
    /// Capability, when resolved from a tier policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
    /// Tier, when resolved from a tier policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    /// Every candidate considered, in order, ending with the winner.
    pub attempts: Vec<AttemptRecord>,
}

impl FallbackResult {
    /// Returns true if a fallback candidate produced the result.
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        self.model_tier_used != CandidateSlot::Primary
    }

    /// Response enriched with selection metadata, as JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.response).unwrap_or_default();
        if let serde_json::Value::Object(ref mut map) = value {
            map.insert("provider_used".into(), self.provider_used.clone().into());
            map.insert("model_tier_used".into(), self.model_tier_used.to_string().into());
            map.insert(
                "attempts".into(),
                serde_json::to_value(&self.attempts).unwrap_or_default(),
            );
            if let Some(capability) = self.capability {
                map.insert("capability".into(), capability.as_str().into());
            }
            if let Some(tier) = self.tier {
                map.insert("tier".into(), tier.to_string().into());
            }
        }
        value
    }
}
