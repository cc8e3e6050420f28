//! Capabilities, tiers and provider result status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A category of generation work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Script / text generation.
    Script,
    /// Still image synthesis.
    Image,
    /// Video synthesis.
    Video,
    /// Speech synthesis.
    Audio,
    /// Image or video upscaling.
    Upscale,
    /// Lip-sync of a video against an audio track.
    LipSync,
}

impl Capability {
    /// All capabilities.
    pub const ALL: [Self; 6] = [
        Self::Script,
        Self::Image,
        Self::Video,
        Self::Audio,
        Self::Upscale,
        Self::LipSync,
    ];

    /// Returns the snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Upscale => "upscale",
            Self::LipSync => "lip_sync",
        }
    }

    /// Whether sampling knobs (output size, temperature) apply.
    #[must_use]
    pub fn uses_sampling_params(&self) -> bool {
        matches!(self, Self::Script)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown capability '{s}'"))
    }
}

/// Subscription tier of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Free plan.
    #[default]
    Free,
    /// Entry paid plan.
    Starter,
    /// Professional plan.
    Pro,
    /// Enterprise plan.
    Enterprise,
}

impl Tier {
    /// All tiers, cheapest first.
    pub const ALL: [Self; 4] = [Self::Free, Self::Starter, Self::Pro, Self::Enterprise];

    /// Returns the snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown tier '{s}'"))
    }
}

/// Status reported by a provider invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// Output is ready.
    Success,
    /// Accepted; output will be available through a polling handle.
    Processing,
    /// The provider reported an error.
    #[default]
    Error,
}

impl ProviderStatus {
    /// Success and accepted-for-processing both count as success for selection.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::Processing)
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Processing => write!(f, "processing"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Position of a candidate within its resolved provider order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CandidateSlot {
    /// First choice.
    Primary,
    /// Second choice.
    Fallback,
    /// Third choice.
    Fallback2,
    /// Further positions of an explicit list (zero-based index).
    Extra(usize),
}

impl CandidateSlot {
    /// Maps a zero-based candidate index to its slot.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Primary,
            1 => Self::Fallback,
            2 => Self::Fallback2,
            n => Self::Extra(n),
        }
    }

    /// Returns the zero-based candidate index.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Fallback => 1,
            Self::Fallback2 => 2,
            Self::Extra(n) => *n,
        }
    }
}

impl fmt::Display for CandidateSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
            Self::Fallback2 => write!(f, "fallback2"),
            Self::Extra(n) => write!(f, "fallback{n}"),
        }
    }
}

impl From<CandidateSlot> for String {
    fn from(slot: CandidateSlot) -> Self {
        slot.to_string()
    }
}

impl TryFrom<String> for CandidateSlot {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "primary" => Ok(Self::Primary),
            "fallback" => Ok(Self::Fallback),
            "fallback2" => Ok(Self::Fallback2),
            other => other
                .strip_prefix("fallback")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n > 2)
                .map(Self::Extra)
                .ok_or_else(|| format!("invalid candidate slot '{other}'")),
        }
    }
}
