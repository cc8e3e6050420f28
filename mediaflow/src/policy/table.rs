//! Tier policy table.

use crate::core::{Capability, Tier};
use crate::errors::MediaflowError;
use crate::providers::ProviderRequest;
use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{info, warn};

/// Provider-side generation knobs attached to a policy entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Cap on generated output size (tokens for text).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Output resolution, e.g. `1024x1024` or `1080p`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Target clip length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    /// Any other provider parameter.
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl GenerationParams {
    /// Copies the knobs into `request` without overriding caller values.
    ///
    /// Output size and temperature only apply to capabilities that sample.
    pub fn apply_to(&self, capability: Capability, request: &mut ProviderRequest) {
        if capability.uses_sampling_params() {
            if let Some(max) = self.max_output_tokens {
                request.insert_if_absent("max_tokens", max);
            }
            if let Some(temperature) = self.temperature {
                request.insert_if_absent("temperature", temperature);
            }
        }
        if let Some(ref resolution) = self.resolution {
            request.insert_if_absent("resolution", resolution.clone());
        }
        if let Some(duration) = self.duration_seconds {
            request.insert_if_absent("duration", duration);
        }
        for (key, value) in &self.extra {
            request.insert_if_absent(key.clone(), value.clone());
        }
    }
}

/// Ordered provider candidates and parameters for one (capability, tier).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPolicyEntry {
    /// First choice.
    pub primary: String,
    /// Second choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    /// Third choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback2: Option<String>,
    /// Generation knobs.
    #[serde(default)]
    pub params: GenerationParams,
    /// Declared cost per generated unit, in credits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_cost: Option<f64>,
}

impl TierPolicyEntry {
    /// Creates an entry with only a primary provider.
    #[must_use]
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            fallback: None,
            fallback2: None,
            params: GenerationParams::default(),
            unit_cost: None,
        }
    }

    /// Sets the second choice.
    #[must_use]
    pub fn with_fallback(mut self, provider: impl Into<String>) -> Self {
        self.fallback = Some(provider.into());
        self
    }

    /// Sets the third choice.
    #[must_use]
    pub fn with_fallback2(mut self, provider: impl Into<String>) -> Self {
        self.fallback2 = Some(provider.into());
        self
    }

    /// Sets the generation knobs.
    #[must_use]
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Sets the declared unit cost.
    #[must_use]
    pub fn with_unit_cost(mut self, cost: f64) -> Self {
        self.unit_cost = Some(cost);
        self
    }

    /// Candidates in order: primary, fallback, fallback2.
    #[must_use]
    pub fn candidates(&self) -> Vec<String> {
        std::iter::once(&self.primary)
            .chain(self.fallback.as_ref())
            .chain(self.fallback2.as_ref())
            .cloned()
            .collect()
    }
}

/// Result of validating a policy table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyReport {
    /// (capability, tier) pairs without an entry.
    pub missing: Vec<(Capability, Tier)>,
    /// Entries naming the same provider twice.
    pub duplicate_candidates: Vec<(Capability, Tier, String)>,
    /// Provider ids that are not plain identifiers.
    pub invalid_ids: Vec<(Capability, Tier, String)>,
}

impl PolicyReport {
    /// Returns true if nothing was flagged.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.duplicate_candidates.is_empty() && self.invalid_ids.is_empty()
    }
}

static PROVIDER_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:\-]*$").ok());

fn is_valid_provider_id(id: &str) -> bool {
    PROVIDER_ID.as_ref().map_or(true, |re| re.is_match(id))
}

/// Static capability × tier → provider policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierPolicyTable {
    entries: BTreeMap<Capability, BTreeMap<Tier, TierPolicyEntry>>,
}

impl TierPolicyTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, capability: Capability, tier: Tier, entry: TierPolicyEntry) {
        self.entries.entry(capability).or_default().insert(tier, entry);
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, capability: Capability, tier: Tier, entry: TierPolicyEntry) -> Self {
        self.insert(capability, tier, entry);
        self
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, capability: Capability, tier: Tier) -> Option<&TierPolicyEntry> {
        self.entries.get(&capability).and_then(|tiers| tiers.get(&tier))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Returns true if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parses a table from JSON shaped `{capability: {tier: entry}}`.
    pub fn from_json_str(raw: &str) -> Result<Self, MediaflowError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Loads a table from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading tier policy file {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("parsing tier policy file {}", path.display()))
    }

    /// Checks every capability/tier pair and every provider id.
    ///
    /// Problems are logged and returned, never raised.
    pub fn validate(&self) -> PolicyReport {
        let mut report = PolicyReport::default();

        for capability in Capability::ALL {
            for tier in Tier::ALL {
                let Some(entry) = self.get(capability, tier) else {
                    warn!(%capability, %tier, "No tier policy entry; callers fall back to defaults");
                    report.missing.push((capability, tier));
                    continue;
                };

                let candidates = entry.candidates();
                for (i, id) in candidates.iter().enumerate() {
                    if !is_valid_provider_id(id) {
                        warn!(%capability, %tier, provider = %id, "Malformed provider id in tier policy");
                        report.invalid_ids.push((capability, tier, id.clone()));
                    }
                    if candidates[..i].contains(id) {
                        warn!(%capability, %tier, provider = %id, "Provider listed twice in tier policy");
                        report.duplicate_candidates.push((capability, tier, id.clone()));
                    }
                }
            }
        }

        if report.is_clean() {
            info!(entries = self.len(), "Tier policy table validated");
        }
        report
    }
}
