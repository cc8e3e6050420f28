//! Runtime configuration.
//!
//! Every struct deserializes from JSON with per-field defaults, so a config
//! file only needs to name what it changes. [`MediaflowConfig::apply_env`]
//! layers `MEDIAFLOW_*` environment overrides on top.

use crate::observability::{LogFormat, LoggingConfig};
use crate::resilience::{BackoffStrategy, RetryConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

fn default_failure_threshold() -> usize {
    5
}

fn default_window_seconds() -> u64 {
    60
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Failures inside the window that open the breaker. `0` disables it.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,
    /// Sliding window length in seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_seconds: default_window_seconds(),
        }
    }
}

impl BreakerConfig {
    /// Sets the failure threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the window length.
    #[must_use]
    pub fn with_window_seconds(mut self, seconds: u64) -> Self {
        self.window_seconds = seconds;
        self
    }

    /// Returns false when the threshold is zero.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.failure_threshold > 0
    }

    /// Window as a `Duration`.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_provider_param() -> String {
    "model".to_string()
}

/// Fallback selector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Wait after the first failed candidate; doubles for each later one.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Cap on the wait between candidates.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Parameter name the provider id is written to when the call site
    /// does not name one.
    #[serde(default = "default_provider_param")]
    pub provider_param: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            provider_param: default_provider_param(),
        }
    }
}

impl SelectorConfig {
    /// Sets the backoff base.
    #[must_use]
    pub fn with_backoff_base_ms(mut self, millis: u64) -> Self {
        self.backoff_base_ms = millis;
        self
    }

    /// Sets the default provider parameter name.
    #[must_use]
    pub fn with_provider_param(mut self, name: impl Into<String>) -> Self {
        self.provider_param = name.into();
        self
    }

    /// Wait after failed candidate `index`: `base * 2^index`.
    #[must_use]
    pub fn backoff_for(&self, index: usize) -> Duration {
        BackoffStrategy::Exponential.delay(
            Duration::from_millis(self.backoff_base_ms),
            u32::try_from(index).unwrap_or(u32::MAX),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

fn default_max_step_retries() -> u32 {
    3
}

/// How many failures a step may accumulate and stay resumable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRetryPolicy {
    /// Maximum failures per step before the job becomes terminal.
    #[serde(default = "default_max_step_retries")]
    pub max_step_retries: u32,
}

impl Default for StepRetryPolicy {
    fn default() -> Self {
        Self {
            max_step_retries: default_max_step_retries(),
        }
    }
}

impl StepRetryPolicy {
    /// Returns true while a step with `retry_count` failures may be resumed.
    #[must_use]
    pub fn allows(&self, retry_count: u32) -> bool {
        retry_count <= self.max_step_retries
    }
}

fn default_enforce_step_order() -> bool {
    true
}

/// Pipeline coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Reject starting any step other than the resume cursor.
    #[serde(default = "default_enforce_step_order")]
    pub enforce_step_order: bool,
    /// Resume policy.
    #[serde(default)]
    pub step_retry: StepRetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            enforce_step_order: default_enforce_step_order(),
            step_retry: StepRetryPolicy::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Sets strict ordering.
    #[must_use]
    pub fn with_enforce_step_order(mut self, enforce: bool) -> Self {
        self.enforce_step_order = enforce;
        self
    }

    /// Sets the per-step failure budget.
    #[must_use]
    pub fn with_max_step_retries(mut self, retries: u32) -> Self {
        self.step_retry.max_step_retries = retries;
        self
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaflowConfig {
    /// Circuit breaker.
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Fallback selector.
    #[serde(default)]
    pub selector: SelectorConfig,
    /// Pipeline coordinator.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Bounded retry around store calls.
    #[serde(default)]
    pub store_retry: RetryConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MediaflowConfig {
    /// Loads configuration from a JSON file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Loads the file, then applies environment overrides.
    pub fn load_with_env(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(path)?.apply_env()
    }

    /// Applies `MEDIAFLOW_*` environment overrides.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_override(&lookup, "MEDIAFLOW_BREAKER_THRESHOLD")? {
            self.breaker.failure_threshold = v;
        }
        if let Some(v) = parse_override(&lookup, "MEDIAFLOW_BREAKER_WINDOW_SECS")? {
            self.breaker.window_seconds = v;
        }
        if let Some(v) = parse_override(&lookup, "MEDIAFLOW_BACKOFF_BASE_MS")? {
            self.selector.backoff_base_ms = v;
        }
        if let Some(v) = lookup("MEDIAFLOW_PROVIDER_PARAM") {
            self.selector.provider_param = v;
        }
        if let Some(v) = parse_override(&lookup, "MEDIAFLOW_MAX_STEP_RETRIES")? {
            self.coordinator.step_retry.max_step_retries = v;
        }
        if let Some(v) = lookup("MEDIAFLOW_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = parse_override::<LogFormat, _>(&lookup, "MEDIAFLOW_LOG_FORMAT")? {
            self.logging.format = v;
        }
        Ok(self)
    }
}

fn parse_override<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid value '{raw}' for {name}: {e}")),
    }
}
