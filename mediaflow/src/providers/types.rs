//! Provider request and response types.

use crate::core::ProviderStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parameter bag handed to a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderRequest {
    params: HashMap<String, serde_json::Value>,
}

impl ProviderRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a request from an existing map.
    #[must_use]
    pub fn from_params(params: HashMap<String, serde_json::Value>) -> Self {
        Self { params }
    }

    /// Adds a parameter, replacing any previous value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Sets the provider id under `param_name`.
    #[must_use]
    pub fn with_provider(self, param_name: &str, provider: &str) -> Self {
        self.with(param_name, provider)
    }

    /// Adds a parameter only if the key is absent.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.params.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Returns a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }

    /// Returns a string parameter.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(serde_json::Value::as_str)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// All parameters.
    #[must_use]
    pub fn params(&self) -> &HashMap<String, serde_json::Value> {
        &self.params
    }
}

/// Result of one provider invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Outcome reported by the provider.
    pub status: ProviderStatus,
    /// Output locations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    /// Duration of the produced media in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Inline payload, for providers that return bytes.
    #[serde(skip)]
    pub data: Vec<u8>,
    /// Handle to poll when the provider completes asynchronously.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_handle: Option<String>,
    /// Error detail when `status` is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Provider-specific extras.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ProviderResponse {
    /// A successful response with one output location.
    #[must_use]
    pub fn success_url(url: impl Into<String>) -> Self {
        Self::success_urls(vec![url.into()])
    }

    /// A successful response with several output locations.
    #[must_use]
    pub fn success_urls(urls: Vec<String>) -> Self {
        Self {
            status: ProviderStatus::Success,
            urls,
            ..Self::default()
        }
    }

    /// A successful response carrying raw bytes.
    #[must_use]
    pub fn success_bytes(data: Vec<u8>) -> Self {
        Self {
            status: ProviderStatus::Success,
            data,
            ..Self::default()
        }
    }

    /// Work accepted; poll `handle` for the result.
    #[must_use]
    pub fn processing(handle: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::Processing,
            polling_handle: Some(handle.into()),
            ..Self::default()
        }
    }

    /// An error-status response.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::Error,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Sets the media duration.
    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// First output location.
    #[must_use]
    pub fn first_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_provider_substitution() {
        let request = ProviderRequest::new()
            .with("prompt", "a lighthouse at dusk")
            .with_provider("model_name", "nano-banana");
        assert_eq!(request.get_str("model_name"), Some("nano-banana"));
        assert_eq!(request.get_str("prompt"), Some("a lighthouse at dusk"));
    }

    #[test]
    fn test_insert_if_absent_keeps_caller_value() {
        let mut request = ProviderRequest::new().with("temperature", 0.2);
        request.insert_if_absent("temperature", 0.9);
        request.insert_if_absent("max_tokens", 512);
        assert_eq!(request.get("temperature"), Some(&serde_json::json!(0.2)));
        assert_eq!(request.get("max_tokens"), Some(&serde_json::json!(512)));
    }

    #[test]
    fn test_request_serializes_as_flat_map() {
        let request = ProviderRequest::new().with("model", "eleven_v3");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"model": "eleven_v3"}));
    }

    #[test]
    fn test_response_factories() {
        let ok = ProviderResponse::success_url("a.mp3").with_duration(31.5);
        assert!(ok.status.is_success());
        assert_eq!(ok.first_url(), Some("a.mp3"));

        let pending = ProviderResponse::processing("task-1");
        assert!(pending.status.is_success());
        assert_eq!(pending.polling_handle.as_deref(), Some("task-1"));

        let err = ProviderResponse::error("quota exceeded");
        assert!(!err.status.is_success());
    }
}
