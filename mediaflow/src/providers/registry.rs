//! Provider routing by id.

use super::{GenerationProvider, ProviderRequest, ProviderResponse};
use crate::errors::ProviderError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes each request to the adapter registered under the id found in the
/// provider parameter.
///
/// Lets one invoker serve a whole tier policy table.
#[derive(Clone)]
pub struct ProviderRegistry {
    param_name: String,
    providers: HashMap<String, Arc<dyn GenerationProvider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry reading the id from `param_name`.
    #[must_use]
    pub fn new(param_name: impl Into<String>) -> Self {
        Self {
            param_name: param_name.into(),
            providers: HashMap::new(),
        }
    }

    /// Registers an adapter.
    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn GenerationProvider>) {
        self.providers.insert(id.into(), provider);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(mut self, id: impl Into<String>, provider: Arc<dyn GenerationProvider>) -> Self {
        self.register(id, provider);
        self
    }

    /// Returns true if an adapter is registered for `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("param_name", &self.param_name)
            .field("providers", &self.ids())
            .finish()
    }
}

#[async_trait]
impl GenerationProvider for ProviderRegistry {
    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let id = request
            .get_str(&self.param_name)
            .ok_or_else(|| {
                ProviderError::new("<unset>", format!("request has no '{}' parameter", self.param_name))
            })?
            .to_string();

        let provider = self
            .providers
            .get(&id)
            .cloned()
            .ok_or_else(|| ProviderError::new(id.clone(), "provider is not registered"))?;

        provider.generate(request).await
    }
}
