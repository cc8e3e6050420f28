//! Generation provider capability interface.
//!
//! A provider is anything that takes a parameter bag naming the model to use
//! and returns a [`ProviderResponse`]. Concrete engines live outside this
//! crate; they are slotted into the tier policy table by id.

mod registry;
mod types;

pub use registry::ProviderRegistry;
pub use types::{ProviderRequest, ProviderResponse};

use crate::errors::ProviderError;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

/// An external generation engine.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Invokes the provider.
    ///
    /// An `Err` and an `Ok` response with [`crate::core::ProviderStatus::Error`]
    /// are treated the same way by the fallback selector.
    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}

/// A provider backed by an async closure.
pub struct FnProvider<F, Fut>
where
    F: Fn(ProviderRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProviderResponse, ProviderError>> + Send,
{
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnProvider<F, Fut>
where
    F: Fn(ProviderRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProviderResponse, ProviderError>> + Send,
{
    /// Wraps an async closure.
    pub fn new(func: F) -> Self {
        Self {
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> std::fmt::Debug for FnProvider<F, Fut>
where
    F: Fn(ProviderRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProviderResponse, ProviderError>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> GenerationProvider for FnProvider<F, Fut>
where
    F: Fn(ProviderRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProviderResponse, ProviderError>> + Send,
{
    async fn generate(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        (self.func)(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProviderStatus;

    #[tokio::test]
    async fn test_fn_provider_sees_substituted_model() {
        let provider = FnProvider::new(|request: ProviderRequest| async move {
            let model = request.get_str("model").unwrap_or_default().to_string();
            Ok(ProviderResponse::success_url(format!("https://cdn/{model}.png")))
        });

        let response = provider
            .generate(ProviderRequest::new().with_provider("model", "gen4_image"))
            .await
            .unwrap();
        assert_eq!(response.status, ProviderStatus::Success);
        assert_eq!(response.urls, vec!["https://cdn/gen4_image.png".to_string()]);
    }
}
