//! Stock handler for provider-backed steps.

use super::StageHandler;
use crate::core::{ProviderStatus, StepName};
use crate::errors::MediaflowError;
use crate::ledger::{Job, StepData};
use crate::providers::{GenerationProvider, ProviderRequest};
use crate::resilience::{FallbackResult, FallbackSelector};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Runs a step through the [`FallbackSelector`] for the job's tier.
///
/// Earlier outputs are passed to the provider as `<step>_url` parameters
/// (and `image_urls` for the image set), so e.g. lip-sync sees the merged
/// video.
#[derive(Clone)]
pub struct GenerationStage {
    selector: Arc<FallbackSelector>,
    invoker: Arc<dyn GenerationProvider>,
    base: ProviderRequest,
    provider_param: Option<String>,
}

impl std::fmt::Debug for GenerationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStage")
            .field("selector", &self.selector)
            .field("base", &self.base)
            .field("provider_param", &self.provider_param)
            .finish_non_exhaustive()
    }
}

impl GenerationStage {
    /// Creates a stage invoking providers through `invoker`.
    #[must_use]
    pub fn new(selector: Arc<FallbackSelector>, invoker: Arc<dyn GenerationProvider>) -> Self {
        Self {
            selector,
            invoker,
            base: ProviderRequest::new(),
            provider_param: None,
        }
    }

    /// Parameters sent with every request, e.g. the prompt or script.
    #[must_use]
    pub fn with_base_request(mut self, request: ProviderRequest) -> Self {
        self.base = request;
        self
    }

    /// Overrides the request key carrying the provider id.
    #[must_use]
    pub fn with_provider_param(mut self, name: impl Into<String>) -> Self {
        self.provider_param = Some(name.into());
        self
    }

    fn request_for(&self, job: &Job) -> ProviderRequest {
        let mut request = self.base.clone().with("job_id", job.id.to_string());
        for (step, output) in &job.outputs {
            if let StepData::Images { urls, .. } = output {
                request.insert_if_absent("image_urls", urls.clone());
            }
            if let Some(url) = output.primary_url() {
                request.insert_if_absent(format!("{step}_url"), url);
            }
        }
        request
    }
}

fn step_data(step: StepName, result: FallbackResult) -> Result<StepData, MediaflowError> {
    let provider = result.provider_used;
    let response = result.response;

    if response.status == ProviderStatus::Processing {
        let handle = response.polling_handle.ok_or_else(|| {
            MediaflowError::Stage(format!("provider '{provider}' returned processing without a handle"))
        })?;
        return Ok(StepData::Pending {
            provider,
            polling_handle: handle,
        });
    }

    let first_url = || {
        response
            .first_url()
            .map(ToString::to_string)
            .ok_or_else(|| MediaflowError::Stage(format!("provider '{provider}' returned no output")))
    };

    Ok(match step {
        StepName::Audio => StepData::Audio {
            url: first_url()?,
            duration_seconds: response.duration_seconds,
            provider: Some(provider.clone()),
        },
        StepName::Images => {
            if response.urls.is_empty() {
                return Err(MediaflowError::Stage(format!(
                    "provider '{provider}' returned no images"
                )));
            }
            StepData::Images {
                urls: response.urls.clone(),
                provider: Some(provider.clone()),
            }
        }
        StepName::Video => StepData::Video {
            url: first_url()?,
            duration_seconds: response.duration_seconds,
            provider: Some(provider.clone()),
        },
        StepName::Merge => StepData::Merge { url: first_url()? },
        StepName::LipSync => StepData::LipSync {
            url: first_url()?,
            provider: Some(provider.clone()),
        },
    })
}

#[async_trait]
impl StageHandler for GenerationStage {
    async fn run(&self, job: &Job, step: StepName) -> Result<StepData, MediaflowError> {
        let capability = step
            .capability()
            .ok_or_else(|| MediaflowError::Stage(format!("step '{step}' has no generation capability")))?;

        let result = self
            .selector
            .execute_by_tier(
                capability,
                job.tier,
                self.invoker.as_ref(),
                self.request_for(job),
                self.provider_param.as_deref(),
            )
            .await?;

        info!(
            job_id = %job.id,
            %step,
            provider = %result.provider_used,
            slot = %result.model_tier_used,
            attempts = result.attempts.len(),
            "Generation step produced output"
        );
        step_data(step, result)
    }
}
