//! Ordered provider fallback.

use super::{AttemptRecord, CircuitBreaker, FallbackResult};
use crate::config::SelectorConfig;
use crate::core::{Capability, CandidateSlot, Tier};
use crate::errors::{ExhaustionError, SelectionError};
use crate::events::{EventKind, EventSink, NoOpEventSink, PipelineEvent};
use crate::policy::{GenerationParams, TierPolicyTable};
use crate::providers::{GenerationProvider, ProviderRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tries provider candidates in order until one succeeds.
///
/// The first success wins and no later candidate is invoked. Candidates
/// whose circuit is open are skipped without waiting. A failed candidate is
/// followed by an exponential backoff unless it was the last one. When
/// nothing succeeds the full attempt trail is returned in
/// [`SelectionError::Exhausted`]; providers outside the resolved list are
/// never substituted.
#[derive(Clone)]
pub struct FallbackSelector {
    policies: Arc<TierPolicyTable>,
    breaker: Arc<CircuitBreaker>,
    config: SelectorConfig,
    defaults: HashMap<Capability, Vec<String>>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for FallbackSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackSelector")
            .field("policies", &self.policies.len())
            .field("breaker", &self.breaker)
            .field("config", &self.config)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

struct Plan<'a> {
    candidates: Vec<String>,
    params: Option<&'a GenerationParams>,
    capability: Option<Capability>,
    tier: Option<Tier>,
}

impl FallbackSelector {
    /// Creates a selector over a policy table and a shared breaker.
    #[must_use]
    pub fn new(
        policies: Arc<TierPolicyTable>,
        breaker: Arc<CircuitBreaker>,
        config: SelectorConfig,
    ) -> Self {
        Self {
            policies,
            breaker,
            config,
            defaults: HashMap::new(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Providers to use for `capability` when the policy table has no entry.
    #[must_use]
    pub fn with_default_providers(
        mut self,
        capability: Capability,
        providers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.defaults
            .insert(capability, providers.into_iter().map(Into::into).collect());
        self
    }

    /// Sends provider events to `sink`.
    #[must_use]
    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// The shared breaker.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The policy table.
    #[must_use]
    pub fn policies(&self) -> &TierPolicyTable {
        &self.policies
    }

    /// Resolves the candidate order for (capability, tier).
    pub fn candidates_for(
        &self,
        capability: Capability,
        tier: Tier,
    ) -> Result<Vec<String>, SelectionError> {
        if let Some(entry) = self.policies.get(capability, tier) {
            return Ok(entry.candidates());
        }
        match self.defaults.get(&capability) {
            Some(providers) if !providers.is_empty() => {
                warn!(%capability, %tier, "No tier policy entry; using default providers");
                Ok(providers.clone())
            }
            _ => Err(SelectionError::PolicyMissing { capability, tier }),
        }
    }

    /// Runs the fallback chain resolved from the tier policy.
    pub async fn execute_by_tier(
        &self,
        capability: Capability,
        tier: Tier,
        invoker: &dyn GenerationProvider,
        params: ProviderRequest,
        provider_param: Option<&str>,
    ) -> Result<FallbackResult, SelectionError> {
        let entry = self.policies.get(capability, tier);
        let plan = Plan {
            candidates: self.candidates_for(capability, tier)?,
            params: entry.map(|e| &e.params),
            capability: Some(capability),
            tier: Some(tier),
        };
        self.run(plan, invoker, params, provider_param).await
    }

    /// Runs the fallback chain over an explicit provider list.
    pub async fn execute_by_list(
        &self,
        providers: &[String],
        invoker: &dyn GenerationProvider,
        params: ProviderRequest,
        provider_param: Option<&str>,
    ) -> Result<FallbackResult, SelectionError> {
        let plan = Plan {
            candidates: providers.to_vec(),
            params: None,
            capability: None,
            tier: None,
        };
        self.run(plan, invoker, params, provider_param).await
    }

    async fn any_closed(&self, providers: &[String]) -> bool {
        for provider in providers {
            if !self.breaker.is_open(provider).await {
                return true;
            }
        }
        false
    }

    async fn run(
        &self,
        plan: Plan<'_>,
        invoker: &dyn GenerationProvider,
        params: ProviderRequest,
        provider_param: Option<&str>,
    ) -> Result<FallbackResult, SelectionError> {
        if plan.candidates.is_empty() {
            return Err(SelectionError::NoCandidates);
        }

        let param_name = provider_param.unwrap_or(&self.config.provider_param);
        let last = plan.candidates.len() - 1;
        let mut attempts = Vec::with_capacity(plan.candidates.len());
        let mut last_error = None;

        for (index, provider) in plan.candidates.iter().enumerate() {
            let slot = CandidateSlot::from_index(index);

            if self.breaker.is_open(provider).await {
                info!(provider = %provider, %slot, "Circuit open; skipping provider");
                attempts.push(AttemptRecord::skipped(provider, slot));
                self.events.try_emit(
                    PipelineEvent::for_provider(EventKind::ProviderSkipped, provider.as_str())
                        .with_data(serde_json::json!({ "slot": slot.to_string() })),
                );
                continue;
            }

            let mut request = params.clone().with_provider(param_name, provider);
            if let (Some(knobs), Some(capability)) = (plan.params, plan.capability) {
                knobs.apply_to(capability, &mut request);
            }

            debug!(provider = %provider, %slot, "Invoking provider");
            let error = match invoker.generate(request).await {
                Ok(response) if response.status.is_success() => {
                    self.breaker.reset(provider).await;
                    attempts.push(AttemptRecord::success(provider, slot));
                    self.events.try_emit(
                        PipelineEvent::for_provider(EventKind::ProviderSucceeded, provider.as_str())
                            .with_data(serde_json::json!({
                                "slot": slot.to_string(),
                                "status": response.status,
                            })),
                    );
                    return Ok(FallbackResult {
                        response,
                        provider_used: provider.clone(),
                        model_tier_used: slot,
                        capability: plan.capability,
                        tier: plan.tier,
                        attempts,
                    });
                }
                Ok(response) => response
                    .error
                    .unwrap_or_else(|| format!("provider returned status {}", response.status)),
                Err(e) => e.message,
            };

            warn!(provider = %provider, %slot, error = %error, "Provider attempt failed");
            self.breaker.record_failure(provider).await;
            attempts.push(AttemptRecord::failed(provider, slot, error.clone()));
            self.events.try_emit(
                PipelineEvent::for_provider(EventKind::ProviderFailed, provider.as_str())
                    .with_data(serde_json::json!({ "slot": slot.to_string(), "error": error })),
            );
            last_error = Some(error);

            if index < last && self.any_closed(&plan.candidates[index + 1..]).await {
                let delay = self.config.backoff_for(index);
                debug!(
                    provider = %provider,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Backing off before next candidate"
                );
                tokio::time::sleep(delay).await;
            }
        }

        let exhausted = ExhaustionError {
            capability: plan.capability,
            tier: plan.tier,
            attempts,
            last_error,
        };
        warn!(error = %exhausted, "Provider fallback exhausted");
        self.events.try_emit(
            PipelineEvent::new(EventKind::ProviderExhausted).with_data(exhausted.to_json()),
        );
        Err(exhausted.into())
    }
}
