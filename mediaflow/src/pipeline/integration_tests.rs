//! End-to-end tests across the coordinator, runner, selector and stores.

#[cfg(test)]
mod tests {
    use crate::config::{CoordinatorConfig, SelectorConfig};
    use crate::core::{Capability, CandidateSlot, JobStatus, StepName, StepStatus, Tier};
    use crate::errors::MediaflowError;
    use crate::events::EventKind;
    use crate::ledger::{PipelinePhase, StageTemplate, StepData};
    use crate::pipeline::{AdvanceOutcome, GenerationStage, PipelineCoordinator, StageRunner};
    use crate::policy::{TierPolicyEntry, TierPolicyTable};
    use crate::providers::{FnProvider, GenerationProvider, ProviderRegistry, ProviderRequest, ProviderResponse};
    use crate::resilience::{AttemptOutcome, CircuitBreaker, FallbackSelector, RetryConfig};
    use crate::store::{InMemoryJobStore, RetryingStore};
    use crate::testing::{FlakyJobStore, ScriptedProvider, StaticStage, TestHarness};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn counting(url: &'static str, counter: Arc<AtomicUsize>) -> Arc<dyn GenerationProvider> {
        Arc::new(FnProvider::new(move |_request: ProviderRequest| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ProviderResponse::success_url(url))
            }
        }))
    }

    #[tokio::test]
    async fn test_video_fails_twice_then_resumes() {
        let harness = TestHarness::default();
        let policies = TierPolicyTable::new()
            .with(Capability::Video, Tier::Free, TierPolicyEntry::new("kling-v1"))
            .with(Capability::LipSync, Tier::Free, TierPolicyEntry::new("wav2lip"));
        let provider = Arc::new(
            ScriptedProvider::new("model")
                .fail("kling-v1", "HTTP 504")
                .fail("kling-v1", "HTTP 504")
                .succeed("kling-v1", "https://cdn/video.mp4"),
        );
        let stage = Arc::new(GenerationStage::new(
            Arc::new(harness.selector(policies)),
            provider.clone(),
        ));
        let runner = StageRunner::new(
            harness.coordinator.clone(),
            StageTemplate::new(1, vec![StepName::Video, StepName::LipSync]).unwrap(),
        )
        .with_handler_for([StepName::Video, StepName::LipSync], stage);

        let job = harness
            .coordinator
            .create_job("creator-7", Tier::Free)
            .await
            .unwrap();

        for attempt in 1..=2u32 {
            let outcome = assert_ok!(runner.advance(job.id).await);
            assert!(matches!(
                outcome,
                AdvanceOutcome::Failed {
                    step: StepName::Video,
                    can_resume: true,
                    ..
                }
            ));
            let stored = harness.coordinator.job(job.id).await.unwrap();
            assert_eq!(stored.retry_count, attempt);
            assert!(stored.can_resume);
            assert_eq!(stored.failed_at_step, Some(StepName::Video));
        }

        let outcome = assert_ok!(runner.advance(job.id).await);
        assert_eq!(
            outcome,
            AdvanceOutcome::Completed {
                step: StepName::Video,
                next: Some(StepName::LipSync),
            }
        );

        let stored = harness.coordinator.job(job.id).await.unwrap();
        assert_eq!(stored.pipeline_state.as_ref().unwrap().steps_completed, 1);
        assert_eq!(stored.retry_count, 2);
        assert_eq!(
            harness.coordinator.next_step(job.id).await.unwrap(),
            Some(StepName::LipSync)
        );

        let video_row = harness
            .coordinator
            .steps(job.id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.step == StepName::Video)
            .unwrap();
        assert_eq!(video_row.retry_count, 2);
        assert_eq!(video_row.status, StepStatus::Completed);
        assert_eq!(provider.call_count(), 3);
        assert_eq!(harness.events.of_kind(EventKind::StepFailed).len(), 2);
    }

    #[tokio::test]
    async fn test_tripped_primary_falls_back_then_heals() {
        let harness = TestHarness::default();
        let gen4_calls = Arc::new(AtomicUsize::new(0));
        let nano_calls = Arc::new(AtomicUsize::new(0));
        let runway_calls = Arc::new(AtomicUsize::new(0));
        let registry = ProviderRegistry::new("model")
            .with("gen4_image", counting("https://cdn/gen4.png", gen4_calls.clone()))
            .with("nano-banana", counting("https://cdn/nano.png", nano_calls.clone()))
            .with("runway_image", counting("https://cdn/runway.png", runway_calls.clone()));
        let selector = harness.selector(TierPolicyTable::builtin());

        for _ in 0..5 {
            harness.breaker.record_failure("gen4_image").await;
        }

        let result = assert_ok!(
            selector
                .execute_by_tier(
                    Capability::Image,
                    Tier::Free,
                    &registry,
                    ProviderRequest::new().with("prompt", "lighthouse in fog"),
                    None,
                )
                .await
        );
        assert_eq!(result.model_tier_used, CandidateSlot::Fallback);
        assert_eq!(result.provider_used, "nano-banana");
        let trail: Vec<(&str, AttemptOutcome)> = result
            .attempts
            .iter()
            .map(|a| (a.provider.as_str(), a.outcome))
            .collect();
        assert_eq!(
            trail,
            vec![
                ("gen4_image", AttemptOutcome::Skipped),
                ("nano-banana", AttemptOutcome::Success),
            ]
        );
        assert_eq!(gen4_calls.load(Ordering::SeqCst), 0);
        assert_eq!(runway_calls.load(Ordering::SeqCst), 0);

        harness.clock.advance(Duration::from_secs(60));
        let healed = assert_ok!(
            selector
                .execute_by_tier(Capability::Image, Tier::Free, &registry, ProviderRequest::new(), None)
                .await
        );
        assert_eq!(healed.model_tier_used, CandidateSlot::Primary);
        assert_eq!(gen4_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregistered_providers_never_substituted() {
        let harness = TestHarness::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ProviderRegistry::new("model").with("outside-policy", counting("x.png", calls.clone()));
        let selector = harness.selector(TierPolicyTable::builtin());

        let err = assert_err!(
            selector
                .execute_by_tier(Capability::Image, Tier::Free, &registry, ProviderRequest::new(), None)
                .await
        );
        let attempted: Vec<&str> = err.attempts().iter().map(|a| a.provider.as_str()).collect();
        assert_eq!(attempted, vec!["gen4_image", "nano-banana", "runway_image"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.events.of_kind(EventKind::ProviderExhausted).len(), 1);
    }

    #[tokio::test]
    async fn test_standard_pipeline_over_retrying_store() {
        let store = Arc::new(RetryingStore::new(
            InMemoryJobStore::new(),
            RetryConfig::new().with_base_delay_ms(1),
        ));
        let coordinator = Arc::new(PipelineCoordinator::new(store, CoordinatorConfig::default()));

        let provider = Arc::new(
            ScriptedProvider::new("model")
                .respond("edge-tts", ProviderResponse::success_url("https://cdn/voice.mp3").with_duration(42.0))
                .respond(
                    "gen4_image",
                    ProviderResponse::success_urls(vec!["https://cdn/1.png".into(), "https://cdn/2.png".into()]),
                )
                .succeed("seedance-lite", "https://cdn/video.mp4")
                .succeed("wav2lip", "https://cdn/final.mp4"),
        );
        let selector = Arc::new(FallbackSelector::new(
            Arc::new(TierPolicyTable::builtin()),
            Arc::new(CircuitBreaker::default()),
            SelectorConfig::default().with_backoff_base_ms(1),
        ));
        let generation = Arc::new(GenerationStage::new(selector, provider.clone()));
        let merge = Arc::new(StaticStage::new(StepData::Merge {
            url: "https://cdn/merged.mp4".to_string(),
        }));

        let runner = StageRunner::new(coordinator.clone(), StageTemplate::standard())
            .with_handler_for(
                [StepName::Audio, StepName::Images, StepName::Video, StepName::LipSync],
                generation,
            )
            .with_handler(StepName::Merge, merge.clone());

        let job = coordinator.create_job("creator-1", Tier::Free).await.unwrap();
        assert_eq!(assert_ok!(runner.drive(job.id).await), AdvanceOutcome::Finished);

        let report = coordinator.status(job.id).await.unwrap();
        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.completed, 5);
        assert!(!report.can_resume);
        assert_eq!(report.pipeline_state.unwrap().phase, PipelinePhase::Completed);
        assert_eq!(merge.call_count(), 1);
        assert_eq!(
            provider.calls(),
            vec!["edge-tts", "gen4_image", "seedance-lite", "wav2lip"]
        );

        let lipsync_request = provider.requests().pop().unwrap();
        assert_eq!(lipsync_request.get_str("merge_url"), Some("https://cdn/merged.mp4"));
        assert_eq!(lipsync_request.get_str("audio_url"), Some("https://cdn/voice.mp3"));
    }

    #[tokio::test]
    async fn test_redelivery_recovers_from_lost_job_writes() {
        // job-row writes: initialize, initialize again, start video, complete video
        let store = Arc::new(FlakyJobStore::new().fail_update(1).fail_update(4));
        let harness = TestHarness::default();
        let coordinator = Arc::new(PipelineCoordinator::new(
            store.clone(),
            CoordinatorConfig::default(),
        ));
        let policies = TierPolicyTable::new()
            .with(Capability::Video, Tier::Free, TierPolicyEntry::new("kling-v1"))
            .with(Capability::LipSync, Tier::Free, TierPolicyEntry::new("wav2lip"));
        let provider = Arc::new(
            ScriptedProvider::new("model")
                .succeed("kling-v1", "https://cdn/video.mp4")
                .succeed("wav2lip", "https://cdn/synced.mp4"),
        );
        let stage = Arc::new(GenerationStage::new(
            Arc::new(harness.selector(policies)),
            provider.clone(),
        ));
        let runner = StageRunner::new(
            coordinator.clone(),
            StageTemplate::new(1, vec![StepName::Video, StepName::LipSync]).unwrap(),
        )
        .with_handler_for([StepName::Video, StepName::LipSync], stage);
        let job = coordinator.create_job("creator-9", Tier::Free).await.unwrap();

        let err = assert_err!(runner.advance(job.id).await);
        assert!(matches!(err, MediaflowError::Persistence(_)));
        assert_eq!(provider.call_count(), 0);

        let err = assert_err!(runner.advance(job.id).await);
        assert!(matches!(err, MediaflowError::Persistence(_)));
        assert_eq!(provider.calls(), vec!["kling-v1"]);

        let outcome = assert_ok!(runner.advance(job.id).await);
        assert_eq!(
            outcome,
            AdvanceOutcome::Completed {
                step: StepName::LipSync,
                next: None,
            }
        );
        assert_eq!(provider.calls(), vec!["kling-v1", "wav2lip"]);
        let lipsync_request = provider.requests().pop().unwrap();
        assert_eq!(lipsync_request.get_str("video_url"), Some("https://cdn/video.mp4"));

        let stored = coordinator.job(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.outputs.len(), 2);
        assert_eq!(store.update_calls(), 6);
    }
}
