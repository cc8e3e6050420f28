//! Built-in tier policy used when no policy file is configured.

use super::{GenerationParams, TierPolicyEntry, TierPolicyTable};
use crate::core::{Capability, Tier};

type Row = (Capability, Tier, &'static [&'static str], f64);

const ROWS: &[Row] = &[
    (Capability::Script, Tier::Free, &["gpt-4o-mini", "mistral-small", "gemini-flash"], 0.01),
    (Capability::Script, Tier::Starter, &["gpt-4o-mini", "mistral-small", "gemini-flash"], 0.01),
    (Capability::Script, Tier::Pro, &["gpt-4o", "mistral-large", "gemini-pro"], 0.05),
    (Capability::Script, Tier::Enterprise, &["llama-3-70b", "gpt-4o", "gemini-pro"], 0.15),
    (Capability::Image, Tier::Free, &["gen4_image", "nano-banana", "runway_image"], 0.5),
    (Capability::Image, Tier::Starter, &["gen4_image", "nano-banana", "runway_image"], 0.5),
    (Capability::Image, Tier::Pro, &["flux-pro", "gen4_image", "nano-banana"], 1.0),
    (Capability::Image, Tier::Enterprise, &["flux-pro-ultra", "flux-pro", "gen4_image"], 2.0),
    (Capability::Video, Tier::Free, &["seedance-lite", "kling-v1", "runway_gen3"], 5.0),
    (Capability::Video, Tier::Starter, &["kling-v1", "seedance-lite", "runway_gen3"], 6.0),
    (Capability::Video, Tier::Pro, &["kling-v2", "runway_gen4", "seedance-pro"], 12.0),
    (Capability::Video, Tier::Enterprise, &["veo-3", "kling-v2", "runway_gen4"], 25.0),
    (Capability::Audio, Tier::Free, &["edge-tts", "openai-tts"], 0.1),
    (Capability::Audio, Tier::Starter, &["openai-tts", "elevenlabs-turbo"], 0.2),
    (Capability::Audio, Tier::Pro, &["elevenlabs-multilingual", "openai-tts-hd"], 0.5),
    (Capability::Audio, Tier::Enterprise, &["elevenlabs-v3", "elevenlabs-multilingual", "openai-tts-hd"], 1.0),
    (Capability::Upscale, Tier::Free, &["real-esrgan"], 0.2),
    (Capability::Upscale, Tier::Starter, &["real-esrgan", "clarity-upscaler"], 0.3),
    (Capability::Upscale, Tier::Pro, &["topaz", "clarity-upscaler", "real-esrgan"], 1.0),
    (Capability::Upscale, Tier::Enterprise, &["topaz", "clarity-upscaler", "real-esrgan"], 1.0),
    (Capability::LipSync, Tier::Free, &["wav2lip"], 1.0),
    (Capability::LipSync, Tier::Starter, &["wav2lip", "sync-1.6"], 1.5),
    (Capability::LipSync, Tier::Pro, &["sync-2", "latentsync", "wav2lip"], 4.0),
    (Capability::LipSync, Tier::Enterprise, &["sync-2-pro", "sync-2", "latentsync"], 8.0),
];

fn params_for(capability: Capability, tier: Tier) -> GenerationParams {
    let premium = matches!(tier, Tier::Pro | Tier::Enterprise);
    let mut params = GenerationParams::default();
    match capability {
        Capability::Script => {
            params.max_output_tokens = Some(if premium { 4096 } else { 1024 });
            params.temperature = Some(0.7);
        }
        Capability::Image | Capability::Upscale => {
            params.resolution = Some(
                match tier {
                    Tier::Free | Tier::Starter => "1024x1024",
                    Tier::Pro => "1536x1536",
                    Tier::Enterprise => "2048x2048",
                }
                .to_string(),
            );
        }
        Capability::Video => {
            params.resolution = Some(if premium { "1080p" } else { "720p" }.to_string());
            params.duration_seconds = Some(if premium { 10 } else { 5 });
        }
        Capability::Audio | Capability::LipSync => {}
    }
    params
}

impl TierPolicyTable {
    /// Policy shipped with the crate. Covers every capability and tier.
    #[must_use]
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for &(capability, tier, candidates, cost) in ROWS {
            let mut providers = candidates.iter();
            let Some(primary) = providers.next() else {
                continue;
            };
            let mut entry = TierPolicyEntry::new(*primary)
                .with_params(params_for(capability, tier))
                .with_unit_cost(cost);
            entry.fallback = providers.next().map(ToString::to_string);
            entry.fallback2 = providers.next().map(ToString::to_string);
            table.insert(capability, tier, entry);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_is_complete_and_clean() {
        let table = TierPolicyTable::builtin();
        assert_eq!(table.len(), Capability::ALL.len() * Tier::ALL.len());
        assert!(table.validate().is_clean());
    }

    #[test]
    fn test_builtin_free_image_chain() {
        let table = TierPolicyTable::builtin();
        let entry = table.get(Capability::Image, Tier::Free).unwrap();
        assert_eq!(entry.candidates(), vec!["gen4_image", "nano-banana", "runway_image"]);
        assert_eq!(entry.params.resolution.as_deref(), Some("1024x1024"));
    }

    #[test]
    fn test_builtin_script_has_sampling_params() {
        let table = TierPolicyTable::builtin();
        let entry = table.get(Capability::Script, Tier::Enterprise).unwrap();
        assert_eq!(entry.params.max_output_tokens, Some(4096));
        assert!(entry.params.temperature.is_some());

        let mut request = crate::providers::ProviderRequest::new();
        entry.params.apply_to(Capability::Script, &mut request);
        assert_eq!(request.get("temperature"), Some(&serde_json::json!(0.7)));
    }
}
