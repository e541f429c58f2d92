use serde::Serialize;

use crate::clients::inference::{InferenceClient, ModelTag};
use crate::models::descriptor::{Capability, ModelDescriptor, QualityTier, SpeedClass};

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// Where a descriptor list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrySource {
    Live,
    Preset,
}

/// Derive a descriptor from a live inventory entry. Pure and deterministic.
pub fn describe(name: &str, size_bytes: u64) -> ModelDescriptor {
    let ram_required_gb = size_bytes as f64 / BYTES_PER_GB;

    let embedding_only = name.contains("embed");
    let (mut capabilities, mut best_for) = if embedding_only {
        (
            vec![Capability::Embedding],
            vec!["text-embedding", "similarity"],
        )
    } else if name.contains("code") || name.contains("llama") {
        (
            vec![Capability::Completion, Capability::Reasoning, Capability::Code],
            vec!["code-generation", "completion", "reasoning"],
        )
    } else {
        (
            vec![Capability::Completion, Capability::Reasoning],
            vec!["completion", "reasoning"],
        )
    };

    let (speed_class, quality_tier, cost_per_1k_tokens) = if ram_required_gb < 3.0 {
        (SpeedClass::Fast, QualityTier::Basic, 0.001)
    } else if ram_required_gb < 6.0 {
        (SpeedClass::Medium, QualityTier::Good, 0.003)
    } else {
        (SpeedClass::Slow, QualityTier::High, 0.008)
    };

    // Embedding models keep their single capability at any size.
    if ram_required_gb > 6.0 && !embedding_only {
        capabilities.push(Capability::Analysis);
        best_for.extend(["complex-reasoning", "analysis"]);
    }

    ModelDescriptor {
        name: name.to_string(),
        capabilities,
        ram_required_gb,
        speed_class,
        quality_tier,
        cost_per_1k_tokens,
        best_for: best_for.into_iter().map(String::from).collect(),
    }
}

/// Map a live inventory to descriptors. Upstream order and duplicates are kept;
/// zero-size entries are skipped.
pub fn describe_inventory(tags: &[ModelTag]) -> Vec<ModelDescriptor> {
    tags.iter()
        .filter(|tag| {
            if tag.size_bytes == 0 {
                tracing::debug!(model = %tag.name, "Skipping zero-size inventory entry");
                false
            } else {
                true
            }
        })
        .map(|tag| describe(&tag.name, tag.size_bytes))
        .collect()
}

fn preset(
    name: &str,
    capabilities: &[Capability],
    ram_required_gb: f64,
    speed_class: SpeedClass,
    quality_tier: QualityTier,
    cost_per_1k_tokens: f64,
    best_for: &[&str],
) -> ModelDescriptor {
    ModelDescriptor {
        name: name.to_string(),
        capabilities: capabilities.to_vec(),
        ram_required_gb,
        speed_class,
        quality_tier,
        cost_per_1k_tokens,
        best_for: best_for.iter().map(|s| s.to_string()).collect(),
    }
}

/// Fixed table used only when the live inventory is unavailable.
pub fn preset_descriptors() -> Vec<ModelDescriptor> {
    use Capability::*;
    vec![
        preset(
            "phi3:mini",
            &[Completion, Reasoning],
            2.3,
            SpeedClass::Fast,
            QualityTier::Basic,
            0.001,
            &["completion", "quick-answers"],
        ),
        preset(
            "llama3.2:3b",
            &[Completion, Reasoning, Code],
            3.4,
            SpeedClass::Medium,
            QualityTier::Good,
            0.003,
            &["completion", "reasoning", "code-generation"],
        ),
        preset(
            "codellama:7b",
            &[Completion, Code, Analysis],
            3.8,
            SpeedClass::Medium,
            QualityTier::Good,
            0.003,
            &["code-generation", "code-review"],
        ),
        preset(
            "llama3.1:8b",
            &[Completion, Reasoning, Code, Analysis],
            8.0,
            SpeedClass::Slow,
            QualityTier::High,
            0.008,
            &["complex-reasoning", "analysis", "code-generation"],
        ),
    ]
}

/// Current descriptor list: live inventory when the client answers, presets otherwise.
pub async fn discover(inference: Option<&InferenceClient>) -> (Vec<ModelDescriptor>, RegistrySource) {
    let Some(client) = inference else {
        tracing::debug!("No inference client, using preset registry");
        return (preset_descriptors(), RegistrySource::Preset);
    };

    match client.list_models().await {
        Ok(tags) => (describe_inventory(&tags), RegistrySource::Live),
        Err(e) => {
            tracing::warn!("Model discovery failed, using preset registry: {}", e);
            (preset_descriptors(), RegistrySource::Preset)
        }
    }
}
