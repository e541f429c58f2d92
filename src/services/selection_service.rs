use uuid::Uuid;

use crate::error::AppError;
use crate::models::descriptor::{ModelDescriptor, QualityTier};
use crate::models::resource_snapshot::SystemMetrics;
use crate::models::selection::{Requirements, SelectionResponse};
use crate::services::registry_service;
use crate::state::AppState;

/// Above this memory pressure the selector minimizes RAM instead of maximizing quality.
pub const PRESSURE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub chosen: ModelDescriptor,
    pub fallback_used: bool,
    pub alternatives: Vec<String>,
}

/// Rank `descriptors` for `task_type`. Deterministic: ties resolve to the
/// earlier entry in registry order.
pub fn choose(
    task_type: &str,
    requirements: &Requirements,
    descriptors: &[ModelDescriptor],
    pressure: f64,
) -> Result<Choice, AppError> {
    let filtered: Vec<&ModelDescriptor> =
        descriptors.iter().filter(|d| d.supports(task_type)).collect();

    if filtered.is_empty() {
        return Err(AppError::NoCandidate(task_type.to_string()));
    }

    let mut chosen_idx = 0;
    let mut fallback_used = false;

    if pressure > PRESSURE_THRESHOLD {
        for (idx, candidate) in filtered.iter().enumerate() {
            if candidate.ram_required_gb < filtered[chosen_idx].ram_required_gb {
                chosen_idx = idx;
                fallback_used = true;
            }
        }
    } else {
        let high_quality = |d: &ModelDescriptor| d.quality_tier == QualityTier::High;
        let found = match requirements.cost_limit {
            Some(limit) => filtered
                .iter()
                .position(|d| d.cost_per_1k_tokens <= limit && high_quality(*d)),
            None => filtered.iter().position(|d| high_quality(*d)),
        };
        if let Some(idx) = found {
            chosen_idx = idx;
        }
    }

    let alternatives = filtered
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != chosen_idx)
        .map(|(_, d)| d.name.clone())
        .collect();

    Ok(Choice {
        chosen: filtered[chosen_idx].clone(),
        fallback_used,
        alternatives,
    })
}

/// Select a model for `task_type` against the current registry and host pressure.
pub async fn select_model(
    state: &AppState,
    task_type: &str,
    requirements: &Requirements,
) -> Result<SelectionResponse, AppError> {
    let snapshot = state.resources.sample();
    let pressure = snapshot.memory_pressure();

    let inference = state.inference().await;
    let (descriptors, source) = registry_service::discover(inference.as_ref()).await;

    let choice = choose(task_type, requirements, &descriptors, pressure)?;

    tracing::info!(
        task_type,
        model = %choice.chosen.name,
        fallback_used = choice.fallback_used,
        pressure,
        ?source,
        complexity = requirements.complexity.as_deref(),
        priority = requirements.priority.as_deref(),
        "Model selected"
    );

    Ok(SelectionResponse {
        request_id: Uuid::new_v4(),
        selected_model: choice.chosen.name.clone(),
        task_type: task_type.to_string(),
        fallback_used: choice.fallback_used,
        alternatives: choice.alternatives,
        system_metrics: SystemMetrics::from(&snapshot),
        model_info: choice.chosen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::descriptor::{Capability, SpeedClass};
    use crate::services::registry_service::preset_descriptors;

    fn model(name: &str, ram: f64, tier: QualityTier, cost: f64) -> ModelDescriptor {
        ModelDescriptor {
            name: name.into(),
            capabilities: vec![Capability::Completion, Capability::Reasoning],
            ram_required_gb: ram,
            speed_class: SpeedClass::Medium,
            quality_tier: tier,
            cost_per_1k_tokens: cost,
            best_for: vec![],
        }
    }

    fn seed_registry() -> Vec<ModelDescriptor> {
        vec![
            model("M-fast", 2.0, QualityTier::Good, 0.001),
            model("M-mid", 5.0, QualityTier::High, 0.005),
            model("M-big", 12.0, QualityTier::High, 0.010),
        ]
    }

    fn cost_limit(limit: f64) -> Requirements {
        Requirements {
            cost_limit: Some(limit),
            ..Default::default()
        }
    }

    #[test]
    fn cost_cap_picks_first_affordable_high_tier() {
        let choice = choose("completion", &cost_limit(0.005), &seed_registry(), 0.1).unwrap();
        assert_eq!(choice.chosen.name, "M-mid");
        assert!(!choice.fallback_used);
        assert_eq!(choice.alternatives, vec!["M-fast", "M-big"]);
    }

    #[test]
    fn cost_cap_with_no_match_keeps_first() {
        let choice = choose("completion", &cost_limit(0.002), &seed_registry(), 0.1).unwrap();
        assert_eq!(choice.chosen.name, "M-fast");
        assert!(!choice.fallback_used);
    }

    #[test]
    fn without_cap_picks_first_high_tier() {
        let choice = choose("reasoning", &Requirements::default(), &seed_registry(), 0.1).unwrap();
        assert_eq!(choice.chosen.name, "M-mid");
    }

    #[test]
    fn pressure_mode_picks_smallest_ram() {
        let mut registry = seed_registry();
        registry.rotate_left(1); // M-mid, M-big, M-fast
        let choice = choose("completion", &Requirements::default(), &registry, 0.9).unwrap();
        assert_eq!(choice.chosen.name, "M-fast");
        assert!(choice.fallback_used);
        assert_eq!(choice.alternatives, vec!["M-mid", "M-big"]);
    }

    #[test]
    fn pressure_mode_keeps_first_when_already_smallest() {
        let choice = choose("completion", &Requirements::default(), &seed_registry(), 0.9).unwrap();
        assert_eq!(choice.chosen.name, "M-fast");
        assert!(!choice.fallback_used);
    }

    #[test]
    fn pressure_threshold_is_strict() {
        let mut registry = seed_registry();
        registry.rotate_left(1);
        let at = choose("completion", &Requirements::default(), &registry, 0.8).unwrap();
        assert_eq!(at.chosen.name, "M-mid");
        assert!(!at.fallback_used);

        let above = choose("completion", &Requirements::default(), &registry, 0.81).unwrap();
        assert_eq!(above.chosen.name, "M-fast");
        assert!(above.fallback_used);
    }

    #[test]
    fn ties_resolve_to_earlier_entry() {
        let registry = vec![
            model("first", 4.0, QualityTier::High, 0.008),
            model("second", 4.0, QualityTier::High, 0.008),
        ];
        assert_eq!(
            choose("completion", &Requirements::default(), &registry, 0.95)
                .unwrap()
                .chosen
                .name,
            "first"
        );
        assert_eq!(
            choose("completion", &Requirements::default(), &registry, 0.1)
                .unwrap()
                .chosen
                .name,
            "first"
        );
    }

    #[test]
    fn no_candidate_for_unsupported_task() {
        let mut embed = model("M-embed", 0.5, QualityTier::Basic, 0.001);
        embed.capabilities = vec![Capability::Embedding];
        let err = choose("reasoning", &Requirements::default(), &[embed], 0.1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no models available for task type: reasoning"
        );
    }

    #[test]
    fn unknown_task_has_no_candidate() {
        assert!(matches!(
            choose("poetry", &Requirements::default(), &seed_registry(), 0.1),
            Err(AppError::NoCandidate(_))
        ));
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let registry = preset_descriptors();
        for pressure in [0.1, 0.85] {
            let a = choose("code", &cost_limit(0.01), &registry, pressure).unwrap();
            let b = choose("code", &cost_limit(0.01), &registry, pressure).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn presets_serve_every_generation_task() {
        let registry = preset_descriptors();
        for task in ["completion", "reasoning", "code", "analysis"] {
            for pressure in [0.1, 0.95] {
                assert!(choose(task, &Requirements::default(), &registry, pressure).is_ok());
            }
        }
    }
}
