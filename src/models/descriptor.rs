use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Task kinds a model can be declared able to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Completion,
    Reasoning,
    Code,
    Analysis,
    Embedding,
}

/// Exact tag match; task types are capability tags, not free text.
impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completion" => Ok(Capability::Completion),
            "reasoning" => Ok(Capability::Reasoning),
            "code" => Ok(Capability::Code),
            "analysis" => Ok(Capability::Analysis),
            "embedding" => Ok(Capability::Embedding),
            other => Err(format!("unknown capability: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedClass {
    Fast,
    Medium,
    Slow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Basic,
    Good,
    High,
}

/// Snapshot of one serveable model, regenerated on every registry lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub ram_required_gb: f64,
    pub speed_class: SpeedClass,
    pub quality_tier: QualityTier,
    pub cost_per_1k_tokens: f64,
    /// Advisory task tags, informational only.
    pub best_for: Vec<String>,
}

impl ModelDescriptor {
    pub fn supports(&self, task_type: &str) -> bool {
        task_type
            .parse::<Capability>()
            .map(|cap| self.capabilities.contains(&cap))
            .unwrap_or(false)
    }

    pub fn memory_usage_mb(&self) -> f64 {
        self.ram_required_gb * 1024.0
    }
}
