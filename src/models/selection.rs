use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::descriptor::ModelDescriptor;
use super::resource_snapshot::SystemMetrics;

/// Recognized requirement keys. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Requirements {
    #[serde(rename = "costLimit")]
    pub cost_limit: Option<f64>,
    #[serde(rename = "maxTokens")]
    pub max_tokens: Option<i64>,
    pub temperature: Option<f64>,
    pub complexity: Option<String>,
    pub priority: Option<String>,
}

/// POST /ai/select-model body.
#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    pub task_type: Option<String>,
    #[serde(default)]
    pub requirements: Option<Requirements>,
}

/// POST /ai/route-request body.
#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub task_type: Option<String>,
    pub prompt: Option<String>,
    #[serde(default)]
    pub requirements: Option<Requirements>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionResponse {
    pub request_id: Uuid,
    pub selected_model: String,
    pub task_type: String,
    pub fallback_used: bool,
    pub alternatives: Vec<String>,
    pub system_metrics: SystemMetrics,
    pub model_info: ModelDescriptor,
}

/// Per-call measurements attached to a route response.
#[derive(Debug, Clone, Serialize)]
pub struct CallMetrics {
    pub response_time_ms: u64,
    pub tokens_generated: Option<i64>,
    pub prompt_tokens: Option<i64>,
    pub cost_estimate: f64,
    pub memory_pressure: f64,
    /// Daemon-reported timings, converted from nanoseconds.
    pub total_duration_ms: Option<u64>,
    pub load_duration_ms: Option<u64>,
    pub eval_duration_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct RouteResponse {
    #[serde(flatten)]
    pub selection: SelectionResponse,
    pub prompt: String,
    pub response: String,
    pub metrics: CallMetrics,
}
