use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::clients::circuit_breaker::CircuitStateName;
use crate::clients::inference::GenerateOptions;
use crate::error::AppError;
use crate::models::model_metric::ModelStatus;
use crate::models::resource_snapshot::SystemResourceSnapshot;
use crate::models::selection::{
    CallMetrics, RouteRequest, RouteResponse, SelectionRequest, SelectionResponse,
};
use crate::services::registry_service::{self, RegistrySource};
use crate::services::telemetry_service::{self, RouteAttempt};
use crate::services::selection_service;
use crate::state::AppState;

const DEFAULT_HISTORY_HOURS: i64 = 24;
const MAX_HISTORY_HOURS: i64 = 168;

/// Parse a raw body so that every malformed payload maps to 400.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON: {e}")))
}

fn required_field(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{field} is required")))
}

/// POST /ai/select-model
async fn select_model(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SelectionResponse>, AppError> {
    let req: SelectionRequest = parse_body(&body)?;
    let task_type = required_field(req.task_type, "task_type")?;
    let requirements = req.requirements.unwrap_or_default();

    let selection = selection_service::select_model(&state, &task_type, &requirements).await?;
    Ok(Json(selection))
}

/// POST /ai/route-request: select a model, generate, then record the attempt.
async fn route_request(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<RouteResponse>, AppError> {
    let req: RouteRequest = parse_body(&body)?;
    let task_type = required_field(req.task_type, "task_type")?;
    let prompt = required_field(req.prompt, "prompt")?;
    let requirements = req.requirements.unwrap_or_default();

    let selection = selection_service::select_model(&state, &task_type, &requirements).await?;

    let inference = state
        .inference()
        .await
        .ok_or_else(|| AppError::ServiceDegraded("inference daemon not configured".into()))?;

    let model = selection.selected_model.clone();
    let options = GenerateOptions {
        num_predict: requirements.max_tokens,
        temperature: requirements.temperature,
    };

    let load = state.load.start(&model);
    let started = Instant::now();
    let result = inference.generate(&model, &prompt, options).await;
    let response_time_ms = started.elapsed().as_millis() as u64;
    let current_load = load.observed;
    drop(load);

    let pressure = selection.system_metrics.memory_pressure;
    let mut attempt = RouteAttempt {
        request_id: selection.request_id,
        task_type: task_type.clone(),
        selected_model: model.clone(),
        fallback_used: selection.fallback_used,
        response_time_ms,
        outcome: Ok(()),
        resource_pressure: pressure,
        cost_estimate: 0.0,
        current_load,
        memory_usage_mb: selection.model_info.memory_usage_mb(),
    };

    let generated = match result {
        Ok(generated) => generated,
        Err(e) => {
            attempt.outcome = Err(e.to_string());
            tokio::spawn(telemetry_service::record_attempt(state.store().await, attempt));
            return Err(match e {
                AppError::CircuitOpen => {
                    AppError::ServiceDegraded("inference circuit open".into())
                }
                other => other,
            });
        }
    };

    // Priced from the descriptor the selection was made against.
    attempt.cost_estimate =
        telemetry_service::estimate_cost(generated.eval_count, Some(&selection.model_info));

    let metrics = CallMetrics {
        response_time_ms,
        tokens_generated: generated.eval_count,
        prompt_tokens: generated.prompt_eval_count,
        cost_estimate: attempt.cost_estimate,
        memory_pressure: pressure,
        total_duration_ms: generated.total_duration_ms(),
        load_duration_ms: generated.load_duration_ms(),
        eval_duration_ms: generated.eval_duration_ms(),
    };

    tracing::info!(
        request_id = %selection.request_id,
        model = %model,
        response_time_ms,
        tokens = generated.eval_count.unwrap_or(0),
        "Request routed"
    );

    tokio::spawn(telemetry_service::record_attempt(state.store().await, attempt));

    Ok(Json(RouteResponse {
        selection,
        prompt,
        response: generated.response,
        metrics,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub memory_pressure: f64,
    pub resources: SystemResourceSnapshot,
    pub registry_source: RegistrySource,
    pub circuit: CircuitStateName,
    pub circuit_failures: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsStatusResponse {
    pub models: Vec<ModelStatus>,
    pub total_models: usize,
    pub healthy_models: usize,
    pub system_health: SystemHealth,
}

/// GET /ai/models/status: registry merged with per-model counters.
async fn models_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ModelsStatusResponse>, AppError> {
    let inference = state.inference().await;
    let (descriptors, registry_source) = registry_service::discover(inference.as_ref()).await;

    let metrics = match state.store().await {
        Some(store) => store.list_model_metrics().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load model metrics: {}", e);
            Vec::new()
        }),
        None => Vec::new(),
    };

    let models: Vec<ModelStatus> = descriptors
        .into_iter()
        .map(|descriptor| {
            let metrics = metrics
                .iter()
                .find(|m| m.model_name == descriptor.name)
                .cloned();
            // Unobserved models are assumed healthy.
            let healthy = metrics.as_ref().map(|m| m.healthy).unwrap_or(true);
            ModelStatus {
                descriptor,
                metrics,
                healthy,
            }
        })
        .collect();

    let resources = state.resources.sample();
    let healthy_models = models.iter().filter(|m| m.healthy).count();

    Ok(Json(ModelsStatusResponse {
        total_models: models.len(),
        healthy_models,
        models,
        system_health: SystemHealth {
            memory_pressure: resources.memory_pressure(),
            resources,
            registry_source,
            circuit: state.ollama_breaker.state().await.name(),
            circuit_failures: state.ollama_breaker.failures().await,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct ResourceMetricsQuery {
    pub hours: Option<String>,
}

/// Parse the `hours` window; blank means the default, out-of-range values are clamped.
fn history_hours(raw: Option<&str>) -> Result<i64, AppError> {
    let hours = match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse::<i64>()
            .map_err(|_| AppError::BadRequest(format!("hours must be an integer, got {v:?}")))?,
        None => DEFAULT_HISTORY_HOURS,
    };
    Ok(hours.clamp(1, MAX_HISTORY_HOURS))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetricsResponse {
    pub current: SystemResourceSnapshot,
    pub history: Vec<SystemResourceSnapshot>,
    pub memory_pressure: f64,
}

/// GET /ai/resources/metrics?hours=N
async fn resource_metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResourceMetricsQuery>,
) -> Result<Json<ResourceMetricsResponse>, AppError> {
    let hours = history_hours(query.hours.as_deref())?;

    let history = match state.store().await {
        Some(store) => store.resource_history(hours).await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load resource history: {}", e);
            Vec::new()
        }),
        None => Vec::new(),
    };

    let current = state.resources.sample();
    Ok(Json(ResourceMetricsResponse {
        memory_pressure: current.memory_pressure(),
        current,
        history,
    }))
}

/// Build the orchestrator router (to be nested under /ai)
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/select-model", post(select_model))
        .route("/route-request", post(route_request))
        .route("/models/status", get(models_status))
        .route("/resources/metrics", get(resource_metrics))
}
