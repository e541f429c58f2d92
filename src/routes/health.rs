use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use redis::AsyncCommands;
use serde::Serialize;
use std::sync::Arc;

use crate::clients::circuit_breaker::CircuitStateName;
use crate::models::resource_snapshot::SystemResourceSnapshot;
use crate::state::AppState;
use crate::supervisor::{self, REDIS_RESOURCES_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unavailable,
}

/// `ok` when every dependency answers, `unavailable` when none do.
pub fn health_status(database: bool, redis: bool, ollama: bool) -> HealthStatus {
    match [database, redis, ollama].iter().filter(|up| **up).count() {
        3 => HealthStatus::Ok,
        0 => HealthStatus::Unavailable,
        _ => HealthStatus::Degraded,
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub database: bool,
    pub redis: bool,
    pub ollama: bool,
}

#[derive(Debug, Serialize)]
pub struct SystemHealth {
    #[serde(flatten)]
    pub snapshot: SystemResourceSnapshot,
    pub memory_pressure: f64,
    /// `cache` when read from the last published sample, `live` otherwise.
    pub source: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: String,
    pub services: ServiceHealth,
    pub system: SystemHealth,
    pub circuit: CircuitStateName,
    pub version: &'static str,
}

async fn cached_snapshot(state: &AppState) -> Option<SystemResourceSnapshot> {
    let mut conn = state.cache().await?;
    let raw: Option<String> = match conn.get(REDIS_RESOURCES_KEY).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!("Failed to read cached resource snapshot: {}", e);
            return None;
        }
    };
    raw.and_then(|json| serde_json::from_str(&json).ok())
}

/// GET /health. Always 200; the body carries the verdict.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let ollama = async {
        match state.inference().await {
            Some(inference) => inference.ping().await,
            None => false,
        }
    };
    let (database, redis, ollama) = tokio::join!(
        supervisor::store_healthy(&state),
        supervisor::cache_healthy(&state),
        ollama
    );

    let (snapshot, source) = match cached_snapshot(&state).await {
        Some(snapshot) => (snapshot, "cache"),
        None => (state.resources.sample(), "live"),
    };

    Json(HealthResponse {
        status: health_status(database, redis, ollama),
        timestamp: Utc::now().to_rfc3339(),
        services: ServiceHealth {
            database,
            redis,
            ollama,
        },
        system: SystemHealth {
            memory_pressure: snapshot.memory_pressure(),
            snapshot,
            source,
        },
        circuit: state.ollama_breaker.state().await.name(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}
