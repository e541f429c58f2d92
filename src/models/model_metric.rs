use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::descriptor::ModelDescriptor;

/// Per-model rolling counters, upserted on every observed attempt.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ModelMetric {
    pub model_name: String,
    pub request_count: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub avg_response_time_ms: f64,
    pub current_load: i32,
    pub memory_usage_mb: f64,
    pub healthy: bool,
    pub last_used: DateTime<Utc>,
}

/// One observation fed into the metric upsert.
#[derive(Debug, Clone)]
pub struct ModelObservation {
    pub model_name: String,
    pub success: bool,
    pub response_time_ms: f64,
    pub current_load: i32,
    pub memory_usage_mb: f64,
}

/// Half-average smoother: reacts within one sample and keeps no history.
/// The Postgres upsert applies the same rule in SQL.
#[cfg(test)]
pub fn smooth_average(previous: f64, sample: f64) -> f64 {
    (previous + sample) / 2.0
}

/// Entry of GET /ai/models/status.
#[derive(Debug, Serialize)]
pub struct ModelStatus {
    #[serde(flatten)]
    pub descriptor: ModelDescriptor,
    pub metrics: Option<ModelMetric>,
    pub healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothing_halves_towards_sample() {
        assert_eq!(smooth_average(100.0, 300.0), 200.0);
        assert_eq!(smooth_average(200.0, 200.0), 200.0);
    }
}
