use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Append-only audit row: one per route attempt that reaches generation.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct RequestRecord {
    pub request_id: Uuid,
    pub task_type: String,
    pub selected_model: String,
    pub fallback_used: bool,
    pub response_time_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub resource_pressure: f64,
    pub cost_estimate: f64,
    pub created_at: DateTime<Utc>,
}
