use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("no models available for task type: {0}")]
    NoCandidate(String),

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Service degraded: {0}")]
    ServiceDegraded(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::CircuitOpen | AppError::ServiceDegraded(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Reqwest(_) => StatusCode::BAD_GATEWAY,
            AppError::NoCandidate(_)
            | AppError::Upstream(_)
            | AppError::Internal(_)
            | AppError::Sqlx(_)
            | AppError::Redis(_)
            | AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::BadRequest(msg) => msg.clone(),
            AppError::NoCandidate(_) => self.to_string(),
            AppError::CircuitOpen => {
                tracing::warn!("Inference circuit open, refusing request");
                "Inference service temporarily unavailable".to_string()
            }
            AppError::ServiceDegraded(msg) => {
                tracing::warn!("Service degraded: {}", msg);
                format!("Service degraded: {msg}")
            }
            AppError::Upstream(msg) => {
                tracing::error!("Upstream failure: {}", msg);
                "Upstream service error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Sqlx(e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Reqwest(e) => {
                tracing::error!("HTTP client error: {}", e);
                "Upstream service error".to_string()
            }
            AppError::Anyhow(e) => {
                tracing::error!("Error: {}", e);
                "Internal server error".to_string()
            }
        };

        let body = Json(json!({ "error": { "message": message } }));
        (status, body).into_response()
    }
}
