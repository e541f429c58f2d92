pub mod health;
pub mod orchestrator;

use std::sync::Arc;

use axum::{http::HeaderValue, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

fn cors(origin: &str) -> CorsLayer {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origin
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

/// Full HTTP surface: `/health` plus the orchestrator API under `/ai`.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = cors(&state.config.cors_origin);

    Router::new()
        .merge(health::router())
        .nest("/ai", orchestrator::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
