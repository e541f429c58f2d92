mod clients;
mod config;
mod error;
mod models;
mod routes;
mod services;
mod state;
mod store;
mod supervisor;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use config::Config;
use services::resource_service::ResourceMonitor;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (ignore if missing)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let listen_addr = config.listen_addr();
    tracing::info!(
        ollama = %config.ollama_url(),
        "Starting model orchestrator on {}",
        listen_addr
    );

    let state = Arc::new(AppState::new(config, ResourceMonitor::new()));

    // Postgres, Redis and the collaborator probes come up in the background;
    // requests are served in degraded mode until they do.
    supervisor::start(state.clone());

    let app = routes::app(state);

    let listener = TcpListener::bind(&listen_addr).await?;
    tracing::info!("Listening on {}", listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
