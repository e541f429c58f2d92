//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::services::resource_service::ResourceMonitor;
use crate::state::AppState;
use crate::store::memory::MemoryStore;
use crate::store::TelemetryStore;

/// Config pointing every dependency at localhost, with the daemon on `ollama_port`.
pub fn config(ollama_port: u16) -> Config {
    let port = ollama_port.to_string();
    Config::from_lookup(|key| match key {
        "ORCHESTRATOR_HOST" => Some("127.0.0.1".to_string()),
        "RESOURCE_PORTS_POSTGRES" | "RESOURCE_PORTS_REDIS" => Some("1".to_string()),
        "RESOURCE_PORTS_OLLAMA" => Some(port.clone()),
        "API_PORT" => Some("8080".to_string()),
        _ => None,
    })
    .expect("test config")
}

/// State with an in-memory store and a fixed memory pressure.
pub async fn state(ollama_port: u16, pressure: f64) -> (Arc<AppState>, Arc<MemoryStore>) {
    let state = Arc::new(AppState::new(
        config(ollama_port),
        ResourceMonitor::with_pressure(pressure),
    ));
    let store = Arc::new(MemoryStore::default());
    state.deps.write().await.store = Some(store.clone() as Arc<dyn TelemetryStore>);
    (state, store)
}

/// Wait for spawned telemetry writes to land.
pub async fn wait_for_requests(store: &MemoryStore, count: usize) {
    for _ in 0..100 {
        if store.requests.lock().await.len() >= count
            && store
                .metrics
                .lock()
                .await
                .iter()
                .map(|m| m.request_count as usize)
                .sum::<usize>()
                >= count
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
