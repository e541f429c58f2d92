use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use redis::aio::ConnectionManager;
use tokio::sync::RwLock;

use crate::clients::circuit_breaker::CircuitBreaker;
use crate::clients::containers::ContainerClient;
use crate::clients::inference::InferenceClient;
use crate::config::Config;
use crate::services::resource_service::ResourceMonitor;
use crate::store::TelemetryStore;

/// Swappable handles to downstream dependencies. `None` means not connected.
#[derive(Clone, Default)]
pub struct Dependencies {
    pub store: Option<Arc<dyn TelemetryStore>>,
    pub cache: Option<ConnectionManager>,
    pub inference: Option<InferenceClient>,
    pub containers: Option<ContainerClient>,
}

/// Set while a reconnect for that dependency is in flight.
#[derive(Default)]
pub struct ReconnectFlags {
    pub store: AtomicBool,
    pub cache: AtomicBool,
}

/// In-flight generation count per model.
#[derive(Default)]
pub struct LoadTracker {
    inflight: Mutex<HashMap<String, i32>>,
}

impl LoadTracker {
    /// Register a call; the returned guard releases it on drop.
    pub fn start(self: &Arc<Self>, model: &str) -> LoadGuard {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        let count = inflight.entry(model.to_string()).or_insert(0);
        *count += 1;
        LoadGuard {
            tracker: Arc::clone(self),
            model: model.to_string(),
            observed: *count,
        }
    }
}

pub struct LoadGuard {
    tracker: Arc<LoadTracker>,
    model: String,
    /// In-flight count including this call, taken when it started.
    pub observed: i32,
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        let mut inflight = self
            .tracker
            .inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(count) = inflight.get_mut(&self.model) {
            *count -= 1;
            if *count <= 0 {
                inflight.remove(&self.model);
            }
        }
    }
}

pub struct AppState {
    pub config: Config,
    pub deps: RwLock<Dependencies>,
    pub reconnecting: ReconnectFlags,
    pub ollama_breaker: Arc<CircuitBreaker>,
    pub resources: ResourceMonitor,
    pub load: Arc<LoadTracker>,
}

impl AppState {
    pub fn new(config: Config, resources: ResourceMonitor) -> Self {
        let http_client = reqwest::Client::new();
        let ollama_breaker = Arc::new(CircuitBreaker::with_defaults("ollama"));
        let inference = InferenceClient::new(
            http_client.clone(),
            config.ollama_url(),
            ollama_breaker.clone(),
        );
        let containers = config
            .docker_url()
            .map(|url| ContainerClient::new(http_client.clone(), url));

        Self {
            config,
            deps: RwLock::new(Dependencies {
                store: None,
                cache: None,
                inference: Some(inference),
                containers,
            }),
            reconnecting: ReconnectFlags::default(),
            ollama_breaker,
            resources,
            load: Arc::new(LoadTracker::default()),
        }
    }

    // Readers copy the handle out and release the lock before any I/O.

    pub async fn store(&self) -> Option<Arc<dyn TelemetryStore>> {
        self.deps.read().await.store.clone()
    }

    pub async fn cache(&self) -> Option<ConnectionManager> {
        self.deps.read().await.cache.clone()
    }

    pub async fn inference(&self) -> Option<InferenceClient> {
        self.deps.read().await.inference.clone()
    }

    pub async fn containers(&self) -> Option<ContainerClient> {
        self.deps.read().await.containers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_guard_tracks_inflight_calls() {
        let tracker = Arc::new(LoadTracker::default());
        let first = tracker.start("llama3");
        let second = tracker.start("llama3");
        assert_eq!(first.observed, 1);
        assert_eq!(second.observed, 2);
        drop(first);
        assert_eq!(tracker.start("llama3").observed, 2);
        drop(second);
        assert_eq!(tracker.start("llama3").observed, 1);
        assert!(tracker.inflight.lock().unwrap().is_empty());
    }
}
