//! Brings up the relational store and cache with bounded exponential backoff,
//! then keeps them alive: a 10 s health tick probes and reconnects, a 30 s
//! metrics tick samples the host. Nothing here runs on the request path.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionInfo};
use sqlx::postgres::PgConnectOptions;

use crate::error::AppError;
use crate::services::telemetry_service;
use crate::state::AppState;
use crate::store::postgres::PgStore;
use crate::store::TelemetryStore;

pub const HEALTH_INTERVAL: Duration = Duration::from_secs(10);
pub const METRICS_INTERVAL: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub const REDIS_RESOURCES_KEY: &str = "orchestrator:resources:latest";
const REDIS_RESOURCES_TTL_SECS: u64 = 120;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// `min(base * 2^(attempt-1), cap)`, attempts counted from 1.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exp)
            .unwrap_or(self.cap)
            .min(self.cap)
    }

    /// Base delay plus uniform jitter in `[0, 0.25 * base)`.
    pub fn delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let base = self.base_delay(attempt);
        let max_jitter = base.as_secs_f64() * 0.25;
        let jitter = if max_jitter > 0.0 {
            rng.gen_range(0.0..max_jitter)
        } else {
            0.0
        };
        base + Duration::from_secs_f64(jitter)
    }
}

/// Run `op` until it succeeds or the policy's attempts are exhausted.
pub async fn retry_with_backoff<T, F, Fut>(
    name: &str,
    policy: &BackoffPolicy,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(dependency = name, attempt, "Connected after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= policy.max_attempts => {
                tracing::error!(
                    dependency = name,
                    attempts = attempt,
                    "Giving up on dependency: {}",
                    e
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay(attempt, &mut rand::thread_rng());
                tracing::warn!(
                    dependency = name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Connection attempt failed: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

async fn connect_store(options: PgConnectOptions) -> Result<Arc<dyn TelemetryStore>, AppError> {
    let store = PgStore::connect(options).await?;
    store.ping().await?;
    Ok(Arc::new(store))
}

async fn connect_cache(info: ConnectionInfo) -> Result<ConnectionManager, AppError> {
    let client = redis::Client::open(info)?;
    let mut conn = client.get_connection_manager().await?;
    ping_cache(&mut conn).await?;
    Ok(conn)
}

async fn ping_cache(conn: &mut ConnectionManager) -> Result<(), AppError> {
    let _pong: String = redis::cmd("PING").query_async(conn).await?;
    Ok(())
}

/// Clears the flag when the reconnect task ends, however it ends.
struct ReconnectGuard<'a>(&'a AtomicBool);

impl<'a> ReconnectGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Tear down the current store handle and run the backoff sequence.
/// A reconnect already in flight makes this a no-op.
pub async fn reconnect_store(state: &AppState, policy: &BackoffPolicy) {
    let Some(_guard) = ReconnectGuard::acquire(&state.reconnecting.store) else {
        tracing::debug!("Store reconnect already in progress");
        return;
    };

    let stale = state.deps.write().await.store.take();
    if let Some(stale) = stale {
        stale.close().await;
    }

    let options = state.config.pg_connect_options();
    match retry_with_backoff("postgres", policy, || connect_store(options.clone())).await {
        Ok(store) => {
            state.deps.write().await.store = Some(store);
            tracing::info!("Postgres connected");
        }
        Err(_) => tracing::error!("Postgres unavailable, serving without persistence"),
    }
}

pub async fn reconnect_cache(state: &AppState, policy: &BackoffPolicy) {
    let Some(_guard) = ReconnectGuard::acquire(&state.reconnecting.cache) else {
        tracing::debug!("Redis reconnect already in progress");
        return;
    };

    state.deps.write().await.cache = None;

    let info = state.config.redis_connection_info();
    match retry_with_backoff("redis", policy, || connect_cache(info.clone())).await {
        Ok(conn) => {
            state.deps.write().await.cache = Some(conn);
            tracing::info!("Redis connected");
        }
        Err(_) => tracing::error!("Redis unavailable, serving without cache"),
    }
}

/// Probe the store with a short deadline.
pub async fn store_healthy(state: &AppState) -> bool {
    match state.store().await {
        Some(store) => matches!(
            tokio::time::timeout(PROBE_TIMEOUT, store.ping()).await,
            Ok(Ok(()))
        ),
        None => false,
    }
}

pub async fn cache_healthy(state: &AppState) -> bool {
    match state.cache().await {
        Some(mut conn) => matches!(
            tokio::time::timeout(PROBE_TIMEOUT, ping_cache(&mut conn)).await,
            Ok(Ok(()))
        ),
        None => false,
    }
}

/// One health tick: probe each dependency and spawn a reconnect for any that fail.
pub async fn health_tick(state: &Arc<AppState>) {
    let (store_ok, cache_ok) = tokio::join!(store_healthy(state), cache_healthy(state));

    if !store_ok && !state.reconnecting.store.load(Ordering::Acquire) {
        tracing::warn!("Postgres health check failed, reconnecting");
        let state = state.clone();
        tokio::spawn(async move { reconnect_store(&state, &BackoffPolicy::default()).await });
    }

    if !cache_ok && !state.reconnecting.cache.load(Ordering::Acquire) {
        tracing::warn!("Redis health check failed, reconnecting");
        let state = state.clone();
        tokio::spawn(async move { reconnect_cache(&state, &BackoffPolicy::default()).await });
    }
}

/// One metrics tick: sample the host, persist it, and publish the latest sample to the cache.
pub async fn metrics_tick(state: &AppState) {
    let snapshot = state.resources.sample();
    telemetry_service::record_snapshot(state.store().await, &snapshot).await;

    if let Some(mut conn) = state.cache().await {
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                let published: Result<(), _> = conn
                    .set_ex(REDIS_RESOURCES_KEY, json, REDIS_RESOURCES_TTL_SECS)
                    .await;
                if let Err(e) = published {
                    tracing::warn!("Failed to publish resource snapshot: {}", e);
                }
            }
            Err(e) => tracing::error!("Resource snapshot serialization error: {}", e),
        }
    }
}

/// Connect everything in the background and start both tickers.
pub fn start(state: Arc<AppState>) {
    {
        let state = state.clone();
        tokio::spawn(async move { reconnect_store(&state, &BackoffPolicy::default()).await });
    }
    {
        let state = state.clone();
        tokio::spawn(async move { reconnect_cache(&state, &BackoffPolicy::default()).await });
    }
    {
        let state = state.clone();
        tokio::spawn(async move { probe_collaborators(&state).await });
    }
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_INTERVAL);
            // First tick fires immediately; the initial connects cover it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                health_tick(&state).await;
            }
        });
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(METRICS_INTERVAL);
        loop {
            ticker.tick().await;
            metrics_tick(&state).await;
        }
    });
}

/// Startup probes for the inference daemon and the container engine.
async fn probe_collaborators(state: &AppState) {
    if let Some(inference) = state.inference().await {
        if inference.ping().await {
            tracing::info!("Inference daemon reachable at {}", inference.base_url());
        } else {
            tracing::warn!(
                "Inference daemon not reachable at {}, selection will use presets",
                inference.base_url()
            );
        }
    }

    if let Some(containers) = state.containers().await {
        match containers.info().await {
            Ok(info) => tracing::info!(
                version = info.server_version.as_deref().unwrap_or("unknown"),
                containers = info.containers.unwrap_or(0),
                running = info.containers_running.unwrap_or(0),
                "Container engine reachable"
            ),
            Err(e) => {
                tracing::warn!("Container engine probe failed, dropping client: {}", e);
                state.deps.write().await.containers = None;
            }
        }
    }
}
