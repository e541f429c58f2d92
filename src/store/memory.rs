//! In-memory store used by tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use super::TelemetryStore;
use crate::error::AppError;
use crate::models::model_metric::{smooth_average, ModelMetric, ModelObservation};
use crate::models::request_record::RequestRecord;
use crate::models::resource_snapshot::SystemResourceSnapshot;

#[derive(Default)]
pub struct MemoryStore {
    pub requests: Mutex<Vec<RequestRecord>>,
    pub metrics: Mutex<Vec<ModelMetric>>,
    pub snapshots: Mutex<Vec<SystemResourceSnapshot>>,
    pub unreachable: AtomicBool,
    pub closed: AtomicBool,
}

impl MemoryStore {
    fn check(&self) -> Result<(), AppError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(AppError::Internal("store unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        self.check()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn insert_request(&self, record: &RequestRecord) -> Result<(), AppError> {
        self.check()?;
        let mut requests = self.requests.lock().await;
        if requests.iter().any(|r| r.request_id == record.request_id) {
            return Err(AppError::Internal("duplicate request_id".into()));
        }
        requests.push(record.clone());
        Ok(())
    }

    async fn upsert_model_metric(&self, obs: &ModelObservation) -> Result<(), AppError> {
        self.check()?;
        let mut metrics = self.metrics.lock().await;
        let now = Utc::now();
        match metrics.iter_mut().find(|m| m.model_name == obs.model_name) {
            Some(row) => {
                row.request_count += 1;
                row.success_count += i64::from(obs.success);
                row.error_count += i64::from(!obs.success);
                row.avg_response_time_ms =
                    smooth_average(row.avg_response_time_ms, obs.response_time_ms);
                row.current_load = obs.current_load;
                row.memory_usage_mb = obs.memory_usage_mb;
                row.healthy = obs.success;
                row.last_used = now;
            }
            None => metrics.push(ModelMetric {
                model_name: obs.model_name.clone(),
                request_count: 1,
                success_count: i64::from(obs.success),
                error_count: i64::from(!obs.success),
                avg_response_time_ms: obs.response_time_ms,
                current_load: obs.current_load,
                memory_usage_mb: obs.memory_usage_mb,
                healthy: obs.success,
                last_used: now,
            }),
        }
        Ok(())
    }

    async fn insert_resource_snapshot(
        &self,
        snapshot: &SystemResourceSnapshot,
    ) -> Result<(), AppError> {
        self.check()?;
        self.snapshots.lock().await.push(snapshot.clone());
        Ok(())
    }

    async fn list_model_metrics(&self) -> Result<Vec<ModelMetric>, AppError> {
        self.check()?;
        Ok(self.metrics.lock().await.clone())
    }

    async fn resource_history(&self, hours: i64) -> Result<Vec<SystemResourceSnapshot>, AppError> {
        self.check()?;
        let cutoff = Utc::now() - Duration::hours(hours);
        Ok(self
            .snapshots
            .lock()
            .await
            .iter()
            .filter(|s| s.recorded_at > cutoff)
            .cloned()
            .collect())
    }
}
