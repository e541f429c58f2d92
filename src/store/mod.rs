pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::model_metric::{ModelMetric, ModelObservation};
use crate::models::request_record::RequestRecord;
use crate::models::resource_snapshot::SystemResourceSnapshot;

/// Relational store consumed by the telemetry recorder and the status routes.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Round-trip probe.
    async fn ping(&self) -> Result<(), AppError>;

    async fn close(&self);

    async fn insert_request(&self, record: &RequestRecord) -> Result<(), AppError>;

    /// Upsert keyed on model name; counters only ever increase.
    async fn upsert_model_metric(&self, observation: &ModelObservation) -> Result<(), AppError>;

    async fn insert_resource_snapshot(
        &self,
        snapshot: &SystemResourceSnapshot,
    ) -> Result<(), AppError>;

    async fn list_model_metrics(&self) -> Result<Vec<ModelMetric>, AppError>;

    /// Snapshots recorded within the last `hours`, oldest first.
    async fn resource_history(&self, hours: i64) -> Result<Vec<SystemResourceSnapshot>, AppError>;
}
