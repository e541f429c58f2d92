use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use super::TelemetryStore;
use crate::error::AppError;
use crate::models::model_metric::{ModelMetric, ModelObservation};
use crate::models::request_record::RequestRecord;
use crate::models::resource_snapshot::SystemResourceSnapshot;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and provision the schema. Migrations are idempotent.
    pub async fn connect(options: PgConnectOptions) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(2))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Internal(format!("migration failed: {e}")))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl TelemetryStore for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn insert_request(&self, record: &RequestRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO orchestrator_requests (
                request_id, task_type, selected_model, fallback_used, response_time_ms,
                success, error_message, resource_pressure, cost_estimate, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.request_id)
        .bind(&record.task_type)
        .bind(&record.selected_model)
        .bind(record.fallback_used)
        .bind(record.response_time_ms)
        .bind(record.success)
        .bind(&record.error_message)
        .bind(record.resource_pressure)
        .bind(record.cost_estimate)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_model_metric(&self, obs: &ModelObservation) -> Result<(), AppError> {
        // First observation seeds the average with the sample; later ones halve towards it.
        sqlx::query(
            r#"
            INSERT INTO model_metrics (
                model_name, request_count, success_count, error_count,
                avg_response_time_ms, current_load, memory_usage_mb, healthy, last_used
            ) VALUES ($1, 1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (model_name) DO UPDATE SET
                request_count = model_metrics.request_count + 1,
                success_count = model_metrics.success_count + EXCLUDED.success_count,
                error_count = model_metrics.error_count + EXCLUDED.error_count,
                avg_response_time_ms =
                    (model_metrics.avg_response_time_ms + EXCLUDED.avg_response_time_ms) / 2,
                current_load = EXCLUDED.current_load,
                memory_usage_mb = EXCLUDED.memory_usage_mb,
                healthy = EXCLUDED.healthy,
                last_used = NOW()
            "#,
        )
        .bind(&obs.model_name)
        .bind(i64::from(obs.success))
        .bind(i64::from(!obs.success))
        .bind(obs.response_time_ms)
        .bind(obs.current_load)
        .bind(obs.memory_usage_mb)
        .bind(obs.success)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_resource_snapshot(
        &self,
        snapshot: &SystemResourceSnapshot,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO system_resources (
                memory_available_gb, memory_free_gb, memory_total_gb,
                cpu_usage_percent, swap_used_percent, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.memory_available_gb)
        .bind(snapshot.memory_free_gb)
        .bind(snapshot.memory_total_gb)
        .bind(snapshot.cpu_usage_percent)
        .bind(snapshot.swap_used_percent)
        .bind(snapshot.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_model_metrics(&self) -> Result<Vec<ModelMetric>, AppError> {
        let rows = sqlx::query_as::<_, ModelMetric>(
            r#"
            SELECT model_name, request_count, success_count, error_count,
                   avg_response_time_ms, current_load, memory_usage_mb, healthy, last_used
            FROM model_metrics
            ORDER BY model_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn resource_history(&self, hours: i64) -> Result<Vec<SystemResourceSnapshot>, AppError> {
        let rows = sqlx::query_as::<_, SystemResourceSnapshot>(
            r#"
            SELECT memory_available_gb, memory_free_gb, memory_total_gb,
                   cpu_usage_percent, swap_used_percent, recorded_at
            FROM system_resources
            WHERE recorded_at > NOW() - make_interval(hours => $1)
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(hours as i32)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
