use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::models::descriptor::ModelDescriptor;
use crate::models::model_metric::ModelObservation;
use crate::models::request_record::RequestRecord;
use crate::models::resource_snapshot::SystemResourceSnapshot;
use crate::store::TelemetryStore;

const PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything known about one resolved route attempt.
#[derive(Debug, Clone)]
pub struct RouteAttempt {
    pub request_id: Uuid,
    pub task_type: String,
    pub selected_model: String,
    pub fallback_used: bool,
    pub response_time_ms: u64,
    /// `Err` carries the failure message.
    pub outcome: Result<(), String>,
    pub resource_pressure: f64,
    pub cost_estimate: f64,
    pub current_load: i32,
    pub memory_usage_mb: f64,
}

/// `tokens / 1000 * cost_per_1k`; zero when tokens or the descriptor are unknown.
pub fn estimate_cost(tokens: Option<i64>, descriptor: Option<&ModelDescriptor>) -> f64 {
    match (tokens, descriptor) {
        (Some(tokens), Some(d)) if tokens > 0 => tokens as f64 / 1000.0 * d.cost_per_1k_tokens,
        _ => 0.0,
    }
}

impl RouteAttempt {
    pub fn audit_row(&self) -> RequestRecord {
        let (success, error_message, cost_estimate) = match &self.outcome {
            Ok(()) => (true, None, self.cost_estimate),
            Err(message) => {
                let message = if message.is_empty() {
                    "generation failed".to_string()
                } else {
                    message.clone()
                };
                (false, Some(message), 0.0)
            }
        };

        RequestRecord {
            request_id: self.request_id,
            task_type: self.task_type.clone(),
            selected_model: self.selected_model.clone(),
            fallback_used: self.fallback_used,
            response_time_ms: self.response_time_ms as i64,
            success,
            error_message,
            resource_pressure: self.resource_pressure,
            cost_estimate,
            created_at: Utc::now(),
        }
    }

    pub fn observation(&self) -> ModelObservation {
        ModelObservation {
            model_name: self.selected_model.clone(),
            success: self.outcome.is_ok(),
            response_time_ms: self.response_time_ms as f64,
            current_load: self.current_load,
            memory_usage_mb: self.memory_usage_mb,
        }
    }
}

/// Persist the audit row and metric upsert for one attempt. Failures are
/// logged and dropped; nothing is retried.
pub async fn record_attempt(store: Option<Arc<dyn TelemetryStore>>, attempt: RouteAttempt) {
    let Some(store) = store else {
        tracing::warn!(
            request_id = %attempt.request_id,
            "Store unavailable, dropping request telemetry"
        );
        return;
    };

    let row = attempt.audit_row();
    match tokio::time::timeout(PERSIST_TIMEOUT, store.insert_request(&row)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(request_id = %row.request_id, "Failed to insert request audit row: {}", e),
        Err(_) => tracing::error!(request_id = %row.request_id, "Timed out inserting request audit row"),
    }

    let observation = attempt.observation();
    match tokio::time::timeout(PERSIST_TIMEOUT, store.upsert_model_metric(&observation)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(model = %observation.model_name, "Failed to upsert model metrics: {}", e),
        Err(_) => tracing::error!(model = %observation.model_name, "Timed out upserting model metrics"),
    }
}

/// Append a host snapshot if the store is connected.
pub async fn record_snapshot(store: Option<Arc<dyn TelemetryStore>>, snapshot: &SystemResourceSnapshot) {
    let Some(store) = store else {
        tracing::debug!("Store unavailable, skipping resource snapshot");
        return;
    };
    match tokio::time::timeout(PERSIST_TIMEOUT, store.insert_resource_snapshot(snapshot)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Failed to insert resource snapshot: {}", e),
        Err(_) => tracing::error!("Timed out inserting resource snapshot"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::registry_service::describe;
    use crate::store::memory::MemoryStore;

    fn attempt(model: &str, outcome: Result<(), String>, ms: u64) -> RouteAttempt {
        RouteAttempt {
            request_id: Uuid::new_v4(),
            task_type: "completion".into(),
            selected_model: model.into(),
            fallback_used: false,
            response_time_ms: ms,
            outcome,
            resource_pressure: 0.4,
            cost_estimate: 0.012,
            current_load: 1,
            memory_usage_mb: 4096.0,
        }
    }

    #[test]
    fn cost_estimate_rules() {
        let d = describe("llama3:8b", 8 << 30);
        assert!((estimate_cost(Some(1500), Some(&d)) - 0.012).abs() < 1e-12);
        assert_eq!(estimate_cost(None, Some(&d)), 0.0);
        assert_eq!(estimate_cost(Some(1500), None), 0.0);
    }

    #[test]
    fn failed_attempt_row_has_message_and_zero_cost() {
        let row = attempt("m", Err("daemon returned 500".into()), 20).audit_row();
        assert!(!row.success);
        assert_eq!(row.error_message.as_deref(), Some("daemon returned 500"));
        assert_eq!(row.cost_estimate, 0.0);

        let empty = attempt("m", Err(String::new()), 20).audit_row();
        assert!(empty.error_message.is_some_and(|m| !m.is_empty()));
    }

    #[test]
    fn successful_attempt_row_has_no_message() {
        let row = attempt("m", Ok(()), 20).audit_row();
        assert!(row.success);
        assert!(row.error_message.is_none());
        assert_eq!(row.cost_estimate, 0.012);
    }

    #[tokio::test]
    async fn records_row_and_updates_counters() {
        let store = Arc::new(MemoryStore::default());
        let handle: Arc<dyn TelemetryStore> = store.clone();

        record_attempt(Some(handle.clone()), attempt("llama3", Ok(()), 100)).await;
        record_attempt(Some(handle.clone()), attempt("llama3", Ok(()), 300)).await;
        record_attempt(Some(handle), attempt("llama3", Err("boom".into()), 500)).await;

        assert_eq!(store.requests.lock().await.len(), 3);
        let metrics = store.metrics.lock().await;
        let row = &metrics[0];
        assert_eq!(row.request_count, 3);
        assert_eq!(row.success_count, 2);
        assert_eq!(row.error_count, 1);
        assert!(row.request_count >= row.success_count + row.error_count);
        // 100 -> (100+300)/2 = 200 -> (200+500)/2 = 350
        assert_eq!(row.avg_response_time_ms, 350.0);
        assert!(!row.healthy);
    }

    #[tokio::test]
    async fn unreachable_store_drops_silently() {
        let store = Arc::new(MemoryStore::default());
        store
            .unreachable
            .store(true, std::sync::atomic::Ordering::SeqCst);
        record_attempt(Some(store.clone() as Arc<dyn TelemetryStore>), attempt("m", Ok(()), 1)).await;
        record_attempt(None, attempt("m", Ok(()), 1)).await;
        assert!(store.requests.lock().await.is_empty());
    }
}
