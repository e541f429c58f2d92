use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::circuit_breaker::CircuitBreaker;
use crate::error::AppError;

const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const GENERATE_TIMEOUT: Duration = Duration::from_secs(30);
const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// One entry of `GET /api/tags`. `name` and `size` are required.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelTag {
    pub name: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
    pub options: GenerateOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    #[serde(default)]
    pub eval_count: Option<i64>,
    #[serde(default)]
    pub prompt_eval_count: Option<i64>,
    #[serde(default)]
    pub total_duration: Option<u64>,
    #[serde(default)]
    pub load_duration: Option<u64>,
    #[serde(default)]
    pub eval_duration: Option<u64>,
}

fn nanos_to_ms(nanos: Option<u64>) -> Option<u64> {
    nanos.map(|ns| ns / 1_000_000)
}

impl GenerateResponse {
    pub fn total_duration_ms(&self) -> Option<u64> {
        nanos_to_ms(self.total_duration)
    }

    pub fn load_duration_ms(&self) -> Option<u64> {
        nanos_to_ms(self.load_duration)
    }

    pub fn eval_duration_ms(&self) -> Option<u64> {
        nanos_to_ms(self.eval_duration)
    }
}

/// Typed JSON client for the inference daemon. Every call goes through the
/// shared breaker; the client never retries.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    base_url: String,
    breaker: Arc<CircuitBreaker>,
}

impl InferenceClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            breaker,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /api/tags
    pub async fn list_models(&self) -> Result<Vec<ModelTag>, AppError> {
        self.breaker.can_request().await?;

        let url = format!("{}/api/tags", self.base_url);
        let result = async {
            let resp = self
                .http
                .get(&url)
                .timeout(LIST_TIMEOUT)
                .send()
                .await
                .map_err(|e| AppError::Upstream(format!("list models: {e}")))?;
            check_status(&resp, "list models")?;
            let tags: TagsResponse = resp
                .json()
                .await
                .map_err(|e| AppError::Upstream(format!("list models: malformed response: {e}")))?;
            Ok(tags.models)
        }
        .await;

        self.record(&result).await;
        result
    }

    /// POST /api/generate, non-streaming.
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<GenerateResponse, AppError> {
        self.breaker.can_request().await?;

        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt,
            stream: false,
            options,
        };
        let result = async {
            let resp = self
                .http
                .post(&url)
                .timeout(GENERATE_TIMEOUT)
                .json(&body)
                .send()
                .await
                .map_err(|e| AppError::Upstream(format!("generate with {model}: {e}")))?;
            check_status(&resp, "generate")?;
            resp.json::<GenerateResponse>()
                .await
                .map_err(|e| AppError::Upstream(format!("generate: malformed response: {e}")))
        }
        .await;

        self.record(&result).await;
        result
    }

    /// Liveness probe; bypasses the breaker so health checks never trip it.
    pub async fn ping(&self) -> bool {
        let url = format!("{}/api/version", self.base_url);
        match self.http.get(&url).timeout(PING_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!("Inference ping failed: {}", e);
                false
            }
        }
    }

    async fn record<T>(&self, result: &Result<T, AppError>) {
        match result {
            Ok(_) => self.breaker.record_success().await,
            Err(e) => {
                tracing::warn!("Inference call failed: {}", e);
                self.breaker.record_failure().await
            }
        }
    }
}

fn check_status(resp: &reqwest::Response, op: &str) -> Result<(), AppError> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(AppError::Upstream(format!("{op}: daemon returned {status}")))
    }
}
