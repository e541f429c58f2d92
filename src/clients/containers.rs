use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

const INFO_TIMEOUT: Duration = Duration::from_secs(5);

/// Subset of the container engine's `GET /info` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineInfo {
    #[serde(rename = "ServerVersion", default)]
    pub server_version: Option<String>,
    #[serde(rename = "Containers", default)]
    pub containers: Option<u64>,
    #[serde(rename = "ContainersRunning", default)]
    pub containers_running: Option<u64>,
}

/// Container engine collaborator. Only the `info` probe is part of its contract.
#[derive(Debug, Clone)]
pub struct ContainerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ContainerClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub async fn info(&self) -> Result<EngineInfo, AppError> {
        let resp = self
            .http
            .get(format!("{}/info", self.base_url))
            .timeout(INFO_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::Upstream(format!(
                "container engine returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }
}
