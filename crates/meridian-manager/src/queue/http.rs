//! HTTP client for the scheduling queue service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::config::QueueConfig;
use crate::error::{ManagerError, ManagerResult};

use super::{CommandQueue, DeployCommand, UndeployCommand};

/// HTTP producer for the scheduling queue.
#[derive(Debug, Clone)]
pub struct HttpQueue {
    client: Client,
    base_url: String,
}

impl HttpQueue {
    /// Create a new queue client from configuration.
    pub fn new(config: &QueueConfig) -> ManagerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ManagerError::Http)?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
        })
    }

    /// Create a new queue client with a custom base URL.
    pub fn with_url(url: impl Into<String>) -> ManagerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(ManagerError::Http)?;

        Ok(Self {
            client,
            base_url: url.into().trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl CommandQueue for HttpQueue {
    async fn enqueue_deploy(&self, command: DeployCommand) -> ManagerResult<()> {
        let url = format!("{}/queue/deploy", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&command)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::ACCEPTED | StatusCode::OK | StatusCode::CREATED => Ok(()),
            status => Err(ManagerError::queue(format!(
                "failed to enqueue deploy command: {status}"
            ))),
        }
    }

    async fn enqueue_undeploy(&self, command: UndeployCommand) -> ManagerResult<()> {
        let url = format!("{}/queue/undeploy", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&command)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::ACCEPTED | StatusCode::OK | StatusCode::CREATED => Ok(()),
            status => Err(ManagerError::queue(format!(
                "failed to enqueue undeploy command: {status}"
            ))),
        }
    }
}
