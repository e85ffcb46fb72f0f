//! Configuration for meridian-manager.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{ManagerError, ManagerResult};

/// Top-level configuration for the application manager.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ManagerConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Descriptor/instance store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Scheduling hand-off queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Orchestration behaviour configuration.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl ManagerConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `manager.toml` in the current directory (if present)
    /// 3. Environment variables with `MERIDIAN_MANAGER_` prefix
    pub fn load() -> ManagerResult<Self> {
        Figment::new()
            .merge(Toml::file("manager.toml"))
            .merge(Env::prefixed("MERIDIAN_MANAGER_").split("__"))
            .extract()
            .map_err(|e| ManagerError::Config(e.to_string()))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ManagerResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MERIDIAN_MANAGER_").split("__"))
            .extract()
            .map_err(|e| ManagerError::Config(e.to_string()))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8910".to_owned()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Descriptor/instance store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Which store backend to use.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Base URL of the remote store service.
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,

    /// How long to wait for the remote store at startup, in seconds.
    #[serde(default = "default_connect_wait_secs")]
    pub connect_wait_secs: u64,
}

fn default_store_url() -> String {
    "http://localhost:8800".to_owned()
}

const fn default_store_timeout_secs() -> u64 {
    10
}

const fn default_connect_wait_secs() -> u64 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_store_url(),
            timeout_secs: default_store_timeout_secs(),
            connect_wait_secs: default_connect_wait_secs(),
        }
    }
}

/// Which store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Remote store service over HTTP.
    #[default]
    Remote,

    /// In-memory store for testing and local development.
    Memory,
}

/// Scheduling hand-off queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Which queue backend to use.
    #[serde(default)]
    pub backend: QueueBackend,

    /// Base URL of the queue service.
    #[serde(default = "default_queue_url")]
    pub url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_queue_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_queue_url() -> String {
    "http://localhost:8820".to_owned()
}

const fn default_queue_timeout_secs() -> u64 {
    10
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            url: default_queue_url(),
            timeout_secs: default_queue_timeout_secs(),
        }
    }
}

/// Which hand-off queue backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    /// Queue service over HTTP.
    #[default]
    Http,

    /// In-process queue for testing.
    Memory,
}

/// Orchestration behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Bound applied independently to every external call, in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Storage size applied when a service declares none, in bytes.
    ///
    /// Overridden per organization through the settings lookup.
    #[serde(default = "default_storage_size_bytes")]
    pub default_storage_size_bytes: i64,
}

const fn default_call_timeout_secs() -> u64 {
    60
}

const fn default_storage_size_bytes() -> i64 {
    104_857_600
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            default_storage_size_bytes: default_storage_size_bytes(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ManagerConfig::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8910");
        assert_eq!(config.store.backend, StoreBackend::Remote);
        assert_eq!(config.queue.backend, QueueBackend::Http);
        assert_eq!(config.orchestrator.call_timeout_secs, 60);
        assert_eq!(config.orchestrator.default_storage_size_bytes, 104_857_600);
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            [server]
            listen_addr = "127.0.0.1:9100"

            [store]
            backend = "memory"

            [queue]
            backend = "memory"
            url = "http://queue:8820"

            [orchestrator]
            call_timeout_secs = 15
        "#;

        let config: ManagerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:9100");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.queue.backend, QueueBackend::Memory);
        assert_eq!(config.queue.url, "http://queue:8820");
        assert_eq!(config.orchestrator.call_timeout_secs, 15);
        assert_eq!(config.orchestrator.default_storage_size_bytes, 104_857_600);
    }
}
