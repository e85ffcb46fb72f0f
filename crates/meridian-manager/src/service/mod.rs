//! Service lifecycle management.
//!
//! Provides the main service runner with signal handling and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api;
use crate::config::{ManagerConfig, StoreBackend};
use crate::deployment::ApplicationManager;
use crate::devices::DeviceRegistry;
use crate::error::{ManagerError, ManagerResult};
use crate::queue::{create_queue, CommandQueue};
use crate::settings::SettingsLookup;
use crate::store::{ApplicationStore, ConnectionStore, MemoryStore, RemoteStore};

/// The manager service.
///
/// Manages the lifecycle of the orchestration layer, including:
/// - Store and queue backends
/// - The application manager
/// - HTTP API server
/// - Signal handling and graceful shutdown
pub struct ManagerService {
    config: ManagerConfig,
    cancel: CancellationToken,
}

impl ManagerService {
    /// Create a new manager service with the given configuration.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the manager service.
    ///
    /// This will:
    /// 1. Connect to the store service (or fall back to the in-memory store)
    /// 2. Create the command queue
    /// 3. Create the application manager
    /// 4. Start the HTTP API server
    /// 5. Wait for shutdown signal
    pub async fn run(&self) -> ManagerResult<()> {
        let stores = self.create_stores().await;
        let queue = self.create_queue()?;

        let manager = Arc::new(ApplicationManager::new(
            stores.applications,
            stores.connections,
            queue,
            stores.devices,
            stores.settings,
            self.config.orchestrator.clone(),
        ));
        info!("application manager initialised");

        let state = api::AppState::new(manager);
        let app = api::router(state);

        info!(
            listen_addr = %self.config.server.listen_addr,
            "manager service listening"
        );

        serve(&self.config.server.listen_addr, app, self.cancel.clone()).await?;

        info!("manager service shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn create_stores(&self) -> StoreHandles {
        match self.config.store.backend {
            StoreBackend::Remote => match self.connect_remote_store().await {
                Ok(handles) => handles,
                Err(e) => {
                    error!(
                        error = %e,
                        "store service unreachable, using in-memory store"
                    );
                    StoreHandles::from_shared(Arc::new(MemoryStore::new()))
                }
            },
            StoreBackend::Memory => {
                info!("using in-memory store");
                StoreHandles::from_shared(Arc::new(MemoryStore::new()))
            }
        }
    }

    async fn connect_remote_store(&self) -> ManagerResult<StoreHandles> {
        let store = RemoteStore::new(&self.config.store)?;
        store
            .wait_ready(Duration::from_secs(self.config.store.connect_wait_secs))
            .await?;
        info!(url = %self.config.store.url, "connected to the store service");
        Ok(StoreHandles::from_shared(Arc::new(store)))
    }

    fn create_queue(&self) -> ManagerResult<Arc<dyn CommandQueue>> {
        let queue = create_queue(&self.config.queue)?;
        info!(backend = ?self.config.queue.backend, "command queue configured");
        Ok(queue)
    }
}

/// One backing store viewed through each of the traits the manager consumes.
struct StoreHandles {
    applications: Arc<dyn ApplicationStore>,
    connections: Arc<dyn ConnectionStore>,
    devices: Arc<dyn DeviceRegistry>,
    settings: Arc<dyn SettingsLookup>,
}

impl StoreHandles {
    fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: ApplicationStore + ConnectionStore + DeviceRegistry + SettingsLookup + 'static,
    {
        Self {
            applications: Arc::clone(&store) as Arc<dyn ApplicationStore>,
            connections: Arc::clone(&store) as Arc<dyn ConnectionStore>,
            devices: Arc::clone(&store) as Arc<dyn DeviceRegistry>,
            settings: store as Arc<dyn SettingsLookup>,
        }
    }
}

/// Serve an axum router on the given address with graceful shutdown.
async fn serve(
    listen_addr: &str,
    app: axum::Router,
    cancel: CancellationToken,
) -> ManagerResult<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| ManagerError::Config(format!("failed to bind {listen_addr}: {e}")))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .map_err(|e| ManagerError::Config(format!("server error: {e}")))?;
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_creation() {
        let config = ManagerConfig::default();
        let service = ManagerService::new(config);
        assert!(!service.cancel.is_cancelled());
    }

    #[test]
    fn service_shutdown() {
        let config = ManagerConfig::default();
        let service = ManagerService::new(config);
        service.shutdown();
        assert!(service.cancel.is_cancelled());
    }
}
