//! Meridian manager service binary.
//!
//! Accepts application descriptors and deploy requests, validates them and
//! hands the resulting commands to the scheduler.

use meridian_manager::config::ManagerConfig;
use meridian_manager::service::ManagerService;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("meridian_manager=info".parse()?),
        )
        .init();

    info!("meridian manager service starting");

    let config = ManagerConfig::load().unwrap_or_else(|e| {
        info!(error = %e, "failed to load config, using defaults");
        ManagerConfig::default()
    });

    info!(
        listen_addr = %config.server.listen_addr,
        store = %config.store.url,
        queue = %config.queue.url,
        "configuration loaded"
    );

    ManagerService::new(config).run().await?;

    Ok(())
}
