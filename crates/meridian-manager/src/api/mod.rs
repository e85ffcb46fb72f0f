//! HTTP API for the manager service.
//!
//! Provides endpoints for:
//! - Descriptor management (register, query, list, remove)
//! - Deploy and undeploy operations
//! - Instance queries, connections and the device-facing catalog
//! - Health and readiness checks
//! - Prometheus metrics

mod applications;

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::deployment::ApplicationManager;

pub use applications::ErrorResponse;

/// Shared application state for the manager service.
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator behind every operation endpoint.
    pub manager: Arc<ApplicationManager>,
    /// When the service started serving, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    /// Create state around a manager.
    #[must_use]
    pub fn new(manager: Arc<ApplicationManager>) -> Self {
        Self {
            manager,
            started_at: Instant::now(),
        }
    }
}

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Descriptor management
        .route("/api/v1/descriptors", post(applications::add_descriptor))
        .route(
            "/api/v1/organizations/{org}/descriptors",
            get(applications::list_descriptors),
        )
        .route(
            "/api/v1/organizations/{org}/descriptors/{id}",
            get(applications::get_descriptor),
        )
        .route(
            "/api/v1/organizations/{org}/descriptors/{id}",
            delete(applications::remove_descriptor),
        )
        .route(
            "/api/v1/organizations/{org}/descriptors/{id}/parameters",
            get(applications::list_descriptor_parameters),
        )
        // Lifecycle
        .route("/api/v1/deploy", post(applications::deploy))
        .route("/api/v1/undeploy", post(applications::undeploy))
        // Instances
        .route(
            "/api/v1/organizations/{org}/instances",
            get(applications::list_instances),
        )
        .route(
            "/api/v1/organizations/{org}/instances/{id}",
            get(applications::get_instance),
        )
        .route(
            "/api/v1/organizations/{org}/instances/{id}/parameters",
            get(applications::list_instance_parameters),
        )
        // Connections
        .route("/api/v1/connections", post(applications::add_connection))
        .route(
            "/api/v1/connections/remove",
            post(applications::remove_connection),
        )
        .route(
            "/api/v1/organizations/{org}/inbounds",
            get(applications::list_available_inbounds),
        )
        .route(
            "/api/v1/organizations/{org}/outbounds",
            get(applications::list_available_outbounds),
        )
        // Device-facing catalog
        .route(
            "/api/v1/target-applications",
            post(applications::target_applications),
        )
        // Metrics
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse { status: "healthy" })
}

/// Readiness check endpoint.
///
/// Backend selection happens once at startup, so a serving process is a
/// ready process.
async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<ReadyResponse> {
    axum::Json(ReadyResponse {
        ready: true,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// Metrics endpoint.
async fn metrics(axum::extract::State(state): axum::extract::State<AppState>) -> String {
    let mut output = String::new();

    output.push_str("# HELP meridian_manager_up Whether the manager is serving requests\n");
    output.push_str("# TYPE meridian_manager_up gauge\n");
    output.push_str("meridian_manager_up 1\n");

    output.push_str("# HELP meridian_manager_uptime_seconds Seconds since the service started\n");
    output.push_str("# TYPE meridian_manager_uptime_seconds gauge\n");
    let _ = writeln!(
        output,
        "meridian_manager_uptime_seconds {}",
        state.started_at.elapsed().as_secs()
    );

    output
}

/// Health response.
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness response.
#[derive(serde::Serialize)]
struct ReadyResponse {
    ready: bool,
    uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::OrchestratorConfig;
    use crate::devices::DeviceRegistry;
    use crate::queue::{CommandQueue, MemoryQueue};
    use crate::settings::SettingsLookup;
    use crate::store::{ApplicationStore, ConnectionStore, MemoryStore};

    fn make_app_state() -> AppState {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let manager = ApplicationManager::new(
            Arc::clone(&store) as Arc<dyn ApplicationStore>,
            Arc::clone(&store) as Arc<dyn ConnectionStore>,
            queue as Arc<dyn CommandQueue>,
            Arc::clone(&store) as Arc<dyn DeviceRegistry>,
            Arc::clone(&store) as Arc<dyn SettingsLookup>,
            OrchestratorConfig::default(),
        );
        AppState::new(Arc::new(manager))
    }

    #[tokio::test]
    async fn health_endpoint() {
        let state = make_app_state();
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_endpoint() {
        let state = make_app_state();
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint() {
        let state = make_app_state();
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
