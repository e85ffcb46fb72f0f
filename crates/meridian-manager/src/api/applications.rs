//! Application management endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;

use meridian_core::descriptor::{AppParameter, InstanceParameter};
use meridian_core::instance::{
    AddConnectionRequest, AvailableInbound, AvailableOutbound, RemoveConnectionRequest,
    TargetApplication, TargetApplicationsFilter,
};
use meridian_core::{
    AddAppDescriptorRequest, AppDescriptor, AppInstance, DeployRequest, DeployResponse,
    DescriptorId, InstanceId, ModelError, OrganizationId, UndeployRequest,
};

use crate::error::ManagerError;

use super::AppState;

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Register a new application descriptor.
pub async fn add_descriptor(
    State(state): State<AppState>,
    Json(request): Json<AddAppDescriptorRequest>,
) -> Result<(StatusCode, Json<AppDescriptor>), (StatusCode, Json<ErrorResponse>)> {
    info!(
        organization_id = %request.organization_id,
        name = %request.name,
        "registering descriptor via API"
    );

    match state.manager.add_descriptor(request).await {
        Ok(descriptor) => Ok((StatusCode::CREATED, Json(descriptor))),
        Err(e) => Err(error_response(&e)),
    }
}

/// List an organization's descriptors.
pub async fn list_descriptors(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> Result<Json<Vec<AppDescriptor>>, (StatusCode, Json<ErrorResponse>)> {
    let organization_id = OrganizationId::new(organization_id);

    match state.manager.list_descriptors(&organization_id).await {
        Ok(descriptors) => Ok(Json(descriptors)),
        Err(e) => Err(error_response(&e)),
    }
}

/// Get a descriptor by ID.
pub async fn get_descriptor(
    State(state): State<AppState>,
    Path((organization_id, descriptor_id)): Path<(String, String)>,
) -> Result<Json<AppDescriptor>, (StatusCode, Json<ErrorResponse>)> {
    let organization_id = OrganizationId::new(organization_id);
    let descriptor_id = DescriptorId::new(descriptor_id);

    match state
        .manager
        .get_descriptor(&organization_id, &descriptor_id)
        .await
    {
        Ok(descriptor) => Ok(Json(descriptor)),
        Err(e) => Err(error_response(&e)),
    }
}

/// Remove a descriptor.
pub async fn remove_descriptor(
    State(state): State<AppState>,
    Path((organization_id, descriptor_id)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let organization_id = OrganizationId::new(organization_id);
    let descriptor_id = DescriptorId::new(descriptor_id);

    info!(
        organization_id = %organization_id,
        app_descriptor_id = %descriptor_id,
        "removing descriptor via API"
    );

    match state
        .manager
        .remove_descriptor(&organization_id, &descriptor_id)
        .await
    {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(error_response(&e)),
    }
}

/// Parameter definitions declared by a descriptor.
pub async fn list_descriptor_parameters(
    State(state): State<AppState>,
    Path((organization_id, descriptor_id)): Path<(String, String)>,
) -> Result<Json<Vec<AppParameter>>, (StatusCode, Json<ErrorResponse>)> {
    let organization_id = OrganizationId::new(organization_id);
    let descriptor_id = DescriptorId::new(descriptor_id);

    match state
        .manager
        .list_descriptor_parameters(&organization_id, &descriptor_id)
        .await
    {
        Ok(parameters) => Ok(Json(parameters)),
        Err(e) => Err(error_response(&e)),
    }
}

/// Deploy a registered descriptor.
pub async fn deploy(
    State(state): State<AppState>,
    Json(request): Json<DeployRequest>,
) -> Result<(StatusCode, Json<DeployResponse>), (StatusCode, Json<ErrorResponse>)> {
    info!(
        organization_id = %request.organization_id,
        app_descriptor_id = %request.app_descriptor_id,
        name = %request.name,
        "deploy requested via API"
    );

    match state.manager.deploy(request).await {
        Ok(response) => Ok((StatusCode::ACCEPTED, Json(response))),
        Err(e) => Err(error_response(&e)),
    }
}

/// Undeploy a running instance.
pub async fn undeploy(
    State(state): State<AppState>,
    Json(request): Json<UndeployRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    info!(
        organization_id = %request.organization_id,
        app_instance_id = %request.app_instance_id,
        "undeploy requested via API"
    );

    match state.manager.undeploy(request).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(error_response(&e)),
    }
}

/// List an organization's instances.
pub async fn list_instances(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> Result<Json<Vec<AppInstance>>, (StatusCode, Json<ErrorResponse>)> {
    let organization_id = OrganizationId::new(organization_id);

    match state.manager.list_instances(&organization_id).await {
        Ok(instances) => Ok(Json(instances)),
        Err(e) => Err(error_response(&e)),
    }
}

/// Get an instance by ID, connections resolved.
pub async fn get_instance(
    State(state): State<AppState>,
    Path((organization_id, instance_id)): Path<(String, String)>,
) -> Result<Json<AppInstance>, (StatusCode, Json<ErrorResponse>)> {
    let organization_id = OrganizationId::new(organization_id);
    let instance_id = InstanceId::new(instance_id);

    match state
        .manager
        .get_instance(&organization_id, &instance_id)
        .await
    {
        Ok(instance) => Ok(Json(instance)),
        Err(e) => Err(error_response(&e)),
    }
}

/// Parameter values an instance was deployed with.
pub async fn list_instance_parameters(
    State(state): State<AppState>,
    Path((organization_id, instance_id)): Path<(String, String)>,
) -> Result<Json<Vec<InstanceParameter>>, (StatusCode, Json<ErrorResponse>)> {
    let organization_id = OrganizationId::new(organization_id);
    let instance_id = InstanceId::new(instance_id);

    match state
        .manager
        .list_instance_parameters(&organization_id, &instance_id)
        .await
    {
        Ok(parameters) => Ok(Json(parameters)),
        Err(e) => Err(error_response(&e)),
    }
}

/// Register a connection between two instances.
pub async fn add_connection(
    State(state): State<AppState>,
    Json(request): Json<AddConnectionRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    match state.manager.add_connection(request).await {
        Ok(()) => Ok(StatusCode::CREATED),
        Err(e) => Err(error_response(&e)),
    }
}

/// Remove a connection between two instances.
pub async fn remove_connection(
    State(state): State<AppState>,
    Json(request): Json<RemoveConnectionRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    match state.manager.remove_connection(request).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(error_response(&e)),
    }
}

/// Inbound interfaces available for new connections.
pub async fn list_available_inbounds(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> Result<Json<Vec<AvailableInbound>>, (StatusCode, Json<ErrorResponse>)> {
    let organization_id = OrganizationId::new(organization_id);

    match state.manager.list_available_inbounds(&organization_id).await {
        Ok(inbounds) => Ok(Json(inbounds)),
        Err(e) => Err(error_response(&e)),
    }
}

/// Outbound interfaces declared by running instances.
pub async fn list_available_outbounds(
    State(state): State<AppState>,
    Path(organization_id): Path<String>,
) -> Result<Json<Vec<AvailableOutbound>>, (StatusCode, Json<ErrorResponse>)> {
    let organization_id = OrganizationId::new(organization_id);

    match state
        .manager
        .list_available_outbounds(&organization_id)
        .await
    {
        Ok(outbounds) => Ok(Json(outbounds)),
        Err(e) => Err(error_response(&e)),
    }
}

/// Instances a device group may target.
pub async fn target_applications(
    State(state): State<AppState>,
    Json(filter): Json<TargetApplicationsFilter>,
) -> Result<Json<Vec<TargetApplication>>, (StatusCode, Json<ErrorResponse>)> {
    match state.manager.target_applications(&filter).await {
        Ok(targets) => Ok(Json(targets)),
        Err(e) => Err(error_response(&e)),
    }
}

fn error_response(error: &ManagerError) -> (StatusCode, Json<ErrorResponse>) {
    (
        error_to_status(error),
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn error_to_status(error: &ManagerError) -> StatusCode {
    match error {
        ManagerError::Model(model) => match model {
            ModelError::Serialisation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        },
        ManagerError::DescriptorNotFound(_)
        | ManagerError::InstanceNotFound(_)
        | ManagerError::ConnectionNotFound
        | ManagerError::DeviceGroupNotFound(_) => StatusCode::NOT_FOUND,
        ManagerError::RequiredParameterMissing { .. }
        | ManagerError::RequiredOutboundMissing { .. }
        | ManagerError::InboundNotFound { .. }
        | ManagerError::OutboundNotFound { .. }
        | ManagerError::UndeployNeedsConfirmation
        | ManagerError::RequiredConnectionRemoval
        | ManagerError::DescriptorInUse => StatusCode::CONFLICT,
        ManagerError::DeviceGroupAccessDenied { .. } => StatusCode::FORBIDDEN,
        ManagerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use meridian_core::descriptor::{
        CollocationPolicy, InboundNetworkInterface, OutboundNetworkInterface, Service,
        ServiceGroup,
    };

    use crate::config::OrchestratorConfig;
    use crate::deployment::ApplicationManager;
    use crate::devices::DeviceRegistry;
    use crate::queue::{CommandQueue, MemoryQueue};
    use crate::settings::SettingsLookup;
    use crate::store::{ApplicationStore, ConnectionStore, MemoryStore};

    use super::*;

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

    fn descriptor_body() -> AddAppDescriptorRequest {
        AddAppDescriptorRequest {
            request_id: "req-1".to_string(),
            organization_id: OrganizationId::new("org-1"),
            name: "billing".to_string(),
            labels: HashMap::new(),
            configuration_options: HashMap::new(),
            environment_variables: HashMap::new(),
            rules: Vec::new(),
            groups: vec![ServiceGroup {
                name: "g1".to_string(),
                services: vec![Service {
                    name: "service1".to_string(),
                    image: "nginx:1.12".to_string(),
                    credentials: None,
                    specs: None,
                    storage: Vec::new(),
                    exposed_ports: Vec::new(),
                    environment_variables: HashMap::new(),
                    configs: Vec::new(),
                    labels: HashMap::new(),
                    deploy_after: Vec::new(),
                    run_arguments: Vec::new(),
                }],
                policy: CollocationPolicy::SameCluster,
                specs: None,
                labels: HashMap::new(),
            }],
            parameters: Vec::new(),
            inbound_net_interfaces: vec![InboundNetworkInterface {
                name: "in1".to_string(),
            }],
            outbound_net_interfaces: vec![OutboundNetworkInterface {
                name: "out1".to_string(),
                required: false,
            }],
        }
    }

    fn json_request(method: &str, uri: &str, body: &impl serde::Serialize) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn add_descriptor_returns_created() {
        let state = make_app_state();
        let app = super::super::router(state);

        let response = app
            .oneshot(json_request("POST", "/api/v1/descriptors", &descriptor_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn add_descriptor_without_groups_is_bad_request() {
        let state = make_app_state();
        let app = super::super::router(state);

        let mut body = descriptor_body();
        body.groups.clear();
        let response = app
            .oneshot(json_request("POST", "/api/v1/descriptors", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_descriptor_not_found() {
        let state = make_app_state();
        let app = super::super::router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/organizations/org-1/descriptors/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deploy_and_fetch_the_instance() {
        let state = make_app_state();
        let descriptor = state
            .manager
            .add_descriptor(descriptor_body())
            .await
            .unwrap();

        let request = DeployRequest {
            organization_id: OrganizationId::new("org-1"),
            app_descriptor_id: descriptor.app_descriptor_id.clone(),
            name: "run-1".to_string(),
            parameters: Vec::new(),
            outbound_connections: Vec::new(),
        };
        let response = super::super::router(state.clone())
            .oneshot(json_request("POST", "/api/v1/deploy", &request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let deploy: DeployResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(deploy.request_id.starts_with("app-mngr-"));

        let uri = format!(
            "/api/v1/organizations/org-1/instances/{}",
            deploy.app_instance_id
        );
        let response = super::super::router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn deploy_of_an_unknown_descriptor_is_not_found() {
        let state = make_app_state();
        let app = super::super::router(state);

        let request = DeployRequest {
            organization_id: OrganizationId::new("org-1"),
            app_descriptor_id: DescriptorId::new("ghost"),
            name: "run-1".to_string(),
            parameters: Vec::new(),
            outbound_connections: Vec::new(),
        };
        let response = app
            .oneshot(json_request("POST", "/api/v1/deploy", &request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn undeploy_returns_no_content() {
        let state = make_app_state();
        let descriptor = state
            .manager
            .add_descriptor(descriptor_body())
            .await
            .unwrap();
        let deployed = state
            .manager
            .deploy(DeployRequest {
                organization_id: OrganizationId::new("org-1"),
                app_descriptor_id: descriptor.app_descriptor_id.clone(),
                name: "run-1".to_string(),
                parameters: Vec::new(),
                outbound_connections: Vec::new(),
            })
            .await
            .unwrap();

        let request = UndeployRequest {
            organization_id: OrganizationId::new("org-1"),
            app_instance_id: deployed.app_instance_id,
            user_confirmation: false,
        };
        let response = super::super::router(state)
            .oneshot(json_request("POST", "/api/v1/undeploy", &request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn target_applications_with_an_unknown_group_is_not_found() {
        let state = make_app_state();
        let app = super::super::router(state);

        let filter = TargetApplicationsFilter {
            organization_id: OrganizationId::new("org-1"),
            device_group_id: "dg-1".to_string(),
            device_group_name: "sensors".to_string(),
            match_labels: HashMap::new(),
        };
        let response = app
            .oneshot(json_request("POST", "/api/v1/target-applications", &filter))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
