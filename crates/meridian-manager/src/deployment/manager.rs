//! Application lifecycle orchestration.
//!
//! [`ApplicationManager`] owns the descriptor catalog, the deploy and
//! undeploy flows and the connection operations. It validates and prepares
//! every request, persists the resulting records and hands placement to the
//! platform scheduler through the command queue; it never places services
//! itself. Every call to a collaborator is bounded by the configured
//! timeout independently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use meridian_core::descriptor::{AppParameter, InstanceParameter};
use meridian_core::instance::{
    AddConnectionRequest, AvailableInbound, AvailableOutbound, RemoveConnectionRequest,
    TargetApplication, TargetApplicationsFilter,
};
use meridian_core::validation;
use meridian_core::{
    parametrize, AddAppDescriptorRequest, AppDescriptor, AppInstance, ConnectionInstance,
    ConnectionRequest, DeployRequest, DeployResponse, DescriptorId, InstanceId, ModelError,
    OrganizationId, UndeployRequest,
};

use crate::config::OrchestratorConfig;
use crate::deployment::checker::ConnectionChecker;
use crate::deployment::expansion;
use crate::devices::DeviceRegistry;
use crate::error::{ManagerError, ManagerResult};
use crate::queue::{CommandQueue, DeployCommand, ResolvedConnection, UndeployCommand};
use crate::settings::{SettingsLookup, DEFAULT_STORAGE_SIZE_KEY};
use crate::store::{ApplicationStore, ConnectionStore};

/// Orchestrates the application lifecycle on top of the platform services.
pub struct ApplicationManager {
    store: Arc<dyn ApplicationStore>,
    connections: Arc<dyn ConnectionStore>,
    queue: Arc<dyn CommandQueue>,
    devices: Arc<dyn DeviceRegistry>,
    settings: Arc<dyn SettingsLookup>,
    checker: ConnectionChecker,
    config: OrchestratorConfig,
}

impl ApplicationManager {
    /// Create a manager on top of the given collaborators.
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        connections: Arc<dyn ConnectionStore>,
        queue: Arc<dyn CommandQueue>,
        devices: Arc<dyn DeviceRegistry>,
        settings: Arc<dyn SettingsLookup>,
        config: OrchestratorConfig,
    ) -> Self {
        let checker = ConnectionChecker::new(
            Arc::clone(&store),
            Duration::from_secs(config.call_timeout_secs),
        );
        Self {
            store,
            connections,
            queue,
            devices,
            settings,
            checker,
            config,
        }
    }

    /// Validate and register a new application descriptor.
    ///
    /// The descriptor ID is minted here; the returned descriptor is the
    /// persisted record.
    pub async fn add_descriptor(
        &self,
        request: AddAppDescriptorRequest,
    ) -> ManagerResult<AppDescriptor> {
        validation::validate_add_descriptor_request(&request)?;

        let descriptor = AppDescriptor::from_request(request);
        validation::validate_descriptor(&descriptor)?;
        validation::validate_storage_paths(&descriptor)?;
        validation::validate_parameter_definitions(&descriptor)?;

        self.bounded(
            "descriptor persist",
            self.store.add_descriptor(descriptor.clone()),
        )
        .await?;

        info!(
            organization_id = %descriptor.organization_id,
            app_descriptor_id = %descriptor.app_descriptor_id,
            name = %descriptor.name,
            "registered application descriptor"
        );
        Ok(descriptor)
    }

    /// Fetch a registered descriptor.
    pub async fn get_descriptor(
        &self,
        organization_id: &OrganizationId,
        descriptor_id: &DescriptorId,
    ) -> ManagerResult<AppDescriptor> {
        validation::validate_organization_id(organization_id)?;
        self.bounded(
            "descriptor fetch",
            self.store.get_descriptor(organization_id, descriptor_id),
        )
        .await
    }

    /// List an organization's registered descriptors.
    pub async fn list_descriptors(
        &self,
        organization_id: &OrganizationId,
    ) -> ManagerResult<Vec<AppDescriptor>> {
        validation::validate_organization_id(organization_id)?;
        self.bounded(
            "descriptor listing",
            self.store.list_descriptors(organization_id),
        )
        .await
    }

    /// Parameter definitions declared by a descriptor.
    pub async fn list_descriptor_parameters(
        &self,
        organization_id: &OrganizationId,
        descriptor_id: &DescriptorId,
    ) -> ManagerResult<Vec<AppParameter>> {
        validation::validate_organization_id(organization_id)?;
        self.bounded(
            "descriptor parameter listing",
            self.store
                .get_descriptor_parameters(organization_id, descriptor_id),
        )
        .await
    }

    /// Remove a descriptor.
    ///
    /// Refused while any instance of the descriptor exists; those must be
    /// undeployed first.
    pub async fn remove_descriptor(
        &self,
        organization_id: &OrganizationId,
        descriptor_id: &DescriptorId,
    ) -> ManagerResult<()> {
        validation::validate_organization_id(organization_id)?;

        let instances = self
            .bounded("instance listing", self.store.list_instances(organization_id))
            .await?;
        if instances
            .iter()
            .any(|instance| instance.app_descriptor_id == *descriptor_id)
        {
            return Err(ManagerError::DescriptorInUse);
        }

        self.bounded(
            "descriptor removal",
            self.store.remove_descriptor(organization_id, descriptor_id),
        )
        .await?;

        info!(
            organization_id = %organization_id,
            app_descriptor_id = %descriptor_id,
            "removed application descriptor"
        );
        Ok(())
    }

    /// Deploy a registered descriptor as a new application instance.
    ///
    /// Prepares the instance and hands placement to the scheduler: the
    /// request is validated against the descriptor's required parameters and
    /// outbound interfaces, the descriptor copy is parametrized, the
    /// instance and its parametrized descriptor are persisted and a deploy
    /// command is enqueued. If persisting fails after the instance record
    /// was created, the record is rolled back before the error is returned.
    /// A failed hand-off is returned as-is; the persisted records are kept
    /// so the deploy can be retried by the caller.
    pub async fn deploy(&self, request: DeployRequest) -> ManagerResult<DeployResponse> {
        validation::validate_deploy_request(&request)?;

        let request_id = Self::new_request_id();
        info!(
            request_id = %request_id,
            organization_id = %request.organization_id,
            app_descriptor_id = %request.app_descriptor_id,
            name = %request.name,
            "deploying application"
        );

        let mut descriptor = self
            .bounded(
                "descriptor fetch",
                self.store
                    .get_descriptor(&request.organization_id, &request.app_descriptor_id),
            )
            .await?;

        Self::check_required_parameters(&descriptor, &request.parameters)?;
        self.checker
            .check(
                &request.organization_id,
                &request.outbound_connections,
                &descriptor.outbound_net_interfaces,
            )
            .await?;

        self.apply_storage_defaults(&mut descriptor).await;
        let mut parametrized = parametrize(&descriptor, &request.parameters)?;

        let instance = self
            .bounded("instance creation", self.store.create_instance(&request))
            .await?;
        let outbound_connections =
            Self::resolve_connection_sources(&instance, &request.outbound_connections);

        parametrized.app_instance_id = Some(instance.app_instance_id.clone());
        if let Err(e) = self
            .bounded(
                "parametrized descriptor persist",
                self.store.add_parametrized_descriptor(parametrized.clone()),
            )
            .await
        {
            error!(
                app_instance_id = %instance.app_instance_id,
                error = %e,
                "failed to persist parametrized descriptor"
            );
            self.rollback_instance(&instance).await;
            return Err(e);
        }

        // The instance record reflects the parametrized values from here on.
        let mut updated = instance.clone();
        updated.rules = parametrized.rules.clone();
        updated.environment_variables = parametrized.environment_variables.clone();
        updated.configuration_options = parametrized.configuration_options.clone();
        updated.labels = parametrized.labels.clone();
        if let Err(e) = self
            .bounded("instance update", self.store.update_instance(updated.clone()))
            .await
        {
            error!(
                app_instance_id = %instance.app_instance_id,
                error = %e,
                "failed to update instance with parametrized values"
            );
            self.rollback_instance(&instance).await;
            return Err(e);
        }

        let command = DeployCommand {
            request_id: request_id.clone(),
            organization_id: request.organization_id.clone(),
            app_instance_id: updated.app_instance_id.clone(),
            name: updated.name.clone(),
            outbound_connections,
        };
        self.bounded("deploy hand-off", self.queue.enqueue_deploy(command))
            .await?;

        info!(
            request_id = %request_id,
            app_instance_id = %updated.app_instance_id,
            "deploy handed to the scheduler"
        );
        Ok(DeployResponse {
            request_id,
            app_instance_id: updated.app_instance_id,
            status: updated.status,
        })
    }

    /// Tear down a running application instance.
    ///
    /// When other applications hold connections into the instance the
    /// request is refused unless the caller confirms teardown. Established
    /// connections are removed best effort before the undeploy command is
    /// handed to the scheduler; the instance record itself stays until the
    /// scheduler completes the teardown.
    pub async fn undeploy(&self, request: UndeployRequest) -> ManagerResult<()> {
        validation::validate_undeploy_request(&request)?;

        let request_id = Self::new_request_id();
        info!(
            request_id = %request_id,
            organization_id = %request.organization_id,
            app_instance_id = %request.app_instance_id,
            "undeploying application"
        );

        let instance = self
            .bounded(
                "instance fetch",
                self.store
                    .get_instance(&request.organization_id, &request.app_instance_id),
            )
            .await?;

        let inbound = self
            .bounded(
                "inbound connection listing",
                self.connections
                    .list_inbound_connections(&request.organization_id, &request.app_instance_id),
            )
            .await?;
        if !inbound.is_empty() && !request.user_confirmation {
            return Err(ManagerError::UndeployNeedsConfirmation);
        }
        let outbound = self
            .bounded(
                "outbound connection listing",
                self.connections
                    .list_outbound_connections(&request.organization_id, &request.app_instance_id),
            )
            .await?;

        for connection in inbound.iter().chain(outbound.iter()) {
            self.remove_connection_best_effort(connection).await;
        }

        let command = UndeployCommand {
            request_id: request_id.clone(),
            organization_id: request.organization_id.clone(),
            app_instance_id: request.app_instance_id.clone(),
        };
        self.bounded("undeploy hand-off", self.queue.enqueue_undeploy(command))
            .await?;

        info!(
            request_id = %request_id,
            app_instance_id = %request.app_instance_id,
            name = %instance.name,
            "undeploy handed to the scheduler"
        );
        Ok(())
    }

    /// Fetch an instance with its connections resolved.
    pub async fn get_instance(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<AppInstance> {
        validation::validate_organization_id(organization_id)?;
        let mut instance = self
            .bounded(
                "instance fetch",
                self.store.get_instance(organization_id, instance_id),
            )
            .await?;
        expansion::expand_instance(
            self.connections.as_ref(),
            self.call_timeout(),
            &mut instance,
        )
        .await;
        Ok(instance)
    }

    /// List an organization's instances, each with its connections resolved.
    pub async fn list_instances(
        &self,
        organization_id: &OrganizationId,
    ) -> ManagerResult<Vec<AppInstance>> {
        validation::validate_organization_id(organization_id)?;
        let mut instances = self
            .bounded("instance listing", self.store.list_instances(organization_id))
            .await?;
        for instance in &mut instances {
            expansion::expand_instance(self.connections.as_ref(), self.call_timeout(), instance)
                .await;
        }
        Ok(instances)
    }

    /// Parameter values an instance was deployed with.
    pub async fn list_instance_parameters(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<Vec<InstanceParameter>> {
        validation::validate_organization_id(organization_id)?;
        self.bounded(
            "instance parameter listing",
            self.store.get_instance_parameters(organization_id, instance_id),
        )
        .await
    }

    /// Register a connection between two running instances.
    ///
    /// The target must expose the named inbound and the source must declare
    /// the named outbound.
    pub async fn add_connection(&self, request: AddConnectionRequest) -> ManagerResult<()> {
        validation::validate_add_connection_request(&request)?;

        let target = self
            .bounded(
                "target instance fetch",
                self.store
                    .get_instance(&request.organization_id, &request.target_instance_id),
            )
            .await?;
        if !target.has_inbound(&request.inbound_name) {
            return Err(ManagerError::InboundNotFound {
                instance_id: request.target_instance_id.to_string(),
                inbound: request.inbound_name.clone(),
            });
        }

        let source = self
            .bounded(
                "source instance fetch",
                self.store
                    .get_instance(&request.organization_id, &request.source_instance_id),
            )
            .await?;
        let declared = source
            .outbound_net_interfaces
            .iter()
            .any(|outbound| outbound.name == request.outbound_name);
        if !declared {
            return Err(ManagerError::OutboundNotFound {
                instance_id: request.source_instance_id.to_string(),
                outbound: request.outbound_name.clone(),
            });
        }

        info!(
            organization_id = %request.organization_id,
            source_instance_id = %request.source_instance_id,
            target_instance_id = %request.target_instance_id,
            outbound_name = %request.outbound_name,
            "registering connection"
        );
        self.bounded(
            "connection registration",
            self.connections.add_connection(request),
        )
        .await
    }

    /// Remove a connection between two instances.
    ///
    /// Removing a connection whose outbound is marked required needs the
    /// caller's confirmation, since the source application declared it
    /// cannot run without it.
    pub async fn remove_connection(&self, request: RemoveConnectionRequest) -> ManagerResult<()> {
        validation::validate_remove_connection_request(&request)?;

        let outbounds = self
            .bounded(
                "outbound connection listing",
                self.connections
                    .list_outbound_connections(&request.organization_id, &request.source_instance_id),
            )
            .await?;
        let connection = outbounds
            .iter()
            .find(|connection| {
                connection.target_instance_id == request.target_instance_id
                    && connection.inbound_name == request.inbound_name
                    && connection.outbound_name == request.outbound_name
            })
            .ok_or(ManagerError::ConnectionNotFound)?;
        if connection.outbound_required && !request.user_confirmation {
            return Err(ManagerError::RequiredConnectionRemoval);
        }

        info!(
            organization_id = %request.organization_id,
            connection_id = %connection.connection_id,
            "removing connection"
        );
        self.bounded(
            "connection removal",
            self.connections.remove_connection(request),
        )
        .await
    }

    /// Inbound interfaces exposed by the organization's running instances.
    pub async fn list_available_inbounds(
        &self,
        organization_id: &OrganizationId,
    ) -> ManagerResult<Vec<AvailableInbound>> {
        validation::validate_organization_id(organization_id)?;
        let instances = self
            .bounded("instance listing", self.store.list_instances(organization_id))
            .await?;
        let inbounds = instances
            .iter()
            .flat_map(|instance| {
                instance
                    .inbound_net_interfaces
                    .iter()
                    .map(|inbound| AvailableInbound {
                        organization_id: instance.organization_id.clone(),
                        app_instance_id: instance.app_instance_id.clone(),
                        instance_name: instance.name.clone(),
                        inbound_name: inbound.name.clone(),
                    })
            })
            .collect();
        Ok(inbounds)
    }

    /// Outbound interfaces declared by the organization's running instances.
    pub async fn list_available_outbounds(
        &self,
        organization_id: &OrganizationId,
    ) -> ManagerResult<Vec<AvailableOutbound>> {
        validation::validate_organization_id(organization_id)?;
        let instances = self
            .bounded("instance listing", self.store.list_instances(organization_id))
            .await?;
        let outbounds = instances
            .iter()
            .flat_map(|instance| {
                instance
                    .outbound_net_interfaces
                    .iter()
                    .map(|outbound| AvailableOutbound {
                        organization_id: instance.organization_id.clone(),
                        app_instance_id: instance.app_instance_id.clone(),
                        instance_name: instance.name.clone(),
                        outbound_name: outbound.name.clone(),
                        required: outbound.required,
                    })
            })
            .collect();
        Ok(outbounds)
    }

    /// Instances a device group may target, filtered by labels.
    ///
    /// The caller's claimed group name must match the registered group for
    /// the given ID; a mismatch is treated as an access failure rather than
    /// a lookup failure.
    pub async fn target_applications(
        &self,
        filter: &TargetApplicationsFilter,
    ) -> ManagerResult<Vec<TargetApplication>> {
        validation::validate_organization_id(&filter.organization_id)?;
        if filter.device_group_id.is_empty() {
            return Err(ModelError::invalid_argument("device_group_id cannot be empty").into());
        }
        if filter.device_group_name.is_empty() {
            return Err(ModelError::invalid_argument("device_group_name cannot be empty").into());
        }

        let group = self
            .bounded(
                "device group fetch",
                self.devices
                    .get_device_group(&filter.organization_id, &filter.device_group_id),
            )
            .await?;
        if group.name != filter.device_group_name {
            return Err(ManagerError::DeviceGroupAccessDenied {
                name: filter.device_group_name.clone(),
            });
        }

        let instances = self
            .bounded(
                "instance listing",
                self.store.list_instances(&filter.organization_id),
            )
            .await?;
        let targets = instances
            .iter()
            .filter(|instance| {
                filter
                    .match_labels
                    .iter()
                    .all(|(key, value)| instance.labels.get(key).is_some_and(|found| found == value))
            })
            .map(|instance| TargetApplication {
                app_instance_id: instance.app_instance_id.clone(),
                name: instance.name.clone(),
                labels: instance.labels.clone(),
            })
            .collect();
        Ok(targets)
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.config.call_timeout_secs)
    }

    /// Bound an external call by the configured timeout.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = ManagerResult<T>>,
    ) -> ManagerResult<T> {
        match tokio::time::timeout(self.call_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(ManagerError::Timeout { operation }),
        }
    }

    fn new_request_id() -> String {
        format!("app-mngr-{}", ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Every parameter the descriptor marks required must be supplied.
    fn check_required_parameters(
        descriptor: &AppDescriptor,
        supplied: &[InstanceParameter],
    ) -> ManagerResult<()> {
        for definition in descriptor
            .parameters
            .iter()
            .filter(|definition| definition.required)
        {
            let present = supplied
                .iter()
                .any(|parameter| parameter.parameter_name == definition.name);
            if !present {
                return Err(ManagerError::RequiredParameterMissing {
                    name: definition.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Resolve each requested connection's source service.
    ///
    /// The source is the service named by the security rule owning the
    /// outbound interface. Connections no rule owns cannot be wired by the
    /// scheduler and are dropped from the hand-off.
    fn resolve_connection_sources(
        instance: &AppInstance,
        requested: &[ConnectionRequest],
    ) -> Vec<ResolvedConnection> {
        requested
            .iter()
            .filter_map(|connection| {
                let owner = instance.rules.iter().find(|rule| {
                    rule.outbound_net_interface.as_deref() == Some(connection.outbound_name.as_str())
                });
                match owner {
                    Some(rule) => Some(ResolvedConnection {
                        target_instance_id: connection.target_instance_id.clone(),
                        inbound_name: connection.inbound_name.clone(),
                        outbound_name: connection.outbound_name.clone(),
                        source_service_name: rule.target_service_name.clone(),
                    }),
                    None => {
                        warn!(
                            app_instance_id = %instance.app_instance_id,
                            outbound_name = %connection.outbound_name,
                            "no security rule owns the requested outbound, dropping connection from the hand-off"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Fill in the organization's default size for storage declared without one.
    async fn apply_storage_defaults(&self, descriptor: &mut AppDescriptor) {
        let needs_default = descriptor.groups.iter().any(|group| {
            group
                .services
                .iter()
                .any(|service| service.storage.iter().any(|storage| storage.size == 0))
        });
        if !needs_default {
            return;
        }

        let size = self.default_storage_size(&descriptor.organization_id).await;
        for group in &mut descriptor.groups {
            for service in &mut group.services {
                for storage in &mut service.storage {
                    if storage.size == 0 {
                        storage.size = size;
                    }
                }
            }
        }
    }

    /// The organization's default storage size, falling back to the
    /// configured default when the lookup fails or yields an unusable value.
    async fn default_storage_size(&self, organization_id: &OrganizationId) -> i64 {
        let fallback = self.config.default_storage_size_bytes;
        let lookup = tokio::time::timeout(
            self.call_timeout(),
            self.settings
                .get_setting(organization_id, DEFAULT_STORAGE_SIZE_KEY),
        )
        .await;

        match lookup {
            Ok(Ok(Some(value))) => match value.parse::<i64>() {
                Ok(size) if size > 0 => size,
                _ => {
                    warn!(
                        organization_id = %organization_id,
                        value = %value,
                        "unusable default storage size setting, using the configured default"
                    );
                    fallback
                }
            },
            Ok(Ok(None)) => fallback,
            Ok(Err(e)) => {
                warn!(
                    organization_id = %organization_id,
                    error = %e,
                    "failed to read default storage size setting, using the configured default"
                );
                fallback
            }
            Err(_) => {
                warn!(
                    organization_id = %organization_id,
                    "timed out reading default storage size setting, using the configured default"
                );
                fallback
            }
        }
    }

    /// Remove the instance record created by a deploy that failed afterwards.
    async fn rollback_instance(&self, instance: &AppInstance) {
        let removal = tokio::time::timeout(
            self.call_timeout(),
            self.store
                .remove_instance(&instance.organization_id, &instance.app_instance_id),
        )
        .await;

        match removal {
            Ok(Ok(())) => {
                info!(
                    app_instance_id = %instance.app_instance_id,
                    "rolled back instance after failed deploy"
                );
            }
            Ok(Err(e)) => {
                warn!(
                    app_instance_id = %instance.app_instance_id,
                    error = %e,
                    "failed to roll back instance after failed deploy"
                );
            }
            Err(_) => {
                warn!(
                    app_instance_id = %instance.app_instance_id,
                    "timed out rolling back instance after failed deploy"
                );
            }
        }
    }

    /// Remove one connection during undeploy, logging instead of failing.
    async fn remove_connection_best_effort(&self, connection: &ConnectionInstance) {
        let request = RemoveConnectionRequest {
            organization_id: connection.organization_id.clone(),
            source_instance_id: connection.source_instance_id.clone(),
            target_instance_id: connection.target_instance_id.clone(),
            inbound_name: connection.inbound_name.clone(),
            outbound_name: connection.outbound_name.clone(),
            user_confirmation: true,
        };
        let removal = tokio::time::timeout(
            self.call_timeout(),
            self.connections.remove_connection(request),
        )
        .await;

        match removal {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    connection_id = %connection.connection_id,
                    error = %e,
                    "failed to remove connection during undeploy"
                );
            }
            Err(_) => {
                warn!(
                    connection_id = %connection.connection_id,
                    "timed out removing connection during undeploy"
                );
            }
        }
    }
}

impl std::fmt::Debug for ApplicationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationManager").finish_non_exhaustive()
    }
}
