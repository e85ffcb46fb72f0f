//! Persistence interfaces for descriptors, instances and connections.
//!
//! The manager consumes these as opaque trait objects; the backing service
//! is selected by configuration. [`MemoryStore`] keeps everything in-process
//! for tests and local development, [`RemoteStore`] speaks JSON over HTTP to
//! the platform's store service.

mod memory;
mod remote;

pub use memory::MemoryStore;
pub use remote::RemoteStore;

use async_trait::async_trait;
use meridian_core::descriptor::{AppParameter, InstanceParameter};
use meridian_core::instance::{AddConnectionRequest, RemoveConnectionRequest};
use meridian_core::{
    AppDescriptor, AppInstance, ConnectionInstance, DeployRequest, DescriptorId, InstanceId,
    OrganizationId, ParametrizedDescriptor,
};

use crate::error::ManagerResult;

/// Store for descriptors, instances and their parameters.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Persist a new descriptor.
    async fn add_descriptor(&self, descriptor: AppDescriptor) -> ManagerResult<()>;

    /// Fetch a descriptor by ID.
    async fn get_descriptor(
        &self,
        organization_id: &OrganizationId,
        descriptor_id: &DescriptorId,
    ) -> ManagerResult<AppDescriptor>;

    /// List an organization's descriptors.
    async fn list_descriptors(
        &self,
        organization_id: &OrganizationId,
    ) -> ManagerResult<Vec<AppDescriptor>>;

    /// Remove a descriptor.
    async fn remove_descriptor(
        &self,
        organization_id: &OrganizationId,
        descriptor_id: &DescriptorId,
    ) -> ManagerResult<()>;

    /// Create a new instance seeded from a registered descriptor, recording
    /// the requested parameter values alongside it.
    async fn create_instance(&self, request: &DeployRequest) -> ManagerResult<AppInstance>;

    /// Fetch an instance by ID.
    async fn get_instance(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<AppInstance>;

    /// Replace a stored instance.
    async fn update_instance(&self, instance: AppInstance) -> ManagerResult<()>;

    /// Remove an instance.
    async fn remove_instance(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<()>;

    /// List an organization's instances.
    async fn list_instances(
        &self,
        organization_id: &OrganizationId,
    ) -> ManagerResult<Vec<AppInstance>>;

    /// Persist the parametrized descriptor owned by an instance.
    async fn add_parametrized_descriptor(
        &self,
        descriptor: ParametrizedDescriptor,
    ) -> ManagerResult<()>;

    /// Fetch the parametrized descriptor owned by an instance.
    async fn get_parametrized_descriptor(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<ParametrizedDescriptor>;

    /// Parameter values an instance was deployed with.
    async fn get_instance_parameters(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<Vec<InstanceParameter>>;

    /// Parameter definitions declared by a descriptor.
    async fn get_descriptor_parameters(
        &self,
        organization_id: &OrganizationId,
        descriptor_id: &DescriptorId,
    ) -> ManagerResult<Vec<AppParameter>>;
}

/// Shared descriptor and request fixtures for store-level tests.
#[cfg(test)]
pub(crate) mod test_fixtures {
    use std::collections::HashMap;

    use meridian_core::descriptor::{
        CollocationPolicy, InboundNetworkInterface, InstanceParameter, OutboundNetworkInterface,
        Service, ServiceGroup,
    };
    use meridian_core::{AppDescriptor, DeployRequest, DescriptorId, OrganizationId};

    pub(crate) fn sample_descriptor(organization: &str, descriptor: &str) -> AppDescriptor {
        AppDescriptor {
            organization_id: OrganizationId::new(organization),
            app_descriptor_id: DescriptorId::new(descriptor),
            name: "sample".to_string(),
            labels: HashMap::from([("app".to_string(), "sample".to_string())]),
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
                required: true,
            }],
        }
    }

    pub(crate) fn deploy_request(descriptor: &AppDescriptor, name: &str) -> DeployRequest {
        DeployRequest {
            organization_id: descriptor.organization_id.clone(),
            app_descriptor_id: descriptor.app_descriptor_id.clone(),
            name: name.to_string(),
            parameters: vec![InstanceParameter {
                parameter_name: "replicas".to_string(),
                value: "2".to_string(),
            }],
            outbound_connections: Vec::new(),
        }
    }
}

/// Store for network connections between instances.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Connections whose target is the given instance.
    async fn list_inbound_connections(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<Vec<ConnectionInstance>>;

    /// Connections whose source is the given instance.
    async fn list_outbound_connections(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<Vec<ConnectionInstance>>;

    /// Register a connection between two instances.
    async fn add_connection(&self, request: AddConnectionRequest) -> ManagerResult<()>;

    /// Remove a connection between two instances.
    async fn remove_connection(&self, request: RemoveConnectionRequest) -> ManagerResult<()>;
}
