//! Application descriptor entities.
//!
//! A descriptor is the declarative template for an application: service
//! groups, services, security rules and deploy-time parameter definitions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{DescriptorId, InstanceId, OrganizationId};

/// A registered application descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDescriptor {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Unique descriptor identifier.
    pub app_descriptor_id: DescriptorId,
    /// Application name.
    pub name: String,
    /// Free-form labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Platform configuration options.
    #[serde(default)]
    pub configuration_options: HashMap<String, String>,
    /// Descriptor-wide environment variables.
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
    /// Security rules scoping access to service ports.
    #[serde(default)]
    pub rules: Vec<SecurityRule>,
    /// Service groups, in declaration order.
    pub groups: Vec<ServiceGroup>,
    /// Deploy-time parameter definitions.
    #[serde(default)]
    pub parameters: Vec<AppParameter>,
    /// Named inbound connection points exposed by the application.
    #[serde(default)]
    pub inbound_net_interfaces: Vec<InboundNetworkInterface>,
    /// Named outbound connection points required by the application.
    #[serde(default)]
    pub outbound_net_interfaces: Vec<OutboundNetworkInterface>,
}

impl AppDescriptor {
    /// Build a descriptor from a registration request, minting its ID.
    #[must_use]
    pub fn from_request(request: AddAppDescriptorRequest) -> Self {
        Self {
            organization_id: request.organization_id,
            app_descriptor_id: DescriptorId::generate(),
            name: request.name,
            labels: request.labels,
            configuration_options: request.configuration_options,
            environment_variables: request.environment_variables,
            rules: request.rules,
            groups: request.groups,
            parameters: request.parameters,
            inbound_net_interfaces: request.inbound_net_interfaces,
            outbound_net_interfaces: request.outbound_net_interfaces,
        }
    }

    /// Look up a declared service by name across all groups.
    #[must_use]
    pub fn find_service(&self, name: &str) -> Option<&Service> {
        self.groups
            .iter()
            .flat_map(|group| group.services.iter())
            .find(|service| service.name == name)
    }

    /// Look up a declared service group by name.
    #[must_use]
    pub fn find_group(&self, name: &str) -> Option<&ServiceGroup> {
        self.groups.iter().find(|group| group.name == name)
    }
}

/// Request to register a new application descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddAppDescriptorRequest {
    /// Caller-supplied request identifier.
    pub request_id: String,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Application name.
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub configuration_options: HashMap<String, String>,
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
    #[serde(default)]
    pub rules: Vec<SecurityRule>,
    pub groups: Vec<ServiceGroup>,
    #[serde(default)]
    pub parameters: Vec<AppParameter>,
    #[serde(default)]
    pub inbound_net_interfaces: Vec<InboundNetworkInterface>,
    #[serde(default)]
    pub outbound_net_interfaces: Vec<OutboundNetworkInterface>,
}

/// A named set of services deployed as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceGroup {
    /// Group name, unique within the descriptor.
    pub name: String,
    /// Services in this group.
    pub services: Vec<Service>,
    /// Collocation policy for the group's services.
    #[serde(default)]
    pub policy: CollocationPolicy,
    /// Optional replication specs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specs: Option<GroupSpecs>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// How a group's services may be placed relative to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollocationPolicy {
    /// All services on the same cluster.
    #[default]
    SameCluster,
    /// Services may be spread across clusters.
    SeparateClusters,
    /// Services must not share a cluster with untrusted workloads.
    DoNotTrust,
}

/// Replication specs for a service group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpecs {
    /// Number of group replicas.
    #[serde(default)]
    pub replicas: u32,
    /// Replicate the whole group once per available cluster.
    #[serde(default)]
    pub multi_cluster_replica: bool,
    /// Cluster selection labels.
    #[serde(default)]
    pub deployment_selectors: HashMap<String, String>,
}

/// A single deployable service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Service name, unique within the descriptor.
    pub name: String,
    /// Container image reference.
    pub image: String,
    /// Registry credentials for private images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<ImageCredentials>,
    /// Resource requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specs: Option<ServiceSpecs>,
    /// Storage mounts.
    #[serde(default)]
    pub storage: Vec<Storage>,
    /// Ports exposed by the service.
    #[serde(default)]
    pub exposed_ports: Vec<Port>,
    /// Service-level environment variables.
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
    /// Configuration files mounted into the service.
    #[serde(default)]
    pub configs: Vec<ConfigFile>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Names of services that must be running before this one starts.
    #[serde(default)]
    pub deploy_after: Vec<String>,
    /// Extra arguments passed to the container entrypoint.
    #[serde(default)]
    pub run_arguments: Vec<String>,
}

/// Credentials for pulling a private container image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageCredentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub docker_repository: String,
}

/// Resource requests for one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpecs {
    /// CPU request in millicores.
    #[serde(default)]
    pub cpu: i64,
    /// Memory request in bytes.
    #[serde(default)]
    pub memory: i64,
    /// Number of service replicas.
    #[serde(default)]
    pub replicas: u32,
}

/// A storage mount declared by a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    /// Requested size in bytes. Zero means the organization default.
    #[serde(default)]
    pub size: i64,
    /// Absolute mount path inside the container.
    pub mount_path: String,
    /// Backing storage class.
    #[serde(default, rename = "type")]
    pub storage_type: StorageType,
}

/// Backing class for a storage mount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Discarded when the service stops.
    #[default]
    Ephemeral,
    /// Persistent on the hosting cluster.
    ClusterLocal,
    /// Replicated within the hosting cluster.
    ClusterReplica,
    /// Persistent in cloud object storage.
    CloudPersistent,
}

/// A port exposed by a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Port name, referenced by security rules.
    pub name: String,
    /// Port the service listens on.
    pub internal_port: i32,
    /// Port exposed to consumers.
    pub exposed_port: i32,
    /// Optional HTTP endpoints behind this port.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// An HTTP endpoint behind an exposed port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "type")]
    pub endpoint_type: EndpointType,
    pub path: String,
}

/// Kind of an HTTP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    /// Liveness probe.
    IsAlive,
    /// REST API.
    Rest,
    /// Web UI.
    Web,
    /// Prometheus scrape target.
    Prometheus,
    /// Data ingestion endpoint.
    Ingestion,
}

/// A configuration file mounted into a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub name: String,
    /// File content, base64 for binary payloads.
    pub content: String,
    /// Absolute mount path inside the container.
    pub mount_path: String,
}

/// An access-control declaration for one target service port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRule {
    /// Rule name.
    pub name: String,
    /// Group containing the target service.
    pub target_service_group_name: String,
    /// Service whose port this rule scopes.
    pub target_service_name: String,
    /// Target port number.
    pub target_port: i32,
    /// Who may reach the target port.
    pub access: PortAccess,
    /// Group containing the authorised caller services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_service_group_name: Option<String>,
    /// Authorised caller services within that group.
    #[serde(default)]
    pub auth_services: Vec<String>,
    /// Authorised device groups, by name.
    #[serde(default)]
    pub device_group_names: Vec<String>,
    /// Authorised device groups, by ID.
    #[serde(default)]
    pub device_group_ids: Vec<String>,
    /// Inbound interface granting cross-application access to the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbound_net_interface: Option<String>,
    /// Outbound interface the target uses to reach another application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound_net_interface: Option<String>,
}

/// Access kind granted by a security rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortAccess {
    /// Any service of the same application.
    AllAppServices,
    /// The listed auth services only.
    AppServices,
    /// Publicly reachable.
    Public,
    /// The listed device groups only.
    DeviceGroup,
    /// Reachable through a named inbound interface.
    InboundAppnet,
    /// Reaches out through a named outbound interface.
    OutboundAppnet,
}

/// A named inbound connection point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundNetworkInterface {
    pub name: String,
}

/// A named outbound connection point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundNetworkInterface {
    pub name: String,
    /// Whether a deploy request must satisfy this outbound.
    #[serde(default)]
    pub required: bool,
}

/// A deploy-time parameter definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppParameter {
    /// Parameter name, unique within the descriptor.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Dot-separated path to the patched field within the descriptor document.
    pub path: String,
    /// Declared value type.
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Value applied when the deploy request omits the parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub category: ParamCategory,
    /// Allowed values for enum parameters.
    #[serde(default)]
    pub enum_values: Vec<String>,
    /// Whether every deploy request must supply this parameter.
    #[serde(default)]
    pub required: bool,
}

/// Declared type of a deploy-time parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Boolean,
    Integer,
    Float,
    Enum,
    String,
    Password,
}

/// Presentation category for a parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamCategory {
    #[default]
    Basic,
    Advanced,
}

/// A deploy-time parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceParameter {
    /// Name of the declared parameter this value is for.
    pub parameter_name: String,
    /// Raw value, coerced according to the declaration.
    pub value: String,
}

/// A descriptor copy with parameter substitutions applied.
///
/// Owned by exactly one application instance once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParametrizedDescriptor {
    pub organization_id: OrganizationId,
    pub app_descriptor_id: DescriptorId,
    /// Owning instance, set when the instance record is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_instance_id: Option<InstanceId>,
    pub name: String,
    #[serde(default)]
    pub configuration_options: HashMap<String, String>,
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub rules: Vec<SecurityRule>,
    pub groups: Vec<ServiceGroup>,
}

impl ParametrizedDescriptor {
    /// Build an unsubstituted copy of a descriptor.
    ///
    /// The copy owns deep clones of the descriptor's nested collections, so
    /// later substitutions never mutate the registered descriptor.
    #[must_use]
    pub fn from_descriptor(descriptor: &AppDescriptor) -> Self {
        Self {
            organization_id: descriptor.organization_id.clone(),
            app_descriptor_id: descriptor.app_descriptor_id.clone(),
            app_instance_id: None,
            name: descriptor.name.clone(),
            configuration_options: descriptor.configuration_options.clone(),
            environment_variables: descriptor.environment_variables.clone(),
            labels: descriptor.labels.clone(),
            rules: descriptor.rules.clone(),
            groups: descriptor.groups.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_descriptor() -> AppDescriptor {
        AppDescriptor {
            organization_id: OrganizationId::new("org-1"),
            app_descriptor_id: DescriptorId::new("desc-1"),
            name: "sample".to_string(),
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
            inbound_net_interfaces: Vec::new(),
            outbound_net_interfaces: Vec::new(),
        }
    }

    #[test]
    fn from_request_mints_descriptor_id() {
        let descriptor = minimal_descriptor();
        let request = AddAppDescriptorRequest {
            request_id: "req-1".to_string(),
            organization_id: descriptor.organization_id.clone(),
            name: descriptor.name.clone(),
            labels: HashMap::new(),
            configuration_options: HashMap::new(),
            environment_variables: HashMap::new(),
            rules: Vec::new(),
            groups: descriptor.groups.clone(),
            parameters: Vec::new(),
            inbound_net_interfaces: Vec::new(),
            outbound_net_interfaces: Vec::new(),
        };

        let built = AppDescriptor::from_request(request);
        assert!(!built.app_descriptor_id.as_str().is_empty());
        assert_eq!(built.name, "sample");
        assert_eq!(built.groups.len(), 1);
    }

    #[test]
    fn parametrized_copy_does_not_alias_the_descriptor() {
        let mut descriptor = minimal_descriptor();
        let copy = ParametrizedDescriptor::from_descriptor(&descriptor);

        descriptor.groups[0].services[0].name = "renamed".to_string();

        assert_eq!(copy.groups[0].services[0].name, "service1");
        assert!(copy.app_instance_id.is_none());
    }

    #[test]
    fn find_service_searches_all_groups() {
        let descriptor = minimal_descriptor();
        assert!(descriptor.find_service("service1").is_some());
        assert!(descriptor.find_service("service9").is_none());
        assert!(descriptor.find_group("g1").is_some());
    }
}
