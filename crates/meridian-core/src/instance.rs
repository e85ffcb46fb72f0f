//! Application instance entities and orchestration request types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::{
    AppDescriptor, InboundNetworkInterface, InstanceParameter, OutboundNetworkInterface,
    SecurityRule,
};
use crate::types::{AppStatus, ConnectionStatus, DescriptorId, InstanceId, OrganizationId};

/// A running materialization of a descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInstance {
    pub organization_id: OrganizationId,
    pub app_descriptor_id: DescriptorId,
    pub app_instance_id: InstanceId,
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub configuration_options: HashMap<String, String>,
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
    #[serde(default)]
    pub rules: Vec<SecurityRule>,
    pub groups: Vec<ServiceGroupInstance>,
    pub status: AppStatus,
    #[serde(default)]
    pub inbound_net_interfaces: Vec<InboundNetworkInterface>,
    #[serde(default)]
    pub outbound_net_interfaces: Vec<OutboundNetworkInterface>,
    /// Resolved inbound connections, filled in by instance expansion.
    #[serde(default)]
    pub inbound_connections: Vec<ConnectionInstance>,
    /// Resolved outbound connections, filled in by instance expansion.
    #[serde(default)]
    pub outbound_connections: Vec<ConnectionInstance>,
    /// When the instance was created.
    pub created_at: DateTime<Utc>,
    /// When the instance record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl AppInstance {
    /// Materialize a fresh instance from a registered descriptor.
    ///
    /// Seeds one group instance per descriptor group and copies the
    /// descriptor's rules, environment and network interfaces. The instance
    /// starts in [`AppStatus::Queued`] with no resolved connections.
    #[must_use]
    pub fn from_descriptor(descriptor: &AppDescriptor, name: impl Into<String>) -> Self {
        let groups = descriptor
            .groups
            .iter()
            .map(|group| ServiceGroupInstance {
                service_group_instance_id: InstanceId::generate().to_string(),
                name: group.name.clone(),
                service_instances: group
                    .services
                    .iter()
                    .map(|service| ServiceInstance {
                        service_instance_id: InstanceId::generate().to_string(),
                        name: service.name.clone(),
                        status: ServiceStatus::Waiting,
                    })
                    .collect(),
                status: AppStatus::Queued,
            })
            .collect();

        let now = Utc::now();
        Self {
            organization_id: descriptor.organization_id.clone(),
            app_descriptor_id: descriptor.app_descriptor_id.clone(),
            app_instance_id: InstanceId::generate(),
            name: name.into(),
            labels: descriptor.labels.clone(),
            configuration_options: descriptor.configuration_options.clone(),
            environment_variables: descriptor.environment_variables.clone(),
            rules: descriptor.rules.clone(),
            groups,
            status: AppStatus::Queued,
            inbound_net_interfaces: descriptor.inbound_net_interfaces.clone(),
            outbound_net_interfaces: descriptor.outbound_net_interfaces.clone(),
            inbound_connections: Vec::new(),
            outbound_connections: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this instance declares an inbound interface with the given name.
    #[must_use]
    pub fn has_inbound(&self, name: &str) -> bool {
        self.inbound_net_interfaces
            .iter()
            .any(|inbound| inbound.name == name)
    }
}

/// A deployed group of service instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceGroupInstance {
    pub service_group_instance_id: String,
    pub name: String,
    pub service_instances: Vec<ServiceInstance>,
    pub status: AppStatus,
}

/// A deployed service within a group instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub service_instance_id: String,
    pub name: String,
    pub status: ServiceStatus,
}

/// Lifecycle status of a single service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Scheduled,
    Waiting,
    Deploying,
    Running,
    Error,
}

/// A resolved link between one instance's outbound and another's inbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInstance {
    pub organization_id: OrganizationId,
    pub connection_id: String,
    pub source_instance_id: InstanceId,
    pub source_instance_name: String,
    pub target_instance_id: InstanceId,
    pub target_instance_name: String,
    /// Inbound interface on the target instance.
    pub inbound_name: String,
    /// Outbound interface on the source instance.
    pub outbound_name: String,
    #[serde(default)]
    pub outbound_required: bool,
    pub status: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_range: Option<String>,
}

/// Request to deploy a registered descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub organization_id: OrganizationId,
    pub app_descriptor_id: DescriptorId,
    /// Name for the new instance.
    pub name: String,
    /// Deploy-time parameter values.
    #[serde(default)]
    pub parameters: Vec<InstanceParameter>,
    /// Outbound connections to establish for the new instance.
    #[serde(default)]
    pub outbound_connections: Vec<ConnectionRequest>,
}

/// One outbound connection requested at deploy time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    /// Instance whose inbound interface is the connection target.
    pub target_instance_id: InstanceId,
    /// Inbound interface name on the target instance.
    pub inbound_name: String,
    /// Outbound interface name on the new instance.
    pub outbound_name: String,
}

/// Accepted deploy request, scheduling delegated to the hand-off queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    pub request_id: String,
    pub app_instance_id: InstanceId,
    pub status: AppStatus,
}

/// Request to tear down a running instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndeployRequest {
    pub organization_id: OrganizationId,
    pub app_instance_id: InstanceId,
    /// Confirms teardown although dependent applications are connected.
    #[serde(default)]
    pub user_confirmation: bool,
}

/// Request to register a connection between two instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddConnectionRequest {
    pub organization_id: OrganizationId,
    pub source_instance_id: InstanceId,
    pub target_instance_id: InstanceId,
    pub inbound_name: String,
    pub outbound_name: String,
}

/// Request to remove a connection between two instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveConnectionRequest {
    pub organization_id: OrganizationId,
    pub source_instance_id: InstanceId,
    pub target_instance_id: InstanceId,
    pub inbound_name: String,
    pub outbound_name: String,
    #[serde(default)]
    pub user_confirmation: bool,
}

/// Filter for selecting instances a device group may target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetApplicationsFilter {
    pub organization_id: OrganizationId,
    pub device_group_id: String,
    pub device_group_name: String,
    /// Labels an instance must all carry to match.
    #[serde(default)]
    pub match_labels: HashMap<String, String>,
}

/// Reduced instance summary returned to device-facing callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetApplication {
    pub app_instance_id: InstanceId,
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// An inbound interface on a running instance, available for connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableInbound {
    pub organization_id: OrganizationId,
    pub app_instance_id: InstanceId,
    pub instance_name: String,
    pub inbound_name: String,
}

/// An outbound interface on a running instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableOutbound {
    pub organization_id: OrganizationId,
    pub app_instance_id: InstanceId,
    pub instance_name: String,
    pub outbound_name: String,
    pub required: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{CollocationPolicy, Service, ServiceGroup};

    fn two_group_descriptor() -> AppDescriptor {
        let service = |name: &str| Service {
            name: name.to_string(),
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
        };
        AppDescriptor {
            organization_id: OrganizationId::new("org-1"),
            app_descriptor_id: DescriptorId::new("desc-1"),
            name: "sample".to_string(),
            labels: HashMap::from([("app".to_string(), "sample".to_string())]),
            configuration_options: HashMap::new(),
            environment_variables: HashMap::new(),
            rules: Vec::new(),
            groups: vec![
                ServiceGroup {
                    name: "g1".to_string(),
                    services: vec![service("service1"), service("service2")],
                    policy: CollocationPolicy::SameCluster,
                    specs: None,
                    labels: HashMap::new(),
                },
                ServiceGroup {
                    name: "g2".to_string(),
                    services: vec![service("service3")],
                    policy: CollocationPolicy::SameCluster,
                    specs: None,
                    labels: HashMap::new(),
                },
            ],
            parameters: Vec::new(),
            inbound_net_interfaces: vec![InboundNetworkInterface {
                name: "in1".to_string(),
            }],
            outbound_net_interfaces: Vec::new(),
        }
    }

    #[test]
    fn from_descriptor_seeds_groups_and_interfaces() {
        let descriptor = two_group_descriptor();
        let instance = AppInstance::from_descriptor(&descriptor, "run-1");

        assert_eq!(instance.status, AppStatus::Queued);
        assert_eq!(instance.groups.len(), 2);
        assert_eq!(instance.groups[0].service_instances.len(), 2);
        assert_eq!(instance.groups[1].service_instances.len(), 1);
        assert!(instance.has_inbound("in1"));
        assert!(!instance.has_inbound("in2"));
        assert_eq!(instance.labels.get("app").map(String::as_str), Some("sample"));
    }

    #[test]
    fn instances_from_same_descriptor_get_distinct_ids() {
        let descriptor = two_group_descriptor();
        let a = AppInstance::from_descriptor(&descriptor, "run-a");
        let b = AppInstance::from_descriptor(&descriptor, "run-b");
        assert_ne!(a.app_instance_id, b.app_instance_id);
    }
}
