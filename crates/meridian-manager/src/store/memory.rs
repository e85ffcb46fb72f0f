//! In-memory store for tests and local development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use meridian_core::descriptor::{AppParameter, InstanceParameter};
use meridian_core::instance::{AddConnectionRequest, RemoveConnectionRequest};
use meridian_core::{
    AppDescriptor, AppInstance, ConnectionInstance, ConnectionStatus, DeployRequest, DescriptorId,
    DeviceGroup, InstanceId, OrganizationId, ParametrizedDescriptor,
};

use super::{ApplicationStore, ConnectionStore};
use crate::devices::DeviceRegistry;
use crate::error::{ManagerError, ManagerResult};
use crate::settings::SettingsLookup;

/// In-memory backing store.
///
/// Every collection is keyed by organization so lookups never cross tenants.
/// Device groups and settings are registered through the inherent helpers,
/// standing in for the registries a production deployment reaches over HTTP.
#[derive(Debug, Default)]
pub struct MemoryStore {
    descriptors: RwLock<HashMap<(String, String), AppDescriptor>>,
    instances: RwLock<HashMap<(String, String), AppInstance>>,
    parametrized: RwLock<HashMap<(String, String), ParametrizedDescriptor>>,
    instance_parameters: RwLock<HashMap<(String, String), Vec<InstanceParameter>>>,
    connections: RwLock<Vec<ConnectionInstance>>,
    device_groups: RwLock<HashMap<(String, String), DeviceGroup>>,
    settings: RwLock<HashMap<(String, String), String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device group so catalog lookups can resolve it.
    pub fn register_device_group(&self, group: DeviceGroup) -> ManagerResult<()> {
        let key = (
            group.organization_id.as_str().to_owned(),
            group.device_group_id.clone(),
        );
        self.device_groups
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .insert(key, group);
        Ok(())
    }

    /// Set an organization-scoped setting value.
    pub fn put_setting(
        &self,
        organization_id: &OrganizationId,
        key: &str,
        value: &str,
    ) -> ManagerResult<()> {
        self.settings
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .insert(
                (organization_id.as_str().to_owned(), key.to_owned()),
                value.to_owned(),
            );
        Ok(())
    }

    fn key(organization_id: &OrganizationId, id: &str) -> (String, String) {
        (organization_id.as_str().to_owned(), id.to_owned())
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn add_descriptor(&self, descriptor: AppDescriptor) -> ManagerResult<()> {
        let key = Self::key(
            &descriptor.organization_id,
            descriptor.app_descriptor_id.as_str(),
        );
        let mut descriptors = self
            .descriptors
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        if descriptors.contains_key(&key) {
            return Err(ManagerError::store(format!(
                "descriptor already exists: {}",
                descriptor.app_descriptor_id
            )));
        }
        descriptors.insert(key, descriptor);
        Ok(())
    }

    async fn get_descriptor(
        &self,
        organization_id: &OrganizationId,
        descriptor_id: &DescriptorId,
    ) -> ManagerResult<AppDescriptor> {
        let descriptors = self
            .descriptors
            .read()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        descriptors
            .get(&Self::key(organization_id, descriptor_id.as_str()))
            .cloned()
            .ok_or_else(|| ManagerError::DescriptorNotFound(descriptor_id.to_string()))
    }

    async fn list_descriptors(
        &self,
        organization_id: &OrganizationId,
    ) -> ManagerResult<Vec<AppDescriptor>> {
        let descriptors = self
            .descriptors
            .read()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        let mut matching: Vec<AppDescriptor> = descriptors
            .values()
            .filter(|descriptor| descriptor.organization_id == *organization_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matching)
    }

    async fn remove_descriptor(
        &self,
        organization_id: &OrganizationId,
        descriptor_id: &DescriptorId,
    ) -> ManagerResult<()> {
        let mut descriptors = self
            .descriptors
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        descriptors
            .remove(&Self::key(organization_id, descriptor_id.as_str()))
            .map(|_| ())
            .ok_or_else(|| ManagerError::DescriptorNotFound(descriptor_id.to_string()))
    }

    async fn create_instance(&self, request: &DeployRequest) -> ManagerResult<AppInstance> {
        let descriptor = {
            let descriptors = self
                .descriptors
                .read()
                .map_err(|_| ManagerError::internal("lock poisoned"))?;
            descriptors
                .get(&Self::key(
                    &request.organization_id,
                    request.app_descriptor_id.as_str(),
                ))
                .cloned()
                .ok_or_else(|| {
                    ManagerError::DescriptorNotFound(request.app_descriptor_id.to_string())
                })?
        };

        let instance = AppInstance::from_descriptor(&descriptor, request.name.clone());
        let key = Self::key(&request.organization_id, instance.app_instance_id.as_str());

        self.instance_parameters
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .insert(key.clone(), request.parameters.clone());
        self.instances
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .insert(key, instance.clone());
        Ok(instance)
    }

    async fn get_instance(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<AppInstance> {
        let instances = self
            .instances
            .read()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        instances
            .get(&Self::key(organization_id, instance_id.as_str()))
            .cloned()
            .ok_or_else(|| ManagerError::InstanceNotFound(instance_id.to_string()))
    }

    async fn update_instance(&self, mut instance: AppInstance) -> ManagerResult<()> {
        let key = Self::key(&instance.organization_id, instance.app_instance_id.as_str());
        let mut instances = self
            .instances
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        if !instances.contains_key(&key) {
            return Err(ManagerError::InstanceNotFound(
                instance.app_instance_id.to_string(),
            ));
        }
        instance.updated_at = chrono::Utc::now();
        instances.insert(key, instance);
        Ok(())
    }

    async fn remove_instance(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<()> {
        let key = Self::key(organization_id, instance_id.as_str());
        let removed = self
            .instances
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .remove(&key);
        if removed.is_none() {
            return Err(ManagerError::InstanceNotFound(instance_id.to_string()));
        }
        self.parametrized
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .remove(&key);
        self.instance_parameters
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .remove(&key);
        Ok(())
    }

    async fn list_instances(
        &self,
        organization_id: &OrganizationId,
    ) -> ManagerResult<Vec<AppInstance>> {
        let instances = self
            .instances
            .read()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        let mut matching: Vec<AppInstance> = instances
            .values()
            .filter(|instance| instance.organization_id == *organization_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matching)
    }

    async fn add_parametrized_descriptor(
        &self,
        descriptor: ParametrizedDescriptor,
    ) -> ManagerResult<()> {
        let instance_id = descriptor
            .app_instance_id
            .as_ref()
            .ok_or_else(|| ManagerError::internal("parametrized descriptor has no owning instance"))?;
        let key = Self::key(&descriptor.organization_id, instance_id.as_str());
        self.parametrized
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?
            .insert(key, descriptor);
        Ok(())
    }

    async fn get_parametrized_descriptor(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<ParametrizedDescriptor> {
        let parametrized = self
            .parametrized
            .read()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        parametrized
            .get(&Self::key(organization_id, instance_id.as_str()))
            .cloned()
            .ok_or_else(|| {
                ManagerError::store(format!("parametrized descriptor not found: {instance_id}"))
            })
    }

    async fn get_instance_parameters(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<Vec<InstanceParameter>> {
        let key = Self::key(organization_id, instance_id.as_str());
        {
            let instances = self
                .instances
                .read()
                .map_err(|_| ManagerError::internal("lock poisoned"))?;
            if !instances.contains_key(&key) {
                return Err(ManagerError::InstanceNotFound(instance_id.to_string()));
            }
        }
        let parameters = self
            .instance_parameters
            .read()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        Ok(parameters.get(&key).cloned().unwrap_or_default())
    }

    async fn get_descriptor_parameters(
        &self,
        organization_id: &OrganizationId,
        descriptor_id: &DescriptorId,
    ) -> ManagerResult<Vec<AppParameter>> {
        let descriptors = self
            .descriptors
            .read()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        descriptors
            .get(&Self::key(organization_id, descriptor_id.as_str()))
            .map(|descriptor| descriptor.parameters.clone())
            .ok_or_else(|| ManagerError::DescriptorNotFound(descriptor_id.to_string()))
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn list_inbound_connections(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<Vec<ConnectionInstance>> {
        let connections = self
            .connections
            .read()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        Ok(connections
            .iter()
            .filter(|connection| {
                connection.organization_id == *organization_id
                    && connection.target_instance_id == *instance_id
            })
            .cloned()
            .collect())
    }

    async fn list_outbound_connections(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<Vec<ConnectionInstance>> {
        let connections = self
            .connections
            .read()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        Ok(connections
            .iter()
            .filter(|connection| {
                connection.organization_id == *organization_id
                    && connection.source_instance_id == *instance_id
            })
            .cloned()
            .collect())
    }

    async fn add_connection(&self, request: AddConnectionRequest) -> ManagerResult<()> {
        let (source_name, outbound_required, target_name) = {
            let instances = self
                .instances
                .read()
                .map_err(|_| ManagerError::internal("lock poisoned"))?;
            let source = instances
                .get(&Self::key(
                    &request.organization_id,
                    request.source_instance_id.as_str(),
                ))
                .ok_or_else(|| {
                    ManagerError::InstanceNotFound(request.source_instance_id.to_string())
                })?;
            let target = instances
                .get(&Self::key(
                    &request.organization_id,
                    request.target_instance_id.as_str(),
                ))
                .ok_or_else(|| {
                    ManagerError::InstanceNotFound(request.target_instance_id.to_string())
                })?;
            let required = source
                .outbound_net_interfaces
                .iter()
                .find(|outbound| outbound.name == request.outbound_name)
                .is_some_and(|outbound| outbound.required);
            (source.name.clone(), required, target.name.clone())
        };

        let connection = ConnectionInstance {
            organization_id: request.organization_id,
            connection_id: ulid::Ulid::new().to_string().to_lowercase(),
            source_instance_id: request.source_instance_id,
            source_instance_name: source_name,
            target_instance_id: request.target_instance_id,
            target_instance_name: target_name,
            inbound_name: request.inbound_name,
            outbound_name: request.outbound_name,
            outbound_required,
            status: ConnectionStatus::Waiting,
            ip_range: None,
        };

        let mut connections = self
            .connections
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        let duplicate = connections.iter().any(|existing| {
            existing.organization_id == connection.organization_id
                && existing.source_instance_id == connection.source_instance_id
                && existing.target_instance_id == connection.target_instance_id
                && existing.inbound_name == connection.inbound_name
                && existing.outbound_name == connection.outbound_name
        });
        if duplicate {
            return Err(ManagerError::store("connection already exists"));
        }
        connections.push(connection);
        Ok(())
    }

    async fn remove_connection(&self, request: RemoveConnectionRequest) -> ManagerResult<()> {
        let mut connections = self
            .connections
            .write()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        let before = connections.len();
        connections.retain(|connection| {
            !(connection.organization_id == request.organization_id
                && connection.source_instance_id == request.source_instance_id
                && connection.target_instance_id == request.target_instance_id
                && connection.inbound_name == request.inbound_name
                && connection.outbound_name == request.outbound_name)
        });
        if connections.len() == before {
            return Err(ManagerError::store("connection not found"));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceRegistry for MemoryStore {
    async fn get_device_group(
        &self,
        organization_id: &OrganizationId,
        device_group_id: &str,
    ) -> ManagerResult<DeviceGroup> {
        let groups = self
            .device_groups
            .read()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        groups
            .get(&Self::key(organization_id, device_group_id))
            .cloned()
            .ok_or_else(|| ManagerError::DeviceGroupNotFound(device_group_id.to_owned()))
    }
}

#[async_trait]
impl SettingsLookup for MemoryStore {
    async fn get_setting(
        &self,
        organization_id: &OrganizationId,
        key: &str,
    ) -> ManagerResult<Option<String>> {
        let settings = self
            .settings
            .read()
            .map_err(|_| ManagerError::internal("lock poisoned"))?;
        Ok(settings.get(&Self::key(organization_id, key)).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use meridian_core::AppStatus;

    use crate::store::test_fixtures::{deploy_request, sample_descriptor};

    use super::*;

    #[tokio::test]
    async fn add_and_get_descriptor_round_trip() {
        let store = MemoryStore::new();
        let descriptor = sample_descriptor("org-1", "desc-1");
        store.add_descriptor(descriptor.clone()).await.unwrap();

        let fetched = store
            .get_descriptor(&descriptor.organization_id, &descriptor.app_descriptor_id)
            .await
            .unwrap();
        assert_eq!(fetched.name, "sample");
        assert_eq!(fetched.groups.len(), 1);

        let listed = store
            .list_descriptors(&descriptor.organization_id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_descriptor_is_rejected() {
        let store = MemoryStore::new();
        let descriptor = sample_descriptor("org-1", "desc-1");
        store.add_descriptor(descriptor.clone()).await.unwrap();

        let err = store.add_descriptor(descriptor).await.unwrap_err();
        assert!(matches!(err, ManagerError::Store(_)));
    }

    #[tokio::test]
    async fn missing_descriptor_reports_not_found() {
        let store = MemoryStore::new();
        let err = store
            .get_descriptor(&OrganizationId::new("org-1"), &DescriptorId::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::DescriptorNotFound(_)));
    }

    #[tokio::test]
    async fn create_instance_seeds_from_descriptor_and_records_parameters() {
        let store = MemoryStore::new();
        let descriptor = sample_descriptor("org-1", "desc-1");
        store.add_descriptor(descriptor.clone()).await.unwrap();

        let request = deploy_request(&descriptor, "run-1");
        let instance = store.create_instance(&request).await.unwrap();

        assert_eq!(instance.status, AppStatus::Queued);
        assert_eq!(instance.name, "run-1");
        assert_eq!(instance.groups.len(), 1);
        assert!(instance.has_inbound("in1"));

        let parameters = store
            .get_instance_parameters(&descriptor.organization_id, &instance.app_instance_id)
            .await
            .unwrap();
        assert_eq!(parameters.len(), 1);
        assert_eq!(parameters[0].parameter_name, "replicas");
    }

    #[tokio::test]
    async fn create_instance_for_unknown_descriptor_fails() {
        let store = MemoryStore::new();
        let descriptor = sample_descriptor("org-1", "desc-1");
        let err = store
            .create_instance(&deploy_request(&descriptor, "run-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::DescriptorNotFound(_)));
    }

    #[tokio::test]
    async fn update_instance_replaces_the_record() {
        let store = MemoryStore::new();
        let descriptor = sample_descriptor("org-1", "desc-1");
        store.add_descriptor(descriptor.clone()).await.unwrap();
        let mut instance = store
            .create_instance(&deploy_request(&descriptor, "run-1"))
            .await
            .unwrap();

        instance.status = AppStatus::Running;
        store.update_instance(instance.clone()).await.unwrap();

        let fetched = store
            .get_instance(&descriptor.organization_id, &instance.app_instance_id)
            .await
            .unwrap();
        assert_eq!(fetched.status, AppStatus::Running);
    }

    #[tokio::test]
    async fn remove_instance_drops_parametrized_state() {
        let store = MemoryStore::new();
        let descriptor = sample_descriptor("org-1", "desc-1");
        store.add_descriptor(descriptor.clone()).await.unwrap();
        let instance = store
            .create_instance(&deploy_request(&descriptor, "run-1"))
            .await
            .unwrap();

        let mut parametrized = ParametrizedDescriptor::from_descriptor(&descriptor);
        parametrized.app_instance_id = Some(instance.app_instance_id.clone());
        store.add_parametrized_descriptor(parametrized).await.unwrap();
        store
            .get_parametrized_descriptor(&descriptor.organization_id, &instance.app_instance_id)
            .await
            .unwrap();

        store
            .remove_instance(&descriptor.organization_id, &instance.app_instance_id)
            .await
            .unwrap();

        let err = store
            .get_instance(&descriptor.organization_id, &instance.app_instance_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::InstanceNotFound(_)));
        assert!(store
            .get_parametrized_descriptor(&descriptor.organization_id, &instance.app_instance_id)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn list_instances_is_scoped_to_the_organization() {
        let store = MemoryStore::new();
        let first = sample_descriptor("org-1", "desc-1");
        let second = sample_descriptor("org-2", "desc-2");
        store.add_descriptor(first.clone()).await.unwrap();
        store.add_descriptor(second.clone()).await.unwrap();
        store
            .create_instance(&deploy_request(&first, "run-a"))
            .await
            .unwrap();
        store
            .create_instance(&deploy_request(&second, "run-b"))
            .await
            .unwrap();

        let listed = store.list_instances(&first.organization_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "run-a");
    }

    #[tokio::test]
    async fn connections_resolve_names_and_round_trip() {
        let store = MemoryStore::new();
        let descriptor = sample_descriptor("org-1", "desc-1");
        store.add_descriptor(descriptor.clone()).await.unwrap();
        let source = store
            .create_instance(&deploy_request(&descriptor, "source"))
            .await
            .unwrap();
        let target = store
            .create_instance(&deploy_request(&descriptor, "target"))
            .await
            .unwrap();

        let request = AddConnectionRequest {
            organization_id: descriptor.organization_id.clone(),
            source_instance_id: source.app_instance_id.clone(),
            target_instance_id: target.app_instance_id.clone(),
            inbound_name: "in1".to_string(),
            outbound_name: "out1".to_string(),
        };
        store.add_connection(request.clone()).await.unwrap();

        let outbound = store
            .list_outbound_connections(&descriptor.organization_id, &source.app_instance_id)
            .await
            .unwrap();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].source_instance_name, "source");
        assert_eq!(outbound[0].target_instance_name, "target");
        assert!(outbound[0].outbound_required);
        assert_eq!(outbound[0].status, ConnectionStatus::Waiting);

        let inbound = store
            .list_inbound_connections(&descriptor.organization_id, &target.app_instance_id)
            .await
            .unwrap();
        assert_eq!(inbound.len(), 1);

        let removal = RemoveConnectionRequest {
            organization_id: request.organization_id.clone(),
            source_instance_id: request.source_instance_id.clone(),
            target_instance_id: request.target_instance_id.clone(),
            inbound_name: request.inbound_name.clone(),
            outbound_name: request.outbound_name.clone(),
            user_confirmation: true,
        };
        store.remove_connection(removal.clone()).await.unwrap();
        assert!(store.remove_connection(removal).await.is_err());

        let outbound = store
            .list_outbound_connections(&descriptor.organization_id, &source.app_instance_id)
            .await
            .unwrap();
        assert!(outbound.is_empty());
    }

    #[tokio::test]
    async fn device_groups_and_settings_resolve() {
        let store = MemoryStore::new();
        let organization = OrganizationId::new("org-1");
        store
            .register_device_group(DeviceGroup {
                organization_id: organization.clone(),
                device_group_id: "dg-1".to_string(),
                name: "devices".to_string(),
            })
            .unwrap();

        let group = store.get_device_group(&organization, "dg-1").await.unwrap();
        assert_eq!(group.name, "devices");
        let err = store
            .get_device_group(&organization, "dg-9")
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::DeviceGroupNotFound(_)));

        store
            .put_setting(&organization, "default_storage_size", "5242880")
            .unwrap();
        let value = store
            .get_setting(&organization, "default_storage_size")
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("5242880"));
        let missing = store.get_setting(&organization, "unknown").await.unwrap();
        assert!(missing.is_none());
    }
}
