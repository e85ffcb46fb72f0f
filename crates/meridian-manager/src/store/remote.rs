//! HTTP client for the platform store service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use meridian_core::descriptor::{AppParameter, InstanceParameter};
use meridian_core::instance::{AddConnectionRequest, RemoveConnectionRequest};
use meridian_core::{
    AppDescriptor, AppInstance, ConnectionInstance, DeployRequest, DescriptorId, DeviceGroup,
    InstanceId, OrganizationId, ParametrizedDescriptor,
};

use crate::config::StoreConfig;
use crate::devices::DeviceRegistry;
use crate::error::{ManagerError, ManagerResult};
use crate::settings::SettingsLookup;

use super::{ApplicationStore, ConnectionStore};

/// Readiness response from the store service.
#[derive(serde::Deserialize)]
struct ReadyResponse {
    ready: bool,
}

/// Raw setting value from the store service.
#[derive(serde::Deserialize)]
struct SettingValue {
    value: String,
}

/// HTTP client for the store service holding descriptors, instances,
/// connections and organization registries.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: Client,
    base_url: String,
}

impl RemoteStore {
    /// Create a new store client from configuration.
    pub fn new(config: &StoreConfig) -> ManagerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ManagerError::Http)?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
        })
    }

    /// Create a new store client with a custom base URL.
    pub fn with_url(url: impl Into<String>) -> ManagerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(ManagerError::Http)?;

        Ok(Self {
            client,
            base_url: url.into().trim_end_matches('/').to_owned(),
        })
    }

    /// Check if the store service is ready.
    pub async fn ready(&self) -> ManagerResult<bool> {
        let url = format!("{}/ready", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        let ready: ReadyResponse = response.json().await.map_err(ManagerError::Http)?;
        Ok(ready.ready)
    }

    /// Wait for the store service to become ready.
    ///
    /// Returns an error if the service is not ready within the timeout.
    pub async fn wait_ready(&self, timeout: Duration) -> ManagerResult<()> {
        let start = std::time::Instant::now();
        let poll_interval = Duration::from_millis(500);

        loop {
            match self.ready().await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(_) if start.elapsed() < timeout => {}
                Err(e) => return Err(e),
            }

            if start.elapsed() >= timeout {
                return Err(ManagerError::store("store not ready within timeout"));
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[async_trait]
impl ApplicationStore for RemoteStore {
    async fn add_descriptor(&self, descriptor: AppDescriptor) -> ManagerResult<()> {
        let url = format!(
            "{}/organizations/{}/descriptors",
            self.base_url, descriptor.organization_id
        );
        let response = self
            .client
            .post(&url)
            .json(&descriptor)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(()),
            StatusCode::CONFLICT => Err(ManagerError::store(format!(
                "descriptor already exists: {}",
                descriptor.app_descriptor_id
            ))),
            status => Err(ManagerError::store(format!(
                "failed to add descriptor: {status}"
            ))),
        }
    }

    async fn get_descriptor(
        &self,
        organization_id: &OrganizationId,
        descriptor_id: &DescriptorId,
    ) -> ManagerResult<AppDescriptor> {
        let url = format!(
            "{}/organizations/{organization_id}/descriptors/{descriptor_id}",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::OK => response.json().await.map_err(ManagerError::Http),
            StatusCode::NOT_FOUND => {
                Err(ManagerError::DescriptorNotFound(descriptor_id.to_string()))
            }
            status => Err(ManagerError::store(format!(
                "failed to get descriptor: {status}"
            ))),
        }
    }

    async fn list_descriptors(
        &self,
        organization_id: &OrganizationId,
    ) -> ManagerResult<Vec<AppDescriptor>> {
        let url = format!(
            "{}/organizations/{organization_id}/descriptors",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        if !response.status().is_success() {
            return Err(ManagerError::store(format!(
                "failed to list descriptors: {}",
                response.status()
            )));
        }

        response.json().await.map_err(ManagerError::Http)
    }

    async fn remove_descriptor(
        &self,
        organization_id: &OrganizationId,
        descriptor_id: &DescriptorId,
    ) -> ManagerResult<()> {
        let url = format!(
            "{}/organizations/{organization_id}/descriptors/{descriptor_id}",
            self.base_url
        );
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                Err(ManagerError::DescriptorNotFound(descriptor_id.to_string()))
            }
            status => Err(ManagerError::store(format!(
                "failed to remove descriptor: {status}"
            ))),
        }
    }

    async fn create_instance(&self, request: &DeployRequest) -> ManagerResult<AppInstance> {
        let url = format!(
            "{}/organizations/{}/instances",
            self.base_url, request.organization_id
        );
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => {
                response.json().await.map_err(ManagerError::Http)
            }
            StatusCode::NOT_FOUND => Err(ManagerError::DescriptorNotFound(
                request.app_descriptor_id.to_string(),
            )),
            status => Err(ManagerError::store(format!(
                "failed to create instance: {status}"
            ))),
        }
    }

    async fn get_instance(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<AppInstance> {
        let url = format!(
            "{}/organizations/{organization_id}/instances/{instance_id}",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::OK => response.json().await.map_err(ManagerError::Http),
            StatusCode::NOT_FOUND => Err(ManagerError::InstanceNotFound(instance_id.to_string())),
            status => Err(ManagerError::store(format!(
                "failed to get instance: {status}"
            ))),
        }
    }

    async fn update_instance(&self, instance: AppInstance) -> ManagerResult<()> {
        let url = format!(
            "{}/organizations/{}/instances/{}",
            self.base_url, instance.organization_id, instance.app_instance_id
        );
        let response = self
            .client
            .put(&url)
            .json(&instance)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(ManagerError::InstanceNotFound(
                instance.app_instance_id.to_string(),
            )),
            status => Err(ManagerError::store(format!(
                "failed to update instance: {status}"
            ))),
        }
    }

    async fn remove_instance(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<()> {
        let url = format!(
            "{}/organizations/{organization_id}/instances/{instance_id}",
            self.base_url
        );
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(ManagerError::InstanceNotFound(instance_id.to_string())),
            status => Err(ManagerError::store(format!(
                "failed to remove instance: {status}"
            ))),
        }
    }

    async fn list_instances(
        &self,
        organization_id: &OrganizationId,
    ) -> ManagerResult<Vec<AppInstance>> {
        let url = format!(
            "{}/organizations/{organization_id}/instances",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        if !response.status().is_success() {
            return Err(ManagerError::store(format!(
                "failed to list instances: {}",
                response.status()
            )));
        }

        response.json().await.map_err(ManagerError::Http)
    }

    async fn add_parametrized_descriptor(
        &self,
        descriptor: ParametrizedDescriptor,
    ) -> ManagerResult<()> {
        let instance_id = descriptor
            .app_instance_id
            .as_ref()
            .ok_or_else(|| ManagerError::internal("parametrized descriptor has no owning instance"))?
            .clone();
        let url = format!(
            "{}/organizations/{}/instances/{instance_id}/parametrized",
            self.base_url, descriptor.organization_id
        );
        let response = self
            .client
            .post(&url)
            .json(&descriptor)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(()),
            status => Err(ManagerError::store(format!(
                "failed to add parametrized descriptor: {status}"
            ))),
        }
    }

    async fn get_parametrized_descriptor(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<ParametrizedDescriptor> {
        let url = format!(
            "{}/organizations/{organization_id}/instances/{instance_id}/parametrized",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::OK => response.json().await.map_err(ManagerError::Http),
            StatusCode::NOT_FOUND => Err(ManagerError::store(format!(
                "parametrized descriptor not found: {instance_id}"
            ))),
            status => Err(ManagerError::store(format!(
                "failed to get parametrized descriptor: {status}"
            ))),
        }
    }

    async fn get_instance_parameters(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<Vec<InstanceParameter>> {
        let url = format!(
            "{}/organizations/{organization_id}/instances/{instance_id}/parameters",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::OK => response.json().await.map_err(ManagerError::Http),
            StatusCode::NOT_FOUND => Err(ManagerError::InstanceNotFound(instance_id.to_string())),
            status => Err(ManagerError::store(format!(
                "failed to get instance parameters: {status}"
            ))),
        }
    }

    async fn get_descriptor_parameters(
        &self,
        organization_id: &OrganizationId,
        descriptor_id: &DescriptorId,
    ) -> ManagerResult<Vec<AppParameter>> {
        let url = format!(
            "{}/organizations/{organization_id}/descriptors/{descriptor_id}/parameters",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::OK => response.json().await.map_err(ManagerError::Http),
            StatusCode::NOT_FOUND => {
                Err(ManagerError::DescriptorNotFound(descriptor_id.to_string()))
            }
            status => Err(ManagerError::store(format!(
                "failed to get descriptor parameters: {status}"
            ))),
        }
    }
}

#[async_trait]
impl ConnectionStore for RemoteStore {
    async fn list_inbound_connections(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<Vec<ConnectionInstance>> {
        let url = format!(
            "{}/organizations/{organization_id}/instances/{instance_id}/connections/inbound",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        if !response.status().is_success() {
            return Err(ManagerError::store(format!(
                "failed to list inbound connections: {}",
                response.status()
            )));
        }

        response.json().await.map_err(ManagerError::Http)
    }

    async fn list_outbound_connections(
        &self,
        organization_id: &OrganizationId,
        instance_id: &InstanceId,
    ) -> ManagerResult<Vec<ConnectionInstance>> {
        let url = format!(
            "{}/organizations/{organization_id}/instances/{instance_id}/connections/outbound",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        if !response.status().is_success() {
            return Err(ManagerError::store(format!(
                "failed to list outbound connections: {}",
                response.status()
            )));
        }

        response.json().await.map_err(ManagerError::Http)
    }

    async fn add_connection(&self, request: AddConnectionRequest) -> ManagerResult<()> {
        let url = format!("{}/connections", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(ManagerError::InstanceNotFound(
                request.target_instance_id.to_string(),
            )),
            status => Err(ManagerError::store(format!(
                "failed to add connection: {status}"
            ))),
        }
    }

    async fn remove_connection(&self, request: RemoveConnectionRequest) -> ManagerResult<()> {
        let url = format!("{}/connections/remove", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(ManagerError::store("connection not found")),
            status => Err(ManagerError::store(format!(
                "failed to remove connection: {status}"
            ))),
        }
    }
}

#[async_trait]
impl DeviceRegistry for RemoteStore {
    async fn get_device_group(
        &self,
        organization_id: &OrganizationId,
        device_group_id: &str,
    ) -> ManagerResult<DeviceGroup> {
        let url = format!(
            "{}/organizations/{organization_id}/device-groups/{device_group_id}",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::OK => response.json().await.map_err(ManagerError::Http),
            StatusCode::NOT_FOUND => Err(ManagerError::DeviceGroupNotFound(
                device_group_id.to_owned(),
            )),
            status => Err(ManagerError::store(format!(
                "failed to get device group: {status}"
            ))),
        }
    }
}

#[async_trait]
impl SettingsLookup for RemoteStore {
    async fn get_setting(
        &self,
        organization_id: &OrganizationId,
        key: &str,
    ) -> ManagerResult<Option<String>> {
        let url = format!(
            "{}/organizations/{organization_id}/settings/{key}",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ManagerError::Http)?;

        match response.status() {
            StatusCode::OK => {
                let setting: SettingValue = response.json().await.map_err(ManagerError::Http)?;
                Ok(Some(setting.value))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(ManagerError::store(format!(
                "failed to get setting: {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let config = StoreConfig::default();
        let client = RemoteStore::new(&config);
        assert!(client.is_ok());
    }

    #[test]
    fn client_with_url() {
        let client = RemoteStore::with_url("http://localhost:8800/");
        assert!(client.is_ok());
    }
}
