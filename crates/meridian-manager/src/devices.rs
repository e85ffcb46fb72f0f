//! Device group registry interface.

use async_trait::async_trait;
use meridian_core::{DeviceGroup, OrganizationId};

use crate::error::ManagerResult;

/// Read-only access to the platform's device group registry.
///
/// Used by the device-facing catalog to confirm that a caller's claimed
/// group name matches the registered group for its ID.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Resolve a device group by ID.
    async fn get_device_group(
        &self,
        organization_id: &OrganizationId,
        device_group_id: &str,
    ) -> ManagerResult<DeviceGroup>;
}
