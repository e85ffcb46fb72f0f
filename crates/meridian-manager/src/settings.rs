//! Organization settings lookup interface.

use async_trait::async_trait;
use meridian_core::OrganizationId;

use crate::error::ManagerResult;

/// Settings key holding an organization's default storage size in bytes.
pub const DEFAULT_STORAGE_SIZE_KEY: &str = "default_storage_size";

/// Read-only lookup of org-scoped settings.
#[async_trait]
pub trait SettingsLookup: Send + Sync {
    /// Fetch a setting value, `None` when the organization has no override.
    async fn get_setting(
        &self,
        organization_id: &OrganizationId,
        key: &str,
    ) -> ManagerResult<Option<String>>;
}
