//! Core identifier and status types for meridian.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for an organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(String);

impl OrganizationId {
    /// Create a new organization ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for OrganizationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for an application descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptorId(String);

impl DescriptorId {
    /// Create a new descriptor ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique descriptor ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DescriptorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for an application instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Create a new instance ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique instance ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of an application instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    /// Instance created, scheduling command queued.
    Queued,
    /// Scheduler is planning cluster placement.
    Planning,
    /// Placement decided, waiting for deployment.
    Scheduled,
    /// Services are being deployed on target clusters.
    Deploying,
    /// All services running.
    Running,
    /// Some services running, some not.
    Incomplete,
    /// Placement planning failed.
    PlanningError,
    /// Deployment on a target cluster failed.
    DeploymentError,
    /// Unrecoverable error.
    Error,
}

impl AppStatus {
    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Planning => "planning",
            Self::Scheduled => "scheduled",
            Self::Deploying => "deploying",
            Self::Running => "running",
            Self::Incomplete => "incomplete",
            Self::PlanningError => "planning_error",
            Self::DeploymentError => "deployment_error",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AppStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "planning" => Ok(Self::Planning),
            "scheduled" => Ok(Self::Scheduled),
            "deploying" => Ok(Self::Deploying),
            "running" => Ok(Self::Running),
            "incomplete" => Ok(Self::Incomplete),
            "planning_error" => Ok(Self::PlanningError),
            "deployment_error" => Ok(Self::DeploymentError),
            "error" => Ok(Self::Error),
            _ => Err(format!("unknown application status: {s}")),
        }
    }
}

/// Status of a network connection between two instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Connection requested but not yet established.
    Waiting,
    /// Connection is live.
    Established,
    /// Connection has been torn down.
    Terminated,
    /// Connection setup failed.
    Failed,
}

impl ConnectionStatus {
    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Established => "established",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered device group within an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceGroup {
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Unique device group identifier.
    pub device_group_id: String,
    /// Human-readable group name.
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn instance_id_generation_is_unique() {
        let a = InstanceId::generate();
        let b = InstanceId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), a.as_str().to_lowercase());
    }

    #[test]
    fn app_status_round_trip() {
        for status in [
            AppStatus::Queued,
            AppStatus::Planning,
            AppStatus::Scheduled,
            AppStatus::Deploying,
            AppStatus::Running,
            AppStatus::Incomplete,
            AppStatus::PlanningError,
            AppStatus::DeploymentError,
            AppStatus::Error,
        ] {
            assert_eq!(AppStatus::from_str(status.as_str()), Ok(status));
        }
    }

    #[test]
    fn app_status_rejects_unknown() {
        assert!(AppStatus::from_str("floating").is_err());
    }
}
