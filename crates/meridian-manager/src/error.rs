//! Error types for meridian-manager.

use meridian_core::ModelError;

/// Result type alias using [`ManagerError`].
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors that can occur in the application manager.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// Domain-layer validation or parametrization failure.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Descriptor not found.
    #[error("descriptor not found: {0}")]
    DescriptorNotFound(String),

    /// Instance not found.
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// A parameter marked required was not supplied at deploy time.
    #[error("required parameter not supplied: {name}")]
    RequiredParameterMissing {
        /// Name of the missing parameter.
        name: String,
    },

    /// An outbound marked required was not satisfied by the deploy request.
    #[error("required outbound not satisfied: {name}")]
    RequiredOutboundMissing {
        /// Name of the unsatisfied outbound interface.
        name: String,
    },

    /// A requested connection targets an inbound the instance does not expose.
    #[error("instance {instance_id} does not expose inbound {inbound}")]
    InboundNotFound {
        /// Target instance.
        instance_id: String,
        /// Missing inbound interface name.
        inbound: String,
    },

    /// A requested connection names an outbound the source does not declare.
    #[error("instance {instance_id} does not declare outbound {outbound}")]
    OutboundNotFound {
        /// Source instance.
        instance_id: String,
        /// Missing outbound interface name.
        outbound: String,
    },

    /// Connection not found.
    #[error("connection not found")]
    ConnectionNotFound,

    /// Device group not found.
    #[error("device group not found: {0}")]
    DeviceGroupNotFound(String),

    /// Undeploy refused while dependent applications are connected.
    #[error("instance has inbound connections, undeploy requires user confirmation")]
    UndeployNeedsConfirmation,

    /// Removal of a required connection refused without confirmation.
    #[error("connection outbound is marked required, removal requires user confirmation")]
    RequiredConnectionRemoval,

    /// Descriptor removal refused while instances of it exist.
    #[error("application instances must be removed before deleting the descriptor")]
    DescriptorInUse,

    /// Caller may not act on behalf of the named device group.
    #[error("cannot access device_group_name: {name}")]
    DeviceGroupAccessDenied {
        /// Device group the caller claimed.
        name: String,
    },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// Hand-off queue operation failed.
    #[error("queue error: {0}")]
    Queue(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// External call exceeded its bound.
    #[error("timed out waiting for {operation}")]
    Timeout {
        /// Name of the bounded operation.
        operation: &'static str,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ManagerError {
    /// Create a store error.
    #[must_use]
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a queue error.
    #[must_use]
    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
