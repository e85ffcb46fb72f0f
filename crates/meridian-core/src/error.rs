//! Error types for meridian-core.

/// Result type alias using [`ModelError`].
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors produced by the pure domain layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    /// Descriptor failed structural or referential validation.
    #[error("invalid descriptor: {reason}")]
    InvalidDescriptor {
        /// Human-readable violation, naming the offending identifiers.
        reason: String,
    },

    /// A request field failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Instance parameter has no matching definition in the descriptor.
    #[error("parameter not found in descriptor definition: {name}")]
    ParameterNotFound {
        /// Name of the undeclared parameter.
        name: String,
    },

    /// Instance parameter value does not satisfy its declared type.
    #[error("invalid value for parameter {name}: {value}")]
    InvalidParameterValue {
        /// Parameter name.
        name: String,
        /// Rejected raw value.
        value: String,
    },

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),
}

impl ModelError {
    /// Create a descriptor validation error.
    #[must_use]
    pub fn invalid_descriptor(reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error.
    #[must_use]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a serialisation error.
    #[must_use]
    pub fn serialisation(msg: impl Into<String>) -> Self {
        Self::Serialisation(msg.into())
    }
}
