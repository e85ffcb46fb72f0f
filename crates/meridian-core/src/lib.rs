//! Core domain model for the meridian application manager.
//!
//! This crate is the pure layer of the deployment platform: descriptor and
//! instance entities, the descriptor validator and the parametrization
//! engine. Nothing in here performs I/O; orchestration, persistence and
//! transport live in `meridian-manager`.
//!
//! # Architecture
//!
//! - [`descriptor`]: application templates (groups, services, security rules,
//!   parameter definitions)
//! - [`instance`]: running materializations and orchestration request types
//! - [`validation`]: structural and referential descriptor checks
//! - [`params`]: deploy-time parameter substitution
//!
//! A descriptor passes validation stages in a fixed order, first failure wins:
//!
//! ```text
//! groups present -> unique names -> deploy_after -> group specs
//!                -> security rules -> environment variables
//! ```
//!
//! # Example
//!
//! ```ignore
//! use meridian_core::{validation, params};
//!
//! validation::validate_descriptor(&descriptor)?;
//! let parametrized = params::parametrize(&descriptor, &request.parameters)?;
//! ```

#![forbid(unsafe_code)]

pub mod descriptor;
pub mod error;
pub mod instance;
pub mod params;
pub mod types;
pub mod validation;

pub use descriptor::{
    AddAppDescriptorRequest, AppDescriptor, AppParameter, InstanceParameter, ParamType,
    ParametrizedDescriptor, SecurityRule, Service, ServiceGroup,
};
pub use error::{ModelError, ModelResult};
pub use instance::{
    AppInstance, ConnectionInstance, ConnectionRequest, DeployRequest, DeployResponse,
    UndeployRequest,
};
pub use params::parametrize;
pub use types::{AppStatus, ConnectionStatus, DescriptorId, DeviceGroup, InstanceId, OrganizationId};
pub use validation::{validate_descriptor, validate_parameter_definitions, validate_storage_paths};
