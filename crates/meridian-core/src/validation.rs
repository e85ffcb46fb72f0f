//! Structural and referential validation of application descriptors.
//!
//! Validation is pure and stateless: every check runs over borrowed data and
//! the first violated check wins. A descriptor is accepted or rejected as a
//! whole; there is no partial registration.

use std::collections::HashSet;

use crate::descriptor::{
    AddAppDescriptorRequest, AppDescriptor, ParamType, PortAccess, SecurityRule, ServiceGroup,
};
use crate::error::{ModelError, ModelResult};
use crate::instance::{
    AddConnectionRequest, DeployRequest, RemoveConnectionRequest, UndeployRequest,
};
use crate::params::coerce_value;
use crate::types::OrganizationId;

/// Prefix marking an environment-variable value as a service binding.
///
/// A binding has the form `MERIDIAN_SERV_<SERVICE>` or
/// `MERIDIAN_SERV_<SERVICE>:<PORT>` and must resolve, case-insensitively, to
/// a service declared in the descriptor.
pub const SERVICE_BINDING_PREFIX: &str = "MERIDIAN_SERV_";

/// Validate the structure of a descriptor.
///
/// Checks run in a fixed order and the first failure is returned:
/// group presence, name uniqueness, deploy-after resolution, group specs,
/// security rule resolution, environment variables.
pub fn validate_descriptor(descriptor: &AppDescriptor) -> ModelResult<()> {
    validate_groups_present(descriptor)?;
    validate_unique_names(descriptor)?;
    validate_deploy_after(descriptor)?;
    validate_group_specs(descriptor)?;
    validate_rules(descriptor)?;
    validate_environment_variables(descriptor)?;
    Ok(())
}

fn validate_groups_present(descriptor: &AppDescriptor) -> ModelResult<()> {
    if descriptor.groups.is_empty() {
        return Err(ModelError::invalid_descriptor(
            "expecting at least one service group",
        ));
    }
    Ok(())
}

/// Group names and service names must be unique descriptor-wide.
///
/// Service-name uniqueness is global rather than per-group so that
/// deploy-after references and rule targets always resolve unambiguously.
fn validate_unique_names(descriptor: &AppDescriptor) -> ModelResult<()> {
    let mut group_names = HashSet::new();
    let mut service_names = HashSet::new();

    for group in &descriptor.groups {
        if !group_names.insert(group.name.as_str()) {
            return Err(ModelError::invalid_descriptor(format!(
                "duplicated group name: {}",
                group.name
            )));
        }
        for service in &group.services {
            if !service_names.insert(service.name.as_str()) {
                return Err(ModelError::invalid_descriptor(format!(
                    "duplicated service name: {}",
                    service.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_deploy_after(descriptor: &AppDescriptor) -> ModelResult<()> {
    for group in &descriptor.groups {
        for service in &group.services {
            for dependency in &service.deploy_after {
                if descriptor.find_service(dependency).is_none() {
                    return Err(ModelError::invalid_descriptor(format!(
                        "deploy_after of service {} references undefined service: {dependency}",
                        service.name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// A group replicated once per cluster cannot also request a literal replica
/// count; replica semantics become cluster-count semantics in that mode.
fn validate_group_specs(descriptor: &AppDescriptor) -> ModelResult<()> {
    for group in &descriptor.groups {
        if let Some(specs) = &group.specs {
            if specs.multi_cluster_replica && specs.replicas > 1 {
                return Err(ModelError::invalid_descriptor(format!(
                    "group {} cannot combine multi_cluster_replica with a replica count",
                    group.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_rules(descriptor: &AppDescriptor) -> ModelResult<()> {
    for rule in &descriptor.rules {
        let target_group = descriptor
            .find_group(&rule.target_service_group_name)
            .ok_or_else(|| {
                ModelError::invalid_descriptor(format!(
                    "rule {} references undefined group: {}",
                    rule.name, rule.target_service_group_name
                ))
            })?;
        if !has_service(target_group, &rule.target_service_name) {
            return Err(ModelError::invalid_descriptor(format!(
                "rule {} references undefined service {} in group {}",
                rule.name, rule.target_service_name, rule.target_service_group_name
            )));
        }

        match rule.access {
            PortAccess::AppServices => validate_app_services_rule(descriptor, rule)?,
            PortAccess::DeviceGroup => validate_device_group_rule(rule)?,
            _ => {}
        }
    }
    Ok(())
}

fn validate_app_services_rule(descriptor: &AppDescriptor, rule: &SecurityRule) -> ModelResult<()> {
    if let Some(auth_group_name) = &rule.auth_service_group_name {
        let auth_group = descriptor.find_group(auth_group_name).ok_or_else(|| {
            ModelError::invalid_descriptor(format!(
                "rule {} references undefined auth group: {auth_group_name}",
                rule.name
            ))
        })?;
        for auth_service in &rule.auth_services {
            if !has_service(auth_group, auth_service) {
                return Err(ModelError::invalid_descriptor(format!(
                    "rule {} references undefined auth service {auth_service} in group {auth_group_name}",
                    rule.name
                )));
            }
        }
    }

    // Application-services access is only granted alongside a device group;
    // pure service-to-service grants are not yet supported by the platform.
    if rule.device_group_names.is_empty() && rule.device_group_ids.is_empty() {
        return Err(ModelError::invalid_descriptor(format!(
            "rule {} grants service-to-service access, which is not yet supported",
            rule.name
        )));
    }
    Ok(())
}

fn validate_device_group_rule(rule: &SecurityRule) -> ModelResult<()> {
    if rule.auth_service_group_name.is_some() || !rule.auth_services.is_empty() {
        return Err(ModelError::invalid_descriptor(format!(
            "device group rule {} must not declare auth services",
            rule.name
        )));
    }
    Ok(())
}

fn validate_environment_variables(descriptor: &AppDescriptor) -> ModelResult<()> {
    let service_names: HashSet<String> = descriptor
        .groups
        .iter()
        .flat_map(|group| group.services.iter())
        .map(|service| service.name.to_lowercase())
        .collect();

    for (key, value) in &descriptor.environment_variables {
        if let Some(binding) = value.strip_prefix(SERVICE_BINDING_PREFIX) {
            let referenced = binding.split(':').next().unwrap_or(binding);
            if !service_names.contains(&referenced.to_lowercase()) {
                return Err(ModelError::invalid_descriptor(format!(
                    "environment variable {key} references undefined service: {value}"
                )));
            }
        }
    }

    for key in descriptor.environment_variables.keys() {
        if key.contains('=') {
            return Err(ModelError::invalid_descriptor(format!(
                "invalid environment variable name: {key}"
            )));
        }
    }
    Ok(())
}

fn has_service(group: &ServiceGroup, name: &str) -> bool {
    group.services.iter().any(|service| service.name == name)
}

/// Validate every storage mount path declared by the descriptor's services.
///
/// Paths must be absolute and well-formed, and no two mounts of one service
/// may overlap (one path being a segment-prefix of another).
pub fn validate_storage_paths(descriptor: &AppDescriptor) -> ModelResult<()> {
    for group in &descriptor.groups {
        for service in &group.services {
            let mut seen: Vec<Vec<&str>> = Vec::new();
            for storage in &service.storage {
                let segments = well_formed_segments(&storage.mount_path).ok_or_else(|| {
                    ModelError::invalid_descriptor(format!(
                        "service {} declares an invalid storage path: {}",
                        service.name, storage.mount_path
                    ))
                })?;
                for previous in &seen {
                    if is_segment_prefix(previous, &segments) || is_segment_prefix(&segments, previous)
                    {
                        return Err(ModelError::invalid_descriptor(format!(
                            "service {} declares overlapping storage paths: /{} and /{}",
                            service.name,
                            previous.join("/"),
                            segments.join("/")
                        )));
                    }
                }
                seen.push(segments);
            }
        }
    }
    Ok(())
}

/// Split an absolute path into segments, rejecting malformed input.
fn well_formed_segments(path: &str) -> Option<Vec<&str>> {
    let rest = path.strip_prefix('/')?;
    if rest.is_empty() {
        // Mounting at the filesystem root is never valid.
        return None;
    }
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    let segments: Vec<&str> = rest.split('/').collect();
    if segments
        .iter()
        .any(|segment| segment.is_empty() || *segment == "." || *segment == "..")
    {
        return None;
    }
    Some(segments)
}

fn is_segment_prefix(prefix: &[&str], path: &[&str]) -> bool {
    prefix.len() <= path.len() && prefix.iter().zip(path.iter()).all(|(a, b)| a == b)
}

/// Validate the descriptor's deploy-time parameter definitions.
pub fn validate_parameter_definitions(descriptor: &AppDescriptor) -> ModelResult<()> {
    let mut names = HashSet::new();
    for parameter in &descriptor.parameters {
        if parameter.name.is_empty() {
            return Err(ModelError::invalid_descriptor(
                "parameter name cannot be empty",
            ));
        }
        if parameter.path.is_empty() {
            return Err(ModelError::invalid_descriptor(format!(
                "parameter {} requires a path",
                parameter.name
            )));
        }
        if !names.insert(parameter.name.as_str()) {
            return Err(ModelError::invalid_descriptor(format!(
                "duplicated parameter name: {}",
                parameter.name
            )));
        }
        if parameter.param_type == ParamType::Enum && parameter.enum_values.is_empty() {
            return Err(ModelError::invalid_descriptor(format!(
                "enum parameter {} declares no allowed values",
                parameter.name
            )));
        }
        if let Some(default) = &parameter.default_value {
            coerce_value(parameter, default)?;
        }
    }
    Ok(())
}

/// Validate the identifying fields of a registration request.
pub fn validate_add_descriptor_request(request: &AddAppDescriptorRequest) -> ModelResult<()> {
    if request.request_id.is_empty() {
        return Err(ModelError::invalid_argument("request_id cannot be empty"));
    }
    validate_organization_id(&request.organization_id)?;
    if request.name.is_empty() {
        return Err(ModelError::invalid_argument("name cannot be empty"));
    }
    Ok(())
}

/// Validate the identifying fields of a deploy request.
pub fn validate_deploy_request(request: &DeployRequest) -> ModelResult<()> {
    validate_organization_id(&request.organization_id)?;
    if request.app_descriptor_id.is_empty() {
        return Err(ModelError::invalid_argument(
            "app_descriptor_id cannot be empty",
        ));
    }
    if request.name.is_empty() {
        return Err(ModelError::invalid_argument("name cannot be empty"));
    }
    Ok(())
}

/// Validate the identifying fields of an undeploy request.
pub fn validate_undeploy_request(request: &UndeployRequest) -> ModelResult<()> {
    validate_organization_id(&request.organization_id)?;
    if request.app_instance_id.is_empty() {
        return Err(ModelError::invalid_argument(
            "app_instance_id cannot be empty",
        ));
    }
    Ok(())
}

/// Validate the identifying fields of an add-connection request.
pub fn validate_add_connection_request(request: &AddConnectionRequest) -> ModelResult<()> {
    validate_connection_fields(
        &request.organization_id,
        request.source_instance_id.is_empty(),
        request.target_instance_id.is_empty(),
        &request.inbound_name,
        &request.outbound_name,
    )
}

/// Validate the identifying fields of a remove-connection request.
pub fn validate_remove_connection_request(request: &RemoveConnectionRequest) -> ModelResult<()> {
    validate_connection_fields(
        &request.organization_id,
        request.source_instance_id.is_empty(),
        request.target_instance_id.is_empty(),
        &request.inbound_name,
        &request.outbound_name,
    )
}

fn validate_connection_fields(
    organization_id: &OrganizationId,
    source_empty: bool,
    target_empty: bool,
    inbound_name: &str,
    outbound_name: &str,
) -> ModelResult<()> {
    validate_organization_id(organization_id)?;
    if source_empty {
        return Err(ModelError::invalid_argument(
            "source_instance_id cannot be empty",
        ));
    }
    if target_empty {
        return Err(ModelError::invalid_argument(
            "target_instance_id cannot be empty",
        ));
    }
    if inbound_name.is_empty() {
        return Err(ModelError::invalid_argument("inbound_name cannot be empty"));
    }
    if outbound_name.is_empty() {
        return Err(ModelError::invalid_argument(
            "outbound_name cannot be empty",
        ));
    }
    Ok(())
}

/// Validate a bare organization ID.
pub fn validate_organization_id(organization_id: &OrganizationId) -> ModelResult<()> {
    if organization_id.is_empty() {
        return Err(ModelError::invalid_argument(
            "organization_id cannot be empty",
        ));
    }
    Ok(())
}
