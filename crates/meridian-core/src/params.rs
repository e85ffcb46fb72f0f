//! Deploy-time parametrization of descriptors.
//!
//! Substitution works on a single structured document: the descriptor copy is
//! serialized once, every coerced parameter value is patched in place at its
//! declared path, and the patched document is deserialized once at the end.
//! Any single parameter failure aborts the whole operation with no partial
//! descriptor returned.

use serde_json::{Map, Value};

use crate::descriptor::{
    AppDescriptor, AppParameter, InstanceParameter, ParamType, ParametrizedDescriptor,
};
use crate::error::{ModelError, ModelResult};

/// Apply deploy-time parameter values to a descriptor.
///
/// Returns an unmodified copy when no values are supplied. Unknown parameter
/// names fail with [`ModelError::ParameterNotFound`]; values that do not
/// satisfy their declared type fail with [`ModelError::InvalidParameterValue`].
pub fn parametrize(
    descriptor: &AppDescriptor,
    parameters: &[InstanceParameter],
) -> ModelResult<ParametrizedDescriptor> {
    let copy = ParametrizedDescriptor::from_descriptor(descriptor);
    if parameters.is_empty() {
        return Ok(copy);
    }

    let mut document =
        serde_json::to_value(&copy).map_err(|e| ModelError::serialisation(e.to_string()))?;

    for parameter in parameters {
        let definition = find_definition(descriptor, &parameter.parameter_name)?;
        let value = coerce_value(definition, &parameter.value)?;
        patch_path(&mut document, &split_path(&definition.path), value);
    }

    serde_json::from_value(document).map_err(|e| ModelError::serialisation(e.to_string()))
}

/// Resolve a supplied parameter against the descriptor's declarations.
fn find_definition<'a>(descriptor: &'a AppDescriptor, name: &str) -> ModelResult<&'a AppParameter> {
    if descriptor.parameters.is_empty() {
        return Err(ModelError::invalid_argument(format!(
            "parameter {name} supplied but the descriptor declares no parameters"
        )));
    }
    descriptor
        .parameters
        .iter()
        .find(|definition| definition.name == name)
        .ok_or_else(|| ModelError::ParameterNotFound {
            name: name.to_string(),
        })
}

/// Coerce a raw string value according to a parameter's declared type.
pub fn coerce_value(definition: &AppParameter, raw: &str) -> ModelResult<Value> {
    let invalid = || ModelError::InvalidParameterValue {
        name: definition.name.clone(),
        value: raw.to_string(),
    };

    match definition.param_type {
        ParamType::Boolean => raw.parse::<bool>().map(Value::Bool).map_err(|_| invalid()),
        ParamType::Integer => raw
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| invalid()),
        ParamType::Float => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        ParamType::Enum => {
            if definition.enum_values.iter().any(|allowed| allowed == raw) {
                Ok(Value::String(raw.to_string()))
            } else {
                Err(invalid())
            }
        }
        ParamType::String | ParamType::Password => Ok(Value::String(raw.to_string())),
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|segment| !segment.is_empty()).collect()
}

/// Write `value` at the dot-separated path, overwriting whatever was there.
///
/// Numeric segments address array elements and non-numeric segments address
/// object keys. Missing intermediate nodes are created and arrays are padded
/// with nulls up to the addressed index.
fn patch_path(node: &mut Value, segments: &[&str], value: Value) {
    match segments.split_first() {
        None => *node = value,
        Some((segment, rest)) => match segment.parse::<usize>() {
            Ok(index) => {
                if !node.is_array() {
                    *node = Value::Array(Vec::new());
                }
                if let Value::Array(items) = node {
                    if items.len() <= index {
                        items.resize(index + 1, Value::Null);
                    }
                    patch_path(&mut items[index], rest, value);
                }
            }
            Err(_) => {
                if !node.is_object() {
                    *node = Value::Object(Map::new());
                }
                if let Value::Object(map) = node {
                    let child = map.entry((*segment).to_string()).or_insert(Value::Null);
                    patch_path(child, rest, value);
                }
            }
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::descriptor::{
        CollocationPolicy, GroupSpecs, ParamCategory, Service, ServiceGroup,
    };
    use crate::types::{DescriptorId, OrganizationId};
    use std::collections::HashMap;

    fn parameter(name: &str, path: &str, param_type: ParamType) -> AppParameter {
        AppParameter {
            name: name.to_string(),
            description: String::new(),
            path: path.to_string(),
            param_type,
            default_value: None,
            category: ParamCategory::Basic,
            enum_values: Vec::new(),
            required: false,
        }
    }

    fn test_descriptor() -> AppDescriptor {
        let mut enum_parameter = parameter("mode", "environment_variables.MODE", ParamType::Enum);
        enum_parameter.enum_values = vec!["small".to_string(), "large".to_string()];

        AppDescriptor {
            organization_id: OrganizationId::new("org-1"),
            app_descriptor_id: DescriptorId::new("desc-1"),
            name: "sample".to_string(),
            labels: HashMap::new(),
            configuration_options: HashMap::new(),
            environment_variables: HashMap::from([(
                "MODE".to_string(),
                "small".to_string(),
            )]),
            rules: Vec::new(),
            groups: vec![ServiceGroup {
                name: "g1".to_string(),
                services: vec![Service {
                    name: "service1".to_string(),
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
                }],
                policy: CollocationPolicy::SameCluster,
                specs: Some(GroupSpecs {
                    replicas: 1,
                    multi_cluster_replica: false,
                    deployment_selectors: HashMap::new(),
                }),
                labels: HashMap::new(),
            }],
            parameters: vec![
                parameter(
                    "replicate",
                    "groups.0.specs.multi_cluster_replica",
                    ParamType::Boolean,
                ),
                parameter("replicas", "groups.0.specs.replicas", ParamType::Integer),
                enum_parameter,
            ],
            inbound_net_interfaces: Vec::new(),
            outbound_net_interfaces: Vec::new(),
        }
    }

    fn value_of(name: &str, value: &str) -> InstanceParameter {
        InstanceParameter {
            parameter_name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn no_parameters_returns_plain_copy() {
        let descriptor = test_descriptor();
        let parametrized = parametrize(&descriptor, &[]).unwrap();

        assert_eq!(parametrized.name, descriptor.name);
        assert_eq!(parametrized.groups.len(), 1);
        assert!(parametrized.app_instance_id.is_none());
    }

    #[test]
    fn boolean_value_is_written_at_declared_path() {
        let descriptor = test_descriptor();
        let parametrized = parametrize(&descriptor, &[value_of("replicate", "true")]).unwrap();

        let specs = parametrized.groups[0].specs.as_ref().unwrap();
        assert!(specs.multi_cluster_replica);
        // Everything outside the declared path is untouched.
        assert_eq!(specs.replicas, 1);
        assert_eq!(parametrized.groups[0].services[0].name, "service1");
        assert_eq!(
            parametrized.environment_variables.get("MODE").map(String::as_str),
            Some("small")
        );
    }

    #[test]
    fn integer_value_is_written_at_declared_path() {
        let descriptor = test_descriptor();
        let parametrized = parametrize(&descriptor, &[value_of("replicas", "3")]).unwrap();
        assert_eq!(parametrized.groups[0].specs.as_ref().unwrap().replicas, 3);
    }

    #[test]
    fn enum_value_in_declared_set_is_applied() {
        let descriptor = test_descriptor();
        let parametrized = parametrize(&descriptor, &[value_of("mode", "large")]).unwrap();
        assert_eq!(
            parametrized.environment_variables.get("MODE").map(String::as_str),
            Some("large")
        );
    }

    #[test]
    fn enum_value_outside_declared_set_fails() {
        let descriptor = test_descriptor();
        let err = parametrize(&descriptor, &[value_of("mode", "medium")]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidParameterValue { .. }));
    }

    #[test]
    fn malformed_boolean_fails() {
        let descriptor = test_descriptor();
        let err = parametrize(&descriptor, &[value_of("replicate", "treu")]).unwrap_err();
        match err {
            ModelError::InvalidParameterValue { name, value } => {
                assert_eq!(name, "replicate");
                assert_eq!(value, "treu");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_parameter_fails_with_not_found() {
        let descriptor = test_descriptor();
        let err = parametrize(&descriptor, &[value_of("ghost", "1")]).unwrap_err();
        match err {
            ModelError::ParameterNotFound { name } => assert_eq!(name, "ghost"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn descriptor_without_declarations_rejects_any_value() {
        let mut descriptor = test_descriptor();
        descriptor.parameters.clear();

        let err = parametrize(&descriptor, &[value_of("replicas", "3")]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidArgument(_)));
    }

    #[test]
    fn single_failure_aborts_the_whole_operation() {
        let descriptor = test_descriptor();
        let result = parametrize(
            &descriptor,
            &[value_of("replicas", "3"), value_of("mode", "medium")],
        );
        assert!(result.is_err());
    }

    #[test]
    fn float_coercion_accepts_decimal_values_only() {
        let definition = parameter("load", "labels.load", ParamType::Float);
        assert_eq!(
            coerce_value(&definition, "0.75").unwrap(),
            serde_json::json!(0.75)
        );
        assert!(coerce_value(&definition, "fast").is_err());
        assert!(coerce_value(&definition, "NaN").is_err());
    }

    #[test]
    fn password_values_pass_through_unchanged() {
        let definition = parameter("secret", "environment_variables.SECRET", ParamType::Password);
        assert_eq!(
            coerce_value(&definition, "hunter2").unwrap(),
            Value::String("hunter2".to_string())
        );
    }

    #[test]
    fn patch_creates_missing_intermediate_nodes() {
        let mut document = serde_json::json!({});
        patch_path(
            &mut document,
            &["groups", "1", "specs", "replicas"],
            Value::Number(5.into()),
        );

        assert_eq!(document["groups"][0], Value::Null);
        assert_eq!(document["groups"][1]["specs"]["replicas"], 5);
    }
}
