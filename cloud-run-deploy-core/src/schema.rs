//! Declarative configuration schema for the `gcp-cloud-run` operator.
//!
//! The schema is a static table of [`FieldSpec`]s. [`validate`] walks that
//! table over an untyped JSON map, applies defaults and coercion, and produces
//! a strongly typed [`DeploymentSpec`]. Every problem is collected, so a user
//! fixing a config file sees all of them at once.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{FieldError, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Boolean,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Str(&'static str),
    Int(i64),
    Bool(bool),
}

impl DefaultValue {
    fn to_value(self) -> Value {
        match self {
            DefaultValue::Str(s) => Value::String(s.to_owned()),
            DefaultValue::Int(i) => Value::from(i),
            DefaultValue::Bool(b) => Value::Bool(b),
        }
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Str(s) => write!(f, "{s:?}"),
            DefaultValue::Int(i) => write!(f, "{i}"),
            DefaultValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// One named deployment parameter.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<DefaultValue>,
    /// Convert compatible input to `field_type` before type checking.
    pub coerce: bool,
    pub help: &'static str,
}

pub const OPERATOR_SCHEMA: &[FieldSpec] = &[
    FieldSpec {
        name: "project_id",
        field_type: FieldType::String,
        required: true,
        default: None,
        coerce: false,
        help: "Your project_id will be a unique ID for each of your projects on GCP. It defines how your app interacts with Google services and what resources it uses. Read more https://developers.google.com/workspace/marketplace/create-gcp-project.",
    },
    FieldSpec {
        name: "region",
        field_type: FieldType::String,
        required: true,
        default: None,
        coerce: false,
        help: "The GCP region where you want to deploy the service. Check the official list to know more about regions available https://cloud.google.com/run/docs/locations",
    },
    FieldSpec {
        name: "port",
        field_type: FieldType::Integer,
        required: true,
        default: Some(DefaultValue::Int(5000)),
        coerce: true,
        help: "The port to which you will send API requests. Note: the port should be the same that the service is listening to (default: 5000)",
    },
    FieldSpec {
        name: "min_instances",
        field_type: FieldType::Integer,
        required: true,
        default: Some(DefaultValue::Int(0)),
        coerce: true,
        help: "Minimum number of instances the deployment should keep ready to serve requests. Note: keeping more than 0 minimum instances can incur billing costs. Read more https://cloud.google.com/run/docs/configuring/min-instances",
    },
    FieldSpec {
        name: "max_instances",
        field_type: FieldType::Integer,
        required: true,
        default: Some(DefaultValue::Int(1)),
        coerce: true,
        help: "Maximum number of instances the deployment should scale to serve traffic. Note: keeping a reasonable number of instances can help control billing costs. Read more https://cloud.google.com/run/docs/configuring/max-instances",
    },
    FieldSpec {
        name: "memory",
        field_type: FieldType::String,
        required: true,
        default: Some(DefaultValue::Str("512Mi")),
        coerce: true,
        help: "RAM for each available instance. Note: if your service exceeds this amount, GCP will terminate the container instance. Read more https://cloud.google.com/run/docs/configuring/memory-limits [Memory Suffixes: T, G, M, k, Ti, Gi, Mi, Ki]",
    },
    FieldSpec {
        name: "cpu",
        field_type: FieldType::Integer,
        required: true,
        default: Some(DefaultValue::Int(1)),
        coerce: true,
        help: "CPU cores for each available instance. Note: container instances only get CPU during request processing and startup. Read more https://cloud.google.com/run/docs/configuring/cpu-allocation",
    },
    FieldSpec {
        name: "allow_unauthenticated",
        field_type: FieldType::Boolean,
        required: true,
        default: Some(DefaultValue::Bool(true)),
        coerce: false,
        help: "Specifies if the service should receive public API requests. Read more https://cloud.google.com/run/docs/authenticating/public",
    },
    FieldSpec {
        name: "platform",
        field_type: FieldType::String,
        required: true,
        default: Some(DefaultValue::Str("managed")),
        coerce: false,
        help: "Target platform for running commands. Note: the operator only supports `managed`. Read more https://cloud.google.com/sdk/gcloud/reference/run/deploy#--platform",
    },
];

pub fn fields() -> &'static [FieldSpec] {
    OPERATOR_SCHEMA
}

/// Cloud Run platform flavours. Only the fully managed platform is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Managed,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Managed => "managed",
        }
    }
}

/// A validated deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub project_id: String,
    pub region: String,
    pub port: u16,
    pub min_instances: u32,
    pub max_instances: u32,
    pub memory: String,
    pub cpu: u32,
    pub allow_unauthenticated: bool,
    pub platform: Platform,
}

impl DeploymentSpec {
    pub fn trace_loaded(&self) {
        info!(
            project_id = %self.project_id,
            region = %self.region,
            port = self.port,
            min_instances = self.min_instances,
            max_instances = self.max_instances,
            memory = %self.memory,
            cpu = self.cpu,
            allow_unauthenticated = self.allow_unauthenticated,
            "Loaded deployment spec"
        );
    }
}

fn memory_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9]+(k|M|G|T|Ki|Mi|Gi|Ti)?$").expect("memory pattern is valid")
    })
}

/// Validate an untyped configuration map against [`OPERATOR_SCHEMA`].
pub fn validate(input: &Map<String, Value>) -> Result<DeploymentSpec, ValidationErrors> {
    let mut errors = Vec::new();
    let mut resolved = Map::new();

    for field in OPERATOR_SCHEMA {
        match resolve_field(field, input.get(field.name)) {
            Ok(Some(value)) => {
                resolved.insert(field.name.to_owned(), value);
            }
            Ok(None) => {}
            Err(message) => errors.push(FieldError {
                field: field.name.to_owned(),
                message,
            }),
        }
    }

    let mut unknown: Vec<&String> = input
        .keys()
        .filter(|key| !OPERATOR_SCHEMA.iter().any(|f| f.name == key.as_str()))
        .collect();
    unknown.sort();
    for key in unknown {
        errors.push(FieldError {
            field: key.clone(),
            message: "unknown field".to_owned(),
        });
    }

    if !errors.is_empty() {
        debug!(?errors, "Configuration rejected during typing");
        return Err(ValidationErrors(errors));
    }

    check_rules(&resolved)
}

fn resolve_field(field: &FieldSpec, raw: Option<&Value>) -> Result<Option<Value>, String> {
    let value = match raw {
        None | Some(Value::Null) => match field.default {
            Some(default) => return Ok(Some(default.to_value())),
            None if raw.is_some() => return Err("null value not allowed".to_owned()),
            None if field.required => return Err("required field".to_owned()),
            None => return Ok(None),
        },
        Some(value) => value,
    };

    let value = if field.coerce {
        coerce(field.field_type, value)
            .ok_or_else(|| format!("cannot be coerced to {}", field.field_type))?
    } else {
        value.clone()
    };

    let type_matches = match field.field_type {
        FieldType::String => value.is_string(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Boolean => value.is_boolean(),
    };
    if !type_matches {
        return Err(format!("must be of {} type", field.field_type));
    }
    Ok(Some(value))
}

fn coerce(target: FieldType, value: &Value) -> Option<Value> {
    match target {
        FieldType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| Value::from(f.trunc() as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            Value::Bool(b) => Some(Value::from(i64::from(*b))),
            _ => None,
        },
        FieldType::String => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        FieldType::Boolean => value.as_bool().map(Value::Bool),
    }
}

fn check_rules(resolved: &Map<String, Value>) -> Result<DeploymentSpec, ValidationErrors> {
    let mut errors = Vec::new();

    let string = |name: &str| {
        resolved
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };

    let project_id = string("project_id");
    if project_id.trim().is_empty() {
        errors.push(field_error("project_id", "must not be empty".to_owned()));
    }
    let region = string("region");
    if region.trim().is_empty() {
        errors.push(field_error("region", "must not be empty".to_owned()));
    }

    let port = match resolved.get("port").and_then(Value::as_i64) {
        Some(n) if (1..=65535).contains(&n) => u16::try_from(n).ok(),
        _ => None,
    };
    if port.is_none() {
        let raw = resolved.get("port").cloned().unwrap_or_default();
        errors.push(field_error("port", format!("{raw} is outside 1..=65535")));
    }
    let min_instances = bounded::<u32>(resolved, "min_instances", 0, &mut errors);
    let max_instances = bounded::<u32>(resolved, "max_instances", 1, &mut errors);
    if let (Some(min), Some(max)) = (min_instances, max_instances) {
        if min > max {
            errors.push(field_error(
                "min_instances",
                format!("{min} exceeds max_instances ({max})"),
            ));
        }
    }
    let cpu = bounded::<u32>(resolved, "cpu", 1, &mut errors);
    let memory = string("memory");
    if !memory_pattern().is_match(&memory) {
        errors.push(field_error(
            "memory",
            format!("{memory:?} is not a quantity such as 512Mi or 2G"),
        ));
    }
    let platform = string("platform");
    if platform != Platform::Managed.as_str() {
        errors.push(field_error(
            "platform",
            format!("{platform:?} is not supported, only \"managed\" is"),
        ));
    }
    let allow_unauthenticated = resolved
        .get("allow_unauthenticated")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    match (port, min_instances, max_instances, cpu) {
        (Some(port), Some(min_instances), Some(max_instances), Some(cpu))
            if errors.is_empty() =>
        {
            Ok(DeploymentSpec {
                project_id,
                region,
                port,
                min_instances,
                max_instances,
                memory,
                cpu,
                allow_unauthenticated,
                platform: Platform::Managed,
            })
        }
        _ => {
            errors.sort_by_key(|e| schema_position(&e.field));
            Err(ValidationErrors(errors))
        }
    }
}

fn field_error(field: &str, message: String) -> FieldError {
    FieldError {
        field: field.to_owned(),
        message,
    }
}

/// Reads an integer field that must be at least `min` and fit in `T`.
fn bounded<T: TryFrom<i64>>(
    resolved: &Map<String, Value>,
    name: &str,
    min: i64,
    errors: &mut Vec<FieldError>,
) -> Option<T> {
    let raw = resolved.get(name)?;
    let Some(n) = raw.as_i64() else {
        errors.push(field_error(name, format!("{raw} is out of range")));
        return None;
    };
    if n < min {
        errors.push(field_error(name, format!("{n} is below {min}")));
        return None;
    }
    match T::try_from(n) {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(field_error(name, format!("{n} is out of range")));
            None
        }
    }
}

fn schema_position(field: &str) -> usize {
    OPERATOR_SCHEMA
        .iter()
        .position(|f| f.name == field)
        .unwrap_or(OPERATOR_SCHEMA.len())
}
