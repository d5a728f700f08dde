/// `load_config` module: reads a YAML deployment file and turns it into a validated
/// [`DeploymentSpec`] plus an optional deployment name.
///
/// Two layouts are accepted:
/// - a flat mapping of schema fields (`project_id: ...`, `region: ...`), or
/// - a deployment document with `name`, `operator.name` and a `spec` mapping.
///
/// Missing `project_id` / `region` are filled from `CLOUDSDK_CORE_PROJECT` /
/// `CLOUDSDK_RUN_REGION`, the same variables gcloud reads for its defaults.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{bail, Context, Result};
use cloud_run_deploy_core::harness::unique_deployment_name;
use cloud_run_deploy_core::schema::{self, DeploymentSpec};
use cloud_run_deploy_core::OPERATOR_NAME;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const PROJECT_ENV: &str = "CLOUDSDK_CORE_PROJECT";
pub const REGION_ENV: &str = "CLOUDSDK_RUN_REGION";

#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    /// Deployment name from the file, if it declares one.
    pub name: Option<String>,
    pub spec: DeploymentSpec,
}

impl DeploymentConfig {
    /// Pick the deployment name: an explicit one wins over the file's.
    pub fn deployment_name(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .map(str::to_owned)
            .or_else(|| self.name.clone())
            .context("no deployment name: pass --name or set `name` in the config file")
    }

    /// Like [`Self::deployment_name`], but invents a throwaway name when
    /// neither the flag nor the document provides one.
    pub fn smoke_test_name(&self, explicit: Option<&str>) -> String {
        self.deployment_name(explicit)
            .unwrap_or_else(|_| unique_deployment_name("smoke-test"))
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DeploymentConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config = parse_config(&config_content)?;
    config.spec.trace_loaded();
    Ok(config)
}

/// Parse and validate YAML config text.
pub fn parse_config(content: &str) -> Result<DeploymentConfig> {
    let raw: serde_yaml::Value = match serde_yaml::from_str(content) {
        Ok(raw) => raw,
        Err(e) => {
            error!(error = ?e, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };
    let document = match serde_json::to_value(raw).context("Failed to parse config YAML")? {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => bail!("config must be a mapping, found {}", json_kind(&other)),
    };

    let (name, mut fields) = if document.contains_key("spec") {
        split_document(document)?
    } else {
        (None, document)
    };

    inject_env_default(&mut fields, "project_id", PROJECT_ENV);
    inject_env_default(&mut fields, "region", REGION_ENV);

    let spec = schema::validate(&fields).map_err(|e| {
        error!(errors = %e, "Deployment configuration rejected");
        anyhow::Error::new(e).context("invalid deployment configuration")
    })?;

    Ok(DeploymentConfig { name, spec })
}

fn split_document(
    mut document: Map<String, Value>,
) -> Result<(Option<String>, Map<String, Value>)> {
    if let Some(operator) = document.get("operator") {
        let declared = operator
            .get("name")
            .and_then(Value::as_str)
            .context("`operator.name` must be a string")?;
        if declared != OPERATOR_NAME {
            bail!("config targets operator {declared:?}, this tool is {OPERATOR_NAME:?}");
        }
    }

    let name = match document.remove("name") {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) => Some(name),
        Some(other) => bail!("`name` must be a string, found {}", json_kind(&other)),
    };

    let fields = match document.remove("spec") {
        Some(Value::Object(map)) => map,
        Some(Value::Null) | None => Map::new(),
        Some(other) => bail!("`spec` must be a mapping, found {}", json_kind(&other)),
    };
    Ok((name, fields))
}

fn inject_env_default(fields: &mut Map<String, Value>, field: &str, var: &str) {
    let missing = matches!(fields.get(field), None | Some(Value::Null));
    if !missing {
        return;
    }
    if let Ok(value) = std::env::var(var) {
        if !value.trim().is_empty() {
            info!(field, env = var, "Filled field from environment");
            fields.insert(field.to_owned(), Value::String(value));
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
