//! Renders a [`DeploymentSpec`] into `gcloud` argument lists.
//!
//! Nothing here runs a process; see [`crate::operator`] for that.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::DeployError;
use crate::schema::DeploymentSpec;

pub const DEFAULT_GCLOUD: &str = "gcloud";

const MAX_SERVICE_NAME_LEN: usize = 63;

fn service_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").expect("service pattern is valid")
    })
}

/// Map a deployment name onto a valid Cloud Run service name.
///
/// Upper case is folded and underscores become hyphens; anything else that
/// Cloud Run would reject is an error rather than silently rewritten.
pub fn service_name(deployment_name: &str) -> Result<String, DeployError> {
    let candidate = deployment_name.trim().to_lowercase().replace('_', "-");
    let invalid = |reason: &str| DeployError::InvalidServiceName {
        name: deployment_name.to_owned(),
        reason: reason.to_owned(),
    };

    if candidate.is_empty() {
        return Err(invalid("name is empty"));
    }
    if candidate.len() > MAX_SERVICE_NAME_LEN {
        return Err(invalid("name is longer than 63 characters"));
    }
    if !service_name_pattern().is_match(&candidate) {
        return Err(invalid(
            "must start with a letter and contain only letters, digits, hyphens or underscores",
        ));
    }
    Ok(candidate)
}

pub fn image_tag(spec: &DeploymentSpec, service: &str) -> String {
    format!("gcr.io/{}/{}", spec.project_id, service)
}

fn scope_args(spec: &DeploymentSpec) -> Vec<String> {
    vec![
        "--platform".into(),
        spec.platform.as_str().into(),
        "--region".into(),
        spec.region.clone(),
        "--project".into(),
        spec.project_id.clone(),
    ]
}

pub fn build_submit_args(artifact: &Path, image: &str, spec: &DeploymentSpec) -> Vec<String> {
    vec![
        "builds".into(),
        "submit".into(),
        artifact.display().to_string(),
        "--tag".into(),
        image.into(),
        "--project".into(),
        spec.project_id.clone(),
        "--quiet".into(),
    ]
}

pub fn run_deploy_args(service: &str, image: &str, spec: &DeploymentSpec) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "deploy".into(),
        service.into(),
        "--image".into(),
        image.into(),
        "--port".into(),
        spec.port.to_string(),
        "--memory".into(),
        spec.memory.clone(),
        "--cpu".into(),
        spec.cpu.to_string(),
        "--min-instances".into(),
        spec.min_instances.to_string(),
        "--max-instances".into(),
        spec.max_instances.to_string(),
    ];
    args.extend(scope_args(spec));
    args.push(if spec.allow_unauthenticated {
        "--allow-unauthenticated".into()
    } else {
        "--no-allow-unauthenticated".into()
    });
    args.push("--quiet".into());
    args
}

pub fn describe_args(service: &str, spec: &DeploymentSpec) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "services".into(),
        "describe".into(),
        service.into(),
    ];
    args.extend(scope_args(spec));
    args.extend(["--format".into(), "json".into()]);
    args
}

pub fn delete_service_args(service: &str, spec: &DeploymentSpec) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "services".into(),
        "delete".into(),
        service.into(),
    ];
    args.extend(scope_args(spec));
    args.push("--quiet".into());
    args
}

pub fn delete_image_args(image: &str, spec: &DeploymentSpec) -> Vec<String> {
    vec![
        "container".into(),
        "images".into(),
        "delete".into(),
        image.into(),
        "--force-delete-tags".into(),
        "--project".into(),
        spec.project_id.clone(),
        "--quiet".into(),
    ]
}

/// Render a program and its arguments the way a user would type them.
pub fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
