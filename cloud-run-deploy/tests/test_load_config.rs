use cloud_run_deploy::load_config::{load_config, parse_config, PROJECT_ENV, REGION_ENV};
use serial_test::serial;
use std::env;
use std::fs::write;
use tempfile::NamedTempFile;

fn clear_gcloud_env() {
    env::remove_var(PROJECT_ENV);
    env::remove_var(REGION_ENV);
}

/// A flat mapping of schema fields loads with defaults filled in.
#[test]
#[serial]
fn test_load_config_flat_mapping() {
    clear_gcloud_env();
    let config_yaml = r#"
project_id: bentoml-316710
region: us-central1
port: 5001
memory: 512Mi
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let config = load_config(config_file.path()).expect("Config should load");

    assert_eq!(config.name, None);
    assert_eq!(config.spec.project_id, "bentoml-316710");
    assert_eq!(config.spec.port, 5001);
    assert_eq!(config.spec.max_instances, 1);
    assert!(config.spec.allow_unauthenticated);
}

/// A deployment document carries its own name and nests fields under `spec`.
#[test]
#[serial]
fn test_load_config_deployment_document() {
    clear_gcloud_env();
    let config_yaml = r#"
api_version: v1
name: iris_classifier
operator:
  name: gcp-cloud-run
spec:
  project_id: demo-project
  region: europe-west4
  min_instances: "1"
  max_instances: 4
  allow_unauthenticated: false
"#;
    let config = parse_config(config_yaml).expect("Document should load");

    assert_eq!(config.name.as_deref(), Some("iris_classifier"));
    assert_eq!(config.spec.region, "europe-west4");
    assert_eq!(config.spec.min_instances, 1);
    assert_eq!(config.spec.max_instances, 4);
    assert!(!config.spec.allow_unauthenticated);

    assert_eq!(config.deployment_name(None).unwrap(), "iris_classifier");
    assert_eq!(config.deployment_name(Some("override")).unwrap(), "override");
}

#[test]
#[serial]
fn test_load_config_rejects_other_operators() {
    clear_gcloud_env();
    let config_yaml = r#"
name: iris
operator:
  name: aws-lambda
spec:
  project_id: demo-project
  region: us-central1
"#;
    let err = parse_config(config_yaml).unwrap_err();
    assert!(err.to_string().contains("aws-lambda"), "got: {err}");
}

#[test]
#[serial]
fn test_load_config_fills_project_and_region_from_env() {
    env::set_var(PROJECT_ENV, "env-project");
    env::set_var(REGION_ENV, "asia-east1");

    let config = parse_config("cpu: 2\n").expect("env should supply project and region");
    assert_eq!(config.spec.project_id, "env-project");
    assert_eq!(config.spec.region, "asia-east1");
    assert_eq!(config.spec.cpu, 2);

    let config = parse_config("project_id: file-project\nregion: us-east1\n").unwrap();
    assert_eq!(config.spec.project_id, "file-project", "file wins over env");

    clear_gcloud_env();
}

#[test]
#[serial]
fn test_load_config_reports_every_invalid_field() {
    clear_gcloud_env();
    let err = parse_config("port: eighty\nplatform: gke\n").unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("invalid deployment configuration"), "got: {msg}");
    assert!(msg.contains("project_id: required field"), "got: {msg}");
    assert!(msg.contains("region: required field"), "got: {msg}");
    assert!(msg.contains("port: cannot be coerced to integer"), "got: {msg}");
}

#[test]
#[serial]
fn test_load_config_requires_a_deployment_name_somewhere() {
    clear_gcloud_env();
    let config = parse_config("project_id: p\nregion: r\n").unwrap();
    let err = config.deployment_name(None).unwrap_err();
    assert!(err.to_string().contains("--name"));
}

#[test]
fn test_load_config_errors_for_invalid_file() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), b"not-yaml: [:::").unwrap();

    let err = load_config(config_file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
fn test_load_config_errors_for_missing_file() {
    let err = load_config("/nonexistent/deployment.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_load_config_rejects_non_mapping_documents() {
    let err = parse_config("- project_id: p\n").unwrap_err();
    assert!(err.to_string().contains("must be a mapping"), "got: {err}");
}

#[test]
#[serial]
fn test_smoke_test_name_prefers_flag_then_document() {
    clear_gcloud_env();
    let named = parse_config("name: iris\nspec:\n  project_id: p\n  region: r\n").unwrap();
    assert_eq!(named.smoke_test_name(Some("explicit")), "explicit");
    assert_eq!(named.smoke_test_name(None), "iris");

    let unnamed = parse_config("project_id: p\nregion: r\n").unwrap();
    let generated = unnamed.smoke_test_name(None);
    assert!(generated.starts_with("smoke-test-"), "got {generated}");
    assert_ne!(generated, unnamed.smoke_test_name(None));
}
