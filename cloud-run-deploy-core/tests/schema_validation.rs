use cloud_run_deploy_core::schema::{fields, validate, DeploymentSpec, FieldType, Platform};
use serde_json::{json, Map, Value};

fn map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("test input must be an object, got {other}"),
    }
}

fn minimal() -> Map<String, Value> {
    map(json!({ "project_id": "demo-project", "region": "us-central1" }))
}

#[test]
fn minimal_config_takes_every_default() {
    let spec = validate(&minimal()).expect("minimal config should validate");
    assert_eq!(
        spec,
        DeploymentSpec {
            project_id: "demo-project".into(),
            region: "us-central1".into(),
            port: 5000,
            min_instances: 0,
            max_instances: 1,
            memory: "512Mi".into(),
            cpu: 1,
            allow_unauthenticated: true,
            platform: Platform::Managed,
        }
    );
}

#[test]
fn full_config_is_taken_verbatim() {
    let input = map(json!({
        "project_id": "bentoml-316710",
        "region": "us-central1",
        "port": 5001,
        "min_instances": 0,
        "max_instances": 1,
        "memory": "512Mi",
        "cpu": 1,
        "allow_unauthenticated": true,
        "platform": "managed"
    }));
    let spec = validate(&input).expect("full config should validate");
    assert_eq!(spec.port, 5001);
    assert_eq!(spec.project_id, "bentoml-316710");
}

#[test]
fn integer_and_string_fields_are_coerced() {
    let mut input = minimal();
    input.insert("port".into(), json!(" 8080 "));
    input.insert("max_instances".into(), json!(3.9));
    input.insert("cpu".into(), json!("2"));
    input.insert("memory".into(), json!(1024));

    let spec = validate(&input).expect("coercible values should validate");
    assert_eq!(spec.port, 8080);
    assert_eq!(spec.max_instances, 3, "floats truncate toward zero");
    assert_eq!(spec.cpu, 2);
    assert_eq!(spec.memory, "1024");
}

#[test]
fn null_values_fall_back_to_defaults() {
    let mut input = minimal();
    input.insert("port".into(), Value::Null);
    input.insert("allow_unauthenticated".into(), Value::Null);

    let spec = validate(&input).expect("nulls with defaults should validate");
    assert_eq!(spec.port, 5000);
    assert!(spec.allow_unauthenticated);
}

#[test]
fn missing_and_null_required_fields_are_reported() {
    let input = map(json!({ "project_id": null }));
    let err = validate(&input).unwrap_err();

    assert_eq!(
        err.get("project_id").map(|e| e.message.as_str()),
        Some("null value not allowed")
    );
    assert_eq!(
        err.get("region").map(|e| e.message.as_str()),
        Some("required field")
    );
}

#[test]
fn uncoerced_fields_must_have_declared_type() {
    let mut input = minimal();
    input.insert("allow_unauthenticated".into(), json!("yes"));
    input.insert("region".into(), json!(42));

    let err = validate(&input).unwrap_err();
    assert_eq!(
        err.get("allow_unauthenticated").map(|e| e.message.as_str()),
        Some("must be of boolean type")
    );
    assert_eq!(
        err.get("region").map(|e| e.message.as_str()),
        Some("must be of string type")
    );
}

#[test]
fn uncoercible_values_are_rejected() {
    let mut input = minimal();
    input.insert("port".into(), json!("eighty"));
    input.insert("memory".into(), json!(["512Mi"]));

    let err = validate(&input).unwrap_err();
    assert_eq!(
        err.get("port").map(|e| e.message.as_str()),
        Some("cannot be coerced to integer")
    );
    assert_eq!(
        err.get("memory").map(|e| e.message.as_str()),
        Some("cannot be coerced to string")
    );
}

#[test]
fn unknown_fields_are_rejected() {
    let mut input = minimal();
    input.insert("timeout".into(), json!(300));

    let err = validate(&input).unwrap_err();
    assert_eq!(err.fields().collect::<Vec<_>>(), vec!["timeout"]);
    assert!(err.to_string().contains("timeout: unknown field"));
}

#[test]
fn range_rules_are_checked_after_typing() {
    let mut input = minimal();
    input.insert("port".into(), json!(70000));
    input.insert("min_instances".into(), json!(4));
    input.insert("max_instances".into(), json!(2));
    input.insert("cpu".into(), json!(0));

    let err = validate(&input).unwrap_err();
    assert_eq!(
        err.fields().collect::<Vec<_>>(),
        vec!["port", "min_instances", "cpu"],
        "errors follow schema order"
    );
    assert!(err
        .get("min_instances")
        .is_some_and(|e| e.message.contains("exceeds max_instances")));
}

fn with(key: &str, value: Value) -> Map<String, Value> {
    let mut input = minimal();
    input.insert(key.into(), value);
    input
}

#[test]
fn port_limits_are_inclusive() {
    assert_eq!(validate(&with("port", json!(1))).unwrap().port, 1);
    assert_eq!(validate(&with("port", json!(65535))).unwrap().port, 65535);

    for bad in [json!(0), json!(65536), json!(-1), json!(u64::MAX)] {
        let err = validate(&with("port", bad.clone())).unwrap_err();
        assert!(
            err.get("port")
                .is_some_and(|e| e.message.contains("is outside 1..=65535")),
            "port {bad} should be rejected, got {err}"
        );
    }
}

#[test]
fn instance_bounds_are_inclusive() {
    let mut input = minimal();
    input.insert("min_instances".into(), json!(3));
    input.insert("max_instances".into(), json!(3));
    let spec = validate(&input).expect("min == max is allowed");
    assert_eq!((spec.min_instances, spec.max_instances), (3, 3));

    let err = validate(&with("min_instances", json!(-1))).unwrap_err();
    assert_eq!(err.get("min_instances").unwrap().message, "-1 is below 0");

    let err = validate(&with("max_instances", json!(0))).unwrap_err();
    assert_eq!(err.get("max_instances").unwrap().message, "0 is below 1");

    assert_eq!(validate(&with("cpu", json!(1))).unwrap().cpu, 1);
    let err = validate(&with("cpu", json!(0))).unwrap_err();
    assert_eq!(err.get("cpu").unwrap().message, "0 is below 1");
}

#[test]
fn integers_too_large_for_their_field_are_rejected() {
    assert_eq!(
        validate(&with("cpu", json!(4_294_967_295u64))).unwrap().cpu,
        u32::MAX
    );

    let err = validate(&with("cpu", json!(4_294_967_296u64))).unwrap_err();
    assert_eq!(err.get("cpu").unwrap().message, "4294967296 is out of range");

    let mut input = minimal();
    input.insert("max_instances".into(), json!(4_294_967_297u64));
    let err = validate(&input).unwrap_err();
    assert_eq!(err.fields().collect::<Vec<_>>(), vec!["max_instances"]);
    assert!(err.get("max_instances").unwrap().message.contains("out of range"));

    let err = validate(&with("min_instances", json!(u64::MAX))).unwrap_err();
    assert_eq!(
        err.get("min_instances").unwrap().message,
        "18446744073709551615 is out of range"
    );

    let err = validate(&with("cpu", json!("99999999999"))).unwrap_err();
    assert!(err.get("cpu").is_some(), "coerced strings are range checked too");
}

#[test]
fn memory_accepts_decimal_and_binary_suffixes_only() {
    for ok in ["512Mi", "2Gi", "512M", "1G", "256k", "1024"] {
        let mut input = minimal();
        input.insert("memory".into(), json!(ok));
        assert!(validate(&input).is_ok(), "{ok} should be accepted");
    }
    for bad in ["512MB", "lots", "Mi", "1.5Gi", ""] {
        let mut input = minimal();
        input.insert("memory".into(), json!(bad));
        let err = validate(&input).unwrap_err();
        assert!(err.get("memory").is_some(), "{bad:?} should be rejected");
    }
}

#[test]
fn only_the_managed_platform_is_supported() {
    let mut input = minimal();
    input.insert("platform".into(), json!("gke"));

    let err = validate(&input).unwrap_err();
    assert!(err
        .get("platform")
        .is_some_and(|e| e.message.contains("only \"managed\"")));
}

#[test]
fn empty_project_is_rejected() {
    let mut input = minimal();
    input.insert("project_id".into(), json!("  "));

    let err = validate(&input).unwrap_err();
    assert_eq!(err.fields().collect::<Vec<_>>(), vec!["project_id"]);
}

#[test]
fn schema_table_lists_every_field_with_help() {
    let names: Vec<_> = fields().iter().map(|f| f.name).collect();
    assert_eq!(
        names,
        vec![
            "project_id",
            "region",
            "port",
            "min_instances",
            "max_instances",
            "memory",
            "cpu",
            "allow_unauthenticated",
            "platform"
        ]
    );
    assert!(fields().iter().all(|f| f.required && !f.help.is_empty()));
    let coerced: Vec<_> = fields()
        .iter()
        .filter(|f| f.coerce)
        .map(|f| (f.name, f.field_type))
        .collect();
    assert!(coerced.contains(&("memory", FieldType::String)));
    assert!(coerced.contains(&("port", FieldType::Integer)));
}
