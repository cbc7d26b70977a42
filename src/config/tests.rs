use super::*;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_defaults() {
    let args = ExecutorArgs::default();
    assert_eq!(args.workers, 1);
    assert_eq!(args.compression, None);
    assert_eq!(args.failure_mode, FailureMode::FailFast);
    assert_eq!(args.schema_config().kind, SchemaKind::Base);
    assert!(args.validate(Strategy::Serial).is_ok());
    assert_eq!(ExecutorArgs::from_options(json!({})).unwrap(), args);
}

#[test]
fn test_from_options_with_aliases() {
    let args = ExecutorArgs::from_options(json!({
        "worker_count": 3,
        "compression": 2,
        "schema": "nanoevents",
        "chunksize": 25,
        "maxchunks": 4,
        "failure_mode": "best_effort",
        "retries": 1,
    }))
    .unwrap();

    assert_eq!(args.workers, 3);
    assert_eq!(args.compression, Some(2));
    assert_eq!(args.schema, Some(SchemaKind::NanoAod));
    assert_eq!(args.chunk_size, Some(25));
    assert_eq!(args.max_chunks, Some(4));
    assert_eq!(args.failure_mode, FailureMode::BestEffort);

    let context = args.task_context();
    assert_eq!(context.retries, 1);
    assert_eq!(context.compression, Some(2));
    assert_eq!(context.schema.kind, SchemaKind::NanoAod);
}

#[test]
fn test_null_compression_means_none() {
    let args = ExecutorArgs::from_options(json!({"compression": null})).unwrap();
    assert_eq!(args.compression, None);
}

#[test]
fn test_unknown_option() {
    let err = ExecutorArgs::from_options(json!({"workers": 2, "savemetrics": true})).unwrap_err();
    match err {
        ConfigurationError::UnknownOption { name } => assert_eq!(name, "savemetrics"),
        other => panic!("Expected UnknownOption, got {other}"),
    }
}

#[test]
fn test_alias_given_twice() {
    let err = ExecutorArgs::from_options(json!({"workers": 2, "worker_count": 3})).unwrap_err();
    assert!(matches!(err, ConfigurationError::Conflict { .. }));
}

#[test]
fn test_options_must_be_a_table() {
    assert!(matches!(
        ExecutorArgs::from_options(json!([1, 2])),
        Err(ConfigurationError::NotATable)
    ));
}

#[test]
fn test_wrongly_typed_option() {
    let err = ExecutorArgs::from_options(json!({"workers": "many"})).unwrap_err();
    assert!(matches!(err, ConfigurationError::Parse(_)));
}

#[test]
fn test_validate_rejects_bad_values() {
    let cases = [
        (ExecutorArgs::default().with_workers(0), "workers"),
        (ExecutorArgs::default().with_compression(Some(12)), "compression"),
        (ExecutorArgs::default().with_chunk_size(Some(0)), "chunk_size"),
        (ExecutorArgs::default().with_max_chunks(Some(0)), "max_chunks"),
    ];
    for (args, option) in cases {
        match args.validate(Strategy::ThreadParallel) {
            Err(ConfigurationError::InvalidValue { option: name, .. }) => assert_eq!(name, option),
            other => panic!("Expected InvalidValue for {option}, got {other:?}"),
        }
    }
}

#[test]
fn test_validate_rejects_conflicts() {
    let flattened_nano = ExecutorArgs::default()
        .with_schema(SchemaKind::NanoAod)
        .with_flatten(true);
    assert!(matches!(
        flattened_nano.validate(Strategy::Serial),
        Err(ConfigurationError::Conflict { .. })
    ));

    let program = ExecutorArgs::default().with_worker_program("/usr/bin/chunkflow");
    assert!(matches!(
        program.validate(Strategy::ThreadParallel),
        Err(ConfigurationError::Conflict { .. })
    ));
    assert!(program.validate(Strategy::ProcessParallel).is_ok());
}

#[test]
fn test_compression_allowed_for_every_strategy() {
    let args = ExecutorArgs::default().with_compression(Some(0));
    for strategy in Strategy::ALL {
        assert!(args.validate(strategy).is_ok());
    }
}

#[test]
fn test_load_toml_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("executor.toml");
    fs::write(
        &path,
        r#"
workers = 4
compression = 9
schema = "nanoaod"
chunk_size = 100000
failure_mode = "best_effort"
status = true
"#,
    )
    .unwrap();

    let args = ExecutorArgs::load(&path).unwrap();
    assert_eq!(args.workers, 4);
    assert_eq!(args.compression, Some(9));
    assert_eq!(args.schema, Some(SchemaKind::NanoAod));
    assert_eq!(args.chunk_size, Some(100_000));
    assert!(args.status);

    let plan = args.execution_plan();
    assert_eq!(plan.workers, 4);
    assert_eq!(plan.failure_mode, FailureMode::BestEffort);
}

#[test]
fn test_toml_unknown_option_and_missing_file() {
    assert!(matches!(
        ExecutorArgs::from_toml_str("executor = \"dask\""),
        Err(ConfigurationError::UnknownOption { .. })
    ));
    assert!(matches!(
        ExecutorArgs::from_toml_str("workers = "),
        Err(ConfigurationError::Parse(_))
    ));
    assert!(matches!(
        ExecutorArgs::load("/nonexistent/executor.toml"),
        Err(ConfigurationError::Read { .. })
    ));
}
