use std::io::Write;

use armada::{ArmadaConfig, ArmadaError};

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[directory]
heartbeat_interval_secs = 10
min_health = 60.0
decay_per_interval = 2.5
offline_penalty = 15.0

[scheduler]
default_min_reliability = 0.9
batch_concurrency = 3

[engine]
retention_secs = 120
default_step_timeout_ms = 5000

[log]
filter = "armada=debug"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = ArmadaConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.directory.heartbeat_interval_secs, 10);
    assert_eq!(config.directory.min_health, 60.0);
    assert_eq!(config.directory.decay_per_interval, 2.5);
    assert_eq!(config.directory.offline_penalty, 15.0);
    assert_eq!(config.scheduler.default_min_reliability, 0.9);
    assert_eq!(config.scheduler.batch_concurrency, 3);
    assert_eq!(config.engine.retention_secs, 120);
    assert_eq!(config.engine.default_step_timeout_ms, 5000);
    assert_eq!(config.log.filter, "armada=debug");
}

#[test]
fn test_load_expands_env_vars() {
    std::env::set_var("ARMADA_TEST_LOG_FILTER", "armada=trace");
    let toml_content = r#"
[log]
filter = "${ARMADA_TEST_LOG_FILTER}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = ArmadaConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.log.filter, "armada=trace");
    std::env::remove_var("ARMADA_TEST_LOG_FILTER");
}

#[test]
fn test_missing_sections_use_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine]\nretention_secs = 5\n").expect("write toml");

    let config = ArmadaConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.engine.retention_secs, 5);
    assert_eq!(config.engine.default_step_timeout_ms, 30_000);
    assert_eq!(config.directory.heartbeat_interval_secs, 30);
    assert_eq!(config.scheduler.batch_concurrency, 5);
}

#[test]
fn test_missing_file() {
    let err = ArmadaConfig::load(std::path::Path::new("/nonexistent/armada.toml")).unwrap_err();
    assert!(matches!(err, ArmadaError::ConfigNotFound(_)));
}

#[test]
fn test_malformed_toml() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[scheduler\nbatch_concurrency = ").expect("write toml");

    let err = ArmadaConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, ArmadaError::Config(_)));
}
