//! Tests for config file resolution and graceful degradation
//!
//! Uses serial_test to prevent environment variable races. Tests that touch
//! STAFFSYNC_CONFIG are marked #[serial].

use serial_test::serial;
use staffsync_common::config::{load_config, resolve_config_path, ConfigOrigin, TomlConfig, CONFIG_ENV_VAR};
use staffsync_common::Error;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_arg() {
    let file = write_config(
        r#"
        [store]
        base_url = "http://store.internal/api"
        request_timeout_ms = 2500
        "#,
    );
    env::set_var(CONFIG_ENV_VAR, file.path());

    let (path, origin) = resolve_config_path(None).unwrap();
    assert_eq!(path, file.path());
    assert_eq!(origin, ConfigOrigin::Environment);

    let config = load_config(None).unwrap();
    assert_eq!(config.store.base_url, "http://store.internal/api");
    assert_eq!(config.store.request_timeout_ms, 2500);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_env_file_falls_back_to_defaults() {
    env::set_var(CONFIG_ENV_VAR, "/nonexistent/staffsync/config.toml");

    let config = load_config(None).unwrap();
    assert_eq!(config, TomlConfig::default());

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_cli_arg_overrides_env_var() {
    let env_file = write_config("[logging]\nlevel = \"warn\"\n");
    let cli_file = write_config("[logging]\nlevel = \"debug\"\n");
    env::set_var(CONFIG_ENV_VAR, env_file.path());

    let config = load_config(Some(cli_file.path())).unwrap();
    assert_eq!(config.logging.level, "debug");

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_cli_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let err = load_config(Some(std::path::Path::new("/nonexistent/cli.toml"))).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_invalid_rules_in_file_rejected() {
    let file = write_config("[rules]\nunderutilization_threshold = -1.0\n");
    let err = TomlConfig::load_file(file.path()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
