//! Integration tests for configuration loading and validation
//!
//! Tests that modify environment variables hold `ENV_MUTEX` to avoid
//! interference between tests.

use fhir_to_server::config::{load_config, ObjectLayout};
use fhir_to_server::core::dispatch::DeliveryMode;
use fhir_to_server::domain::BundleType;
use secrecy::ExposeSecret;
use std::io::Write;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;

// Mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn cleanup_env_vars() {
    for var in [
        "FHIR_TO_SERVER_APPLICATION_LOG_LEVEL",
        "FHIR_TO_SERVER_FHIR_URL",
        "FHIR_TO_SERVER_FHIR_AUTH_PASSWORD",
        "FHIR_TO_SERVER_OBJECT_STORE_ENABLED",
        "FHIR_TO_SERVER_OBJECT_STORE_BUCKET_NAME",
        "FHIR_TO_SERVER_RETRY_MULTIPLIER",
        "TEST_FHIR_PASSWORD",
    ] {
        std::env::remove_var(var);
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_complete_config() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    let file = write_config(
        r#"
[application]
log_level = "debug"

[fhir]
url = "https://fhir.example.com/fhir"
http_timeout_seconds = 30
filter_expression = "entry.resource.resourceType = 'Patient'"
override_bundle_type = "transaction"

[fhir.auth]
basic_enabled = true
username = "fhir"
password = "secret"

[fhir.merge_batches_into_single_bundle]
enabled = true
entry_uniqueness_fhirpath_expression = "resource.id"
bundle_max_size = 250

[retry]
initial_delay_ms = 500
max_delay_ms = 5000
multiplier = 1.5

[metrics]
enabled = true
listen_address = "127.0.0.1:9464"

[logging]
local_enabled = false
local_rotation = "hourly"
"#,
    );

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.application.log_level, "debug");
    assert_eq!(config.fhir.url, "https://fhir.example.com/fhir");
    assert_eq!(config.fhir.http_timeout(), Duration::from_secs(30));
    assert_eq!(
        config.fhir.filter(),
        Some("entry.resource.resourceType = 'Patient'")
    );
    assert_eq!(config.fhir.override_bundle_type, Some(BundleType::Transaction));
    assert_eq!(
        config
            .fhir
            .auth
            .password
            .as_ref()
            .unwrap()
            .expose_secret()
            .as_str(),
        "secret"
    );

    let policy = config.retry.backoff_policy();
    assert_eq!(policy.initial_delay(), Duration::from_millis(500));
    assert_eq!(policy.max_delay(), Duration::from_secs(5));

    assert_eq!(
        DeliveryMode::from_config(&config),
        DeliveryMode::MergedBatch {
            identity_expression: "resource.id".to_string(),
            max_bundle_size: NonZeroUsize::new(250),
        }
    );
    assert_eq!(
        config.metrics.socket_addr().unwrap().to_string(),
        "127.0.0.1:9464"
    );
}

#[test]
fn test_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    let file = write_config("");
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.fhir.http_timeout(), Duration::from_secs(60));
    assert!(config.fhir.filter().is_none());
    assert_eq!(
        config
            .fhir
            .merge_batches_into_single_bundle
            .entry_uniqueness_fhirpath_expression,
        "request.url.toString()"
    );
    assert_eq!(config.retry.initial_delay_ms, 10_000);
    assert_eq!(config.retry.max_delay_ms, 300_000);
    assert_eq!(config.object_store.layout, ObjectLayout::NdjsonByType);
    assert_eq!(DeliveryMode::from_config(&config), DeliveryMode::PerBundle);
}

#[test]
fn test_env_substitution_and_overrides() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    std::env::set_var("TEST_FHIR_PASSWORD", "from-env");
    std::env::set_var("FHIR_TO_SERVER_OBJECT_STORE_ENABLED", "true");
    std::env::set_var("FHIR_TO_SERVER_OBJECT_STORE_BUCKET_NAME", "fhir-staging");
    std::env::set_var("FHIR_TO_SERVER_RETRY_MULTIPLIER", "3.0");

    let file = write_config(
        r#"
# password = "${NOT_SET_BUT_COMMENTED}"
[fhir.auth]
basic_enabled = true
username = "fhir"
password = "${TEST_FHIR_PASSWORD}"
"#,
    );

    let result = load_config(file.path());
    cleanup_env_vars();
    let config = result.unwrap();

    assert_eq!(
        config
            .fhir
            .auth
            .password
            .as_ref()
            .unwrap()
            .expose_secret()
            .as_str(),
        "from-env"
    );
    assert!(config.object_store.enabled);
    assert_eq!(config.object_store.bucket_name, "fhir-staging");
    assert_eq!(config.retry.multiplier, 3.0);
    assert_eq!(DeliveryMode::from_config(&config), DeliveryMode::ObjectStore);
}

#[test]
fn test_missing_env_var_is_an_error() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    let file = write_config(
        r#"
[fhir]
url = "${TEST_FHIR_URL_THAT_IS_NOT_SET}"
"#,
    );

    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("TEST_FHIR_URL_THAT_IS_NOT_SET"));
}

#[test]
fn test_invalid_configs_are_rejected() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    for content in [
        "[application]\nlog_level = \"verbose\"",
        "[fhir]\nurl = \"not a url\"",
        "[fhir.auth]\nbasic_enabled = true\nusername = \"fhir\"",
        "[fhir.merge_batches_into_single_bundle]\nbundle_max_size = 0",
        "[fhir.merge_batches_into_single_bundle]\nentry_uniqueness_fhirpath_expression = \"  \"",
        "[fhir]\nfilter_expression = \"entry..resource\"",
        "[object_store]\nenabled = true",
        "[retry]\ninitial_delay_ms = 5000\nmax_delay_ms = 1000",
        "[logging]\nlocal_rotation = \"size\"",
    ] {
        let file = write_config(content);
        assert!(load_config(file.path()).is_err(), "accepted: {content}");
    }
}

#[test]
fn test_object_store_skips_fhir_url_validation() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();

    let file = write_config(
        r#"
[fhir]
url = ""

[object_store]
enabled = true
endpoint_url = "http://localhost:9000"
access_key = "admin"
secret_key = "miniopass"
bucket_name = "fhir"
layout = "whole-bundle"
"#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.object_store.layout, ObjectLayout::WholeBundle);
}

#[test]
fn test_missing_file() {
    assert!(load_config("/nonexistent/fhir-to-server.toml").is_err());
}
