//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{AppConfig, ObjectLayout};
use super::secret::secret_string;
use crate::domain::errors::PipelineError;
use crate::domain::result::Result;
use crate::domain::BundleType;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "FHIR_TO_SERVER_";

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into AppConfig
/// 4. Applies environment variable overrides (FHIR_TO_SERVER_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - Environment variable substitution fails
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use fhir_to_server::config::loader::load_config;
///
/// let config = load_config("fhir-to-server.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(PipelineError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        PipelineError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    load_config_from_str(&contents)
}

/// Loads configuration from TOML text
///
/// Same steps as [`load_config`] minus reading the file.
pub fn load_config_from_str(contents: &str) -> Result<AppConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: AppConfig = toml::from_str(&contents)?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        PipelineError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| PipelineError::Configuration(format!("Invalid placeholder pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |cap: &regex::Captures<'_>| {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    String::new()
                }
            }
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{key}")).ok()
}

fn env_parsed<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            PipelineError::Configuration(format!(
                "Environment variable {ENV_PREFIX}{key} has an invalid value '{raw}'"
            ))
        }),
    }
}

/// Applies environment variable overrides using the FHIR_TO_SERVER_* prefix
///
/// Variables follow the pattern `FHIR_TO_SERVER_<SECTION>_<KEY>`, for
/// example `FHIR_TO_SERVER_FHIR_URL` or `FHIR_TO_SERVER_OBJECT_STORE_ENABLED`.
fn apply_env_overrides(config: &mut AppConfig) -> Result<()> {
    // Application overrides
    if let Some(val) = env("APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // FHIR overrides
    if let Some(val) = env("FHIR_URL") {
        config.fhir.url = val;
    }
    if let Some(val) = env_parsed("FHIR_HTTP_TIMEOUT_SECONDS")? {
        config.fhir.http_timeout_seconds = val;
    }
    if let Some(val) = env("FHIR_FILTER_EXPRESSION") {
        config.fhir.filter_expression = Some(val);
    }
    if let Some(val) = env("FHIR_OVERRIDE_BUNDLE_TYPE") {
        config.fhir.override_bundle_type = if val.trim().is_empty() {
            None
        } else {
            Some(BundleType::from_str(&val)?)
        };
    }
    if let Some(val) = env_parsed("FHIR_AUTH_BASIC_ENABLED")? {
        config.fhir.auth.basic_enabled = val;
    }
    if let Some(val) = env("FHIR_AUTH_USERNAME") {
        config.fhir.auth.username = Some(val);
    }
    if let Some(val) = env("FHIR_AUTH_PASSWORD") {
        config.fhir.auth.password = Some(secret_string(val));
    }

    // Merge overrides
    let merge = &mut config.fhir.merge_batches_into_single_bundle;
    if let Some(val) = env_parsed("FHIR_MERGE_BATCHES_INTO_SINGLE_BUNDLE_ENABLED")? {
        merge.enabled = val;
    }
    if let Some(val) = env("FHIR_MERGE_BATCHES_INTO_SINGLE_BUNDLE_ENTRY_UNIQUENESS_FHIRPATH_EXPRESSION")
    {
        merge.entry_uniqueness_fhirpath_expression = val;
    }
    if let Some(val) = env_parsed("FHIR_MERGE_BATCHES_INTO_SINGLE_BUNDLE_BUNDLE_MAX_SIZE")? {
        merge.bundle_max_size = Some(val);
    }

    // Object store overrides
    let store = &mut config.object_store;
    if let Some(val) = env_parsed("OBJECT_STORE_ENABLED")? {
        store.enabled = val;
    }
    if let Some(val) = env("OBJECT_STORE_ENDPOINT_URL") {
        store.endpoint_url = Some(val);
    }
    if let Some(val) = env("OBJECT_STORE_REGION") {
        store.region = val;
    }
    if let Some(val) = env("OBJECT_STORE_ACCESS_KEY") {
        store.access_key = Some(val);
    }
    if let Some(val) = env("OBJECT_STORE_SECRET_KEY") {
        store.secret_key = Some(secret_string(val));
    }
    if let Some(val) = env("OBJECT_STORE_BUCKET_NAME") {
        store.bucket_name = val;
    }
    if let Some(val) = env("OBJECT_STORE_OBJECT_NAME_PREFIX") {
        store.object_name_prefix = val;
    }
    if let Some(val) = env("OBJECT_STORE_LAYOUT") {
        store.layout = match val.trim() {
            "ndjson-by-type" => ObjectLayout::NdjsonByType,
            "whole-bundle" => ObjectLayout::WholeBundle,
            other => {
                return Err(PipelineError::Configuration(format!(
                    "Invalid {ENV_PREFIX}OBJECT_STORE_LAYOUT '{other}'. \
                     Must be one of: ndjson-by-type, whole-bundle"
                )))
            }
        };
    }

    // Retry overrides
    if let Some(val) = env_parsed("RETRY_INITIAL_DELAY_MS")? {
        config.retry.initial_delay_ms = val;
    }
    if let Some(val) = env_parsed("RETRY_MAX_DELAY_MS")? {
        config.retry.max_delay_ms = val;
    }
    if let Some(val) = env_parsed("RETRY_MULTIPLIER")? {
        config.retry.multiplier = val;
    }

    // Metrics overrides
    if let Some(val) = env_parsed("METRICS_ENABLED")? {
        config.metrics.enabled = val;
    }
    if let Some(val) = env("METRICS_LISTEN_ADDRESS") {
        config.metrics.listen_address = val;
    }

    // Logging overrides
    if let Some(val) = env_parsed("LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Some(val) = env("LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Some(val) = env("LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}
