//! Configuration schema types
//!
//! This module defines the configuration structure mapped from the TOML file.

use crate::adapters::fhirpath::PathExpression;
use crate::config::SecretString;
use crate::core::merge::DEFAULT_IDENTITY_EXPRESSION;
use crate::core::retry::BackoffPolicy;
use crate::domain::BundleType;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

/// Root configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// FHIR server sink and bundle handling
    #[serde(default)]
    pub fhir: FhirConfig,

    /// Object store sink
    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    /// Backoff of failed deliveries
    #[serde(default)]
    pub retry: RetryConfig,

    /// Prometheus exporter
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.fhir.validate(self.object_store.enabled)?;
        self.object_store.validate()?;
        self.retry.validate()?;
        self.metrics.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// FHIR server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FhirConfig {
    /// Base URL of the FHIR server; transaction bundles are POSTed here
    #[serde(default = "default_fhir_url")]
    pub url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,

    /// Bundles are only sent if this expression evaluates to `true`
    #[serde(default)]
    pub filter_expression: Option<String>,

    /// Replaces the type of every bundle before it is sent
    #[serde(default)]
    pub override_bundle_type: Option<BundleType>,

    /// Authentication against the FHIR server
    #[serde(default)]
    pub auth: FhirAuthConfig,

    /// Merging of whole batches into one bundle
    #[serde(default)]
    pub merge_batches_into_single_bundle: MergeConfig,
}

impl FhirConfig {
    fn validate(&self, object_store_enabled: bool) -> Result<(), String> {
        // the server is not contacted when everything goes to the object store
        if !object_store_enabled {
            let url = Url::parse(&self.url)
                .map_err(|e| format!("fhir.url '{}' is not a valid URL: {e}", self.url))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err("fhir.url must start with http:// or https://".to_string());
            }
        }

        if self.http_timeout_seconds == 0 {
            return Err("fhir.http_timeout_seconds must be > 0".to_string());
        }

        if let Some(expression) = self.filter() {
            PathExpression::parse(expression)
                .map_err(|e| format!("fhir.filter_expression is invalid: {e}"))?;
        }

        self.auth.validate()?;
        self.merge_batches_into_single_bundle.validate()?;
        Ok(())
    }

    /// Filter expression, if one is set and not blank
    pub fn filter(&self) -> Option<&str> {
        self.filter_expression
            .as_deref()
            .map(str::trim)
            .filter(|expression| !expression.is_empty())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

impl Default for FhirConfig {
    fn default() -> Self {
        Self {
            url: default_fhir_url(),
            http_timeout_seconds: default_http_timeout_seconds(),
            filter_expression: None,
            override_bundle_type: None,
            auth: FhirAuthConfig::default(),
            merge_batches_into_single_bundle: MergeConfig::default(),
        }
    }
}

/// Basic authentication against the FHIR server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FhirAuthConfig {
    /// Send an `Authorization: Basic` header
    #[serde(default)]
    pub basic_enabled: bool,

    #[serde(default)]
    pub username: Option<String>,

    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub password: Option<SecretString>,
}

impl FhirAuthConfig {
    fn validate(&self) -> Result<(), String> {
        use secrecy::ExposeSecret;

        if !self.basic_enabled {
            return Ok(());
        }

        if self.username.as_ref().map(|s| s.is_empty()).unwrap_or(true) {
            return Err("fhir.auth.username cannot be empty when basic_enabled = true".to_string());
        }

        if self
            .password
            .as_ref()
            .map(|s| s.expose_secret().is_empty())
            .unwrap_or(true)
        {
            return Err("fhir.auth.password cannot be empty when basic_enabled = true".to_string());
        }

        Ok(())
    }
}

/// Merging of batches into a single bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Expression computing the identity of an entry
    #[serde(default = "default_identity_expression")]
    pub entry_uniqueness_fhirpath_expression: String,

    /// Maximum entries per sent bundle; unbounded when unset
    #[serde(default)]
    pub bundle_max_size: Option<usize>,
}

impl MergeConfig {
    fn validate(&self) -> Result<(), String> {
        if self.entry_uniqueness_fhirpath_expression.trim().is_empty() {
            return Err(
                "fhir.merge_batches_into_single_bundle.entry_uniqueness_fhirpath_expression \
                 cannot be empty"
                    .to_string(),
            );
        }

        PathExpression::parse(&self.entry_uniqueness_fhirpath_expression).map_err(|e| {
            format!(
                "fhir.merge_batches_into_single_bundle.entry_uniqueness_fhirpath_expression \
                 is invalid: {e}"
            )
        })?;

        if self.bundle_max_size == Some(0) {
            return Err(
                "fhir.merge_batches_into_single_bundle.bundle_max_size must be > 0".to_string(),
            );
        }

        Ok(())
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            entry_uniqueness_fhirpath_expression: default_identity_expression(),
            bundle_max_size: None,
        }
    }
}

/// Layout of objects written to the object store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectLayout {
    /// One NDJSON object per resource type, one transaction per deleted type
    #[default]
    NdjsonByType,
    /// The merged upsert and delete bundles stored whole
    WholeBundle,
}

/// S3 compatible object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Send everything to the object store instead of the FHIR server
    #[serde(default)]
    pub enabled: bool,

    /// Custom endpoint, e.g. a MinIO server; path-style addressing is used
    #[serde(default)]
    pub endpoint_url: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    /// Static access key; the default credential chain is used when unset
    #[serde(default)]
    pub access_key: Option<String>,

    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub secret_key: Option<SecretString>,

    #[serde(default)]
    pub bucket_name: String,

    /// Prepended verbatim to every object key
    #[serde(default)]
    pub object_name_prefix: String,

    #[serde(default)]
    pub layout: ObjectLayout,
}

impl ObjectStoreConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }

        if self.bucket_name.trim().is_empty() {
            return Err("object_store.bucket_name cannot be empty when enabled".to_string());
        }

        if let Some(endpoint) = &self.endpoint_url {
            Url::parse(endpoint).map_err(|e| {
                format!("object_store.endpoint_url '{endpoint}' is not a valid URL: {e}")
            })?;
        }

        if self.region.trim().is_empty() {
            return Err("object_store.region cannot be empty".to_string());
        }

        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(
                "object_store.access_key and object_store.secret_key must be set together"
                    .to_string(),
            );
        }

        Ok(())
    }
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint_url: None,
            region: default_region(),
            access_key: None,
            secret_key: None,
            bucket_name: String::new(),
            object_name_prefix: String::new(),
            layout: ObjectLayout::default(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

impl RetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.initial_delay_ms == 0 {
            return Err("retry.initial_delay_ms must be > 0".to_string());
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err("retry.max_delay_ms must be >= retry.initial_delay_ms".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err("retry.multiplier must be >= 1.0".to_string());
        }
        Ok(())
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.multiplier,
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

/// Prometheus exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Address the `/metrics` endpoint listens on
    #[serde(default = "default_metrics_listen_address")]
    pub listen_address: String,
}

impl MetricsConfig {
    fn validate(&self) -> Result<(), String> {
        if self.enabled {
            self.socket_addr()?;
        }
        Ok(())
    }

    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        self.listen_address.parse().map_err(|e| {
            format!(
                "metrics.listen_address '{}' is not a valid socket address: {e}",
                self.listen_address
            )
        })
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: default_metrics_listen_address(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path cannot be empty when local_enabled = true".to_string());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_fhir_url() -> String {
    "http://localhost:8080/fhir".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    60
}

fn default_identity_expression() -> String {
    DEFAULT_IDENTITY_EXPRESSION.to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_initial_delay_ms() -> u64 {
    10_000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_metrics_listen_address() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_true() -> bool {
    true
}

fn default_local_path() -> String {
    "/var/log/fhir-to-server".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    #[test]
    fn test_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.fhir.http_timeout_seconds, 60);
        assert_eq!(
            config
                .fhir
                .merge_batches_into_single_bundle
                .entry_uniqueness_fhirpath_expression,
            "request.url.toString()"
        );
        assert_eq!(config.retry.initial_delay_ms, 10_000);
        assert_eq!(config.retry.max_delay_ms, 300_000);
        assert_eq!(config.retry.multiplier, 2.0);
        assert_eq!(config.object_store.layout, ObjectLayout::NdjsonByType);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig::default();
        assert!(config.validate().is_ok());

        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fhir_url_validation() {
        let mut config = FhirConfig {
            url: "not a url".to_string(),
            ..FhirConfig::default()
        };
        assert!(config.validate(false).is_err());
        // ignored when the object store takes all traffic
        assert!(config.validate(true).is_ok());

        config.url = "ftp://fhir.example.com".to_string();
        assert!(config.validate(false).is_err());

        config.url = "https://fhir.example.com/fhir".to_string();
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_filter_expression() {
        let mut config = FhirConfig {
            filter_expression: Some("   ".to_string()),
            ..FhirConfig::default()
        };
        assert_eq!(config.filter(), None);
        assert!(config.validate(false).is_ok());

        config.filter_expression = Some("entry.resource.resourceType = 'Patient'".to_string());
        assert!(config.filter().is_some());
        assert!(config.validate(false).is_ok());

        config.filter_expression = Some("entry..resource".to_string());
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_basic_auth_requires_credentials() {
        let mut auth = FhirAuthConfig {
            basic_enabled: true,
            username: Some("user".to_string()),
            password: None,
        };
        assert!(auth.validate().is_err());

        auth.password = Some(secret_string("pass".to_string()));
        assert!(auth.validate().is_ok());

        auth.username = Some(String::new());
        assert!(auth.validate().is_err());

        auth.basic_enabled = false;
        assert!(auth.validate().is_ok());
    }

    #[test]
    fn test_merge_config_validation() {
        let mut config = MergeConfig::default();
        assert!(config.validate().is_ok());

        config.bundle_max_size = Some(0);
        assert!(config.validate().is_err());

        config.bundle_max_size = Some(100);
        config.entry_uniqueness_fhirpath_expression = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_object_store_validation() {
        let mut config = ObjectStoreConfig {
            enabled: true,
            ..ObjectStoreConfig::default()
        };
        assert!(config.validate().is_err());

        config.bucket_name = "fhir".to_string();
        assert!(config.validate().is_ok());

        config.access_key = Some("admin".to_string());
        assert!(config.validate().is_err());

        config.secret_key = Some(secret_string("miniopass".to_string()));
        config.endpoint_url = Some("http://localhost:9000".to_string());
        assert!(config.validate().is_ok());

        config.endpoint_url = Some("localhost 9000".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_validation() {
        let mut config = RetryConfig::default();
        assert!(config.validate().is_ok());

        config.max_delay_ms = 1_000;
        assert!(config.validate().is_err());

        config.max_delay_ms = 300_000;
        config.multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metrics_listen_address() {
        let mut config = MetricsConfig {
            enabled: true,
            ..MetricsConfig::default()
        };
        assert!(config.validate().is_ok());

        config.listen_address = "nowhere".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_logging_config_validation() {
        let mut config = LoggingConfig::default();
        assert!(config.validate().is_ok());

        config.local_rotation = "weekly".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_override_bundle_type_deserializes() {
        let config: FhirConfig = toml::from_str(
            r#"
url = "http://fhir:8080/fhir"
override_bundle_type = "batch"
"#,
        )
        .unwrap();
        assert_eq!(config.override_bundle_type, Some(BundleType::Batch));
    }
}
