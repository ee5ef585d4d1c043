//! Configuration management.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! Configuration files support:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - Default values for optional settings
//! - `FHIR_TO_SERVER_<SECTION>_<KEY>` environment overrides
//! - Validation on load
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fhir_to_server::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("fhir-to-server.toml")?;
//!
//! println!("FHIR server: {}", config.fhir.url);
//! if config.object_store.enabled {
//!     println!("Bucket: {}", config.object_store.bucket_name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level
//! - [`FhirConfig`] - FHIR server, filter, type override, auth and merge settings
//! - [`ObjectStoreConfig`] - S3 compatible object store sink
//! - [`RetryConfig`] - Backoff of failed deliveries
//! - [`MetricsConfig`] - Prometheus exporter
//! - [`LoggingConfig`] - Logging configuration
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [fhir]
//! url = "http://fhir-server:8080/fhir"
//! http_timeout_seconds = 60
//!
//! [fhir.auth]
//! basic_enabled = true
//! username = "fhir"
//! password = "${FHIR_PASSWORD}"
//!
//! [fhir.merge_batches_into_single_bundle]
//! enabled = true
//! entry_uniqueness_fhirpath_expression = "request.url.toString()"
//! bundle_max_size = 500
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{load_config, load_config_from_str};
pub use schema::{
    AppConfig, ApplicationConfig, FhirAuthConfig, FhirConfig, LoggingConfig, MergeConfig,
    MetricsConfig, ObjectLayout, ObjectStoreConfig, RetryConfig,
};
pub use secret::{secret_string, Credential, SecretString};
