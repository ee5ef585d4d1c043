//! Logging
//!
//! Console output plus an optional JSON file with rotation, both filtered by
//! the configured level. Pipeline code logs through the `tracing` macros with
//! structured fields.
//!
//! # Example
//!
//! ```no_run
//! use fhir_to_server::config::LoggingConfig;
//! use fhir_to_server::logging::init_logging;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(batch_size = 10, "Processing batch");
//! ```

pub mod structured;

pub use structured::{init_logging, parse_log_level, LoggingGuard};
