//! Domain error types
//!
//! This module defines the error hierarchy for the pipeline. Delivery errors
//! carry a closed [`DeliveryErrorKind`] so the retry orchestrator can classify
//! them without looking at third-party error types.

use std::fmt;
use thiserror::Error;

/// Main pipeline error type
///
/// This is the primary error type used throughout the application.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Argument validation errors (empty batch, non-positive chunk size).
    /// Never retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Delivery to a sink failed with a fatal error, or a retryable error
    /// surfaced outside of the retry orchestrator
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A queued element could not be processed as a bundle
    #[error("Unsupported payload: {0}")]
    UnsupportedPayload(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Closed set of delivery failure categories
///
/// Sink adapters translate their transport errors into one of these kinds.
/// [`crate::core::retry::classify`] maps every kind to exactly one retry
/// disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryErrorKind {
    /// Network or connection failure (refused, reset, timed out)
    Connection,
    /// Server-side 5xx response
    ServerError,
    /// Generic internal-error response carrying a diagnostic outcome
    InternalError,
    /// I/O failure while reading or writing a payload
    Io,
    /// Generic backend-service failure reported by the object store
    BackendService,
    /// The payload was rejected as malformed
    MalformedPayload,
    /// The target resource or endpoint does not exist
    NotFound,
    /// Version conflict on the target resource
    VersionConflict,
    /// Credentials were rejected
    InvalidCredentials,
    /// Anything the adapter could not place in one of the categories above
    Unclassified,
}

impl DeliveryErrorKind {
    /// Stable lowercase label, used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryErrorKind::Connection => "connection",
            DeliveryErrorKind::ServerError => "server-error",
            DeliveryErrorKind::InternalError => "internal-error",
            DeliveryErrorKind::Io => "io",
            DeliveryErrorKind::BackendService => "backend-service",
            DeliveryErrorKind::MalformedPayload => "malformed-payload",
            DeliveryErrorKind::NotFound => "not-found",
            DeliveryErrorKind::VersionConflict => "version-conflict",
            DeliveryErrorKind::InvalidCredentials => "invalid-credentials",
            DeliveryErrorKind::Unclassified => "unclassified",
        }
    }

    /// All kinds, in declaration order
    pub const ALL: [DeliveryErrorKind; 10] = [
        DeliveryErrorKind::Connection,
        DeliveryErrorKind::ServerError,
        DeliveryErrorKind::InternalError,
        DeliveryErrorKind::Io,
        DeliveryErrorKind::BackendService,
        DeliveryErrorKind::MalformedPayload,
        DeliveryErrorKind::NotFound,
        DeliveryErrorKind::VersionConflict,
        DeliveryErrorKind::InvalidCredentials,
        DeliveryErrorKind::Unclassified,
    ];
}

impl fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed delivery attempt
///
/// `diagnostic` holds the server-supplied diagnostic payload (a FHIR
/// `OperationOutcome`) when the sink returned one.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct DeliveryError {
    /// Failure category
    pub kind: DeliveryErrorKind,

    /// Human readable description
    pub message: String,

    /// Server-supplied diagnostic payload
    pub diagnostic: Option<serde_json::Value>,
}

impl DeliveryError {
    /// Creates a new delivery error without a diagnostic payload
    pub fn new(kind: DeliveryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            diagnostic: None,
        }
    }

    /// Attaches a server-supplied diagnostic payload
    pub fn with_diagnostic(mut self, diagnostic: serde_json::Value) -> Self {
        self.diagnostic = Some(diagnostic);
        self
    }
}

impl PipelineError {
    /// Returns the delivery error kind, if this is a delivery error
    pub fn delivery_kind(&self) -> Option<DeliveryErrorKind> {
        match self {
            PipelineError::Delivery(e) => Some(e.kind),
            _ => None,
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        PipelineError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::InvalidArgument("bundles cannot be empty".to_string());
        assert_eq!(err.to_string(), "Invalid argument: bundles cannot be empty");
    }

    #[test]
    fn test_delivery_error_conversion() {
        let delivery = DeliveryError::new(DeliveryErrorKind::NotFound, "no such endpoint");
        let err: PipelineError = delivery.into();
        assert!(matches!(err, PipelineError::Delivery(_)));
        assert_eq!(err.delivery_kind(), Some(DeliveryErrorKind::NotFound));
    }

    #[test]
    fn test_delivery_error_display_includes_kind() {
        let err = DeliveryError::new(DeliveryErrorKind::ServerError, "502 Bad Gateway");
        assert_eq!(err.to_string(), "server-error: 502 Bad Gateway");
    }

    #[test]
    fn test_delivery_error_with_diagnostic() {
        let outcome = serde_json::json!({"resourceType": "OperationOutcome"});
        let err = DeliveryError::new(DeliveryErrorKind::InternalError, "boom")
            .with_diagnostic(outcome.clone());
        assert_eq!(err.diagnostic, Some(outcome));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: PipelineError = io_err.into();
        assert!(matches!(err, PipelineError::Io(_)));
        assert_eq!(err.delivery_kind(), None);
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: PipelineError = json_err.into();
        assert!(matches!(err, PipelineError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: PipelineError = toml_err.into();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_kind_labels_are_unique() {
        let mut labels: Vec<&str> = DeliveryErrorKind::ALL.iter().map(|k| k.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), DeliveryErrorKind::ALL.len());
    }
}
