//! Processing metrics
//!
//! The pipeline reports through the injected [`ProcessingMetrics`]
//! capability rather than a global registry:
//!
//! - [`MetricsRecorder`] forwards to the `metrics` crate facade, exported to
//!   Prometheus by [`install_prometheus_exporter`]
//! - [`InMemoryMetrics`] captures everything for assertions in tests

pub mod memory;
pub mod recorder;

pub use memory::InMemoryMetrics;
pub use recorder::{install_prometheus_exporter, MetricsRecorder};

use std::fmt;
use std::time::Duration;

/// Processing errors, by `kind` label
pub const PROCESSING_ERRORS_TOTAL: &str = "fhirtoserver_processing_errors_total";

/// Bundles that matched the configured filter
pub const FILTER_MATCHES_TOTAL: &str = "fhirtoserver_fhir_filter_matches_total";

/// Bundles dropped by the configured filter
pub const FILTER_DROPPED_TOTAL: &str = "fhirtoserver_fhir_filter_dropped_total";

/// Time spent evaluating the filter expression
pub const FILTER_DURATION_SECONDS: &str = "fhirtoserver_fhir_filter_duration_seconds";

/// Time spent sending one transaction bundle, retries included
pub const TRANSACTION_DURATION_SECONDS: &str =
    "fhirtoserver_fhir_client_transaction_duration_seconds";

/// Transaction duration divided by the number of entries sent
pub const TRANSACTION_DURATION_NORMALIZED_SECONDS: &str =
    "fhirtoserver_fhir_client_transaction_duration_normalized_by_bundle_size_seconds";

/// Time spent merging a batch of bundles
pub const MERGE_DURATION_SECONDS: &str = "fhirtoserver_fhir_batch_bundle_merge_duration_seconds";

/// Number of entries per sent bundle
pub const BUNDLE_SIZE: &str = "fhirtoserver_fhir_batch_bundle_size";

/// Objects written to the object store
pub const OBJECTS_WRITTEN_TOTAL: &str = "fhirtoserver_object_store_objects_written_total";

/// Value of the `kind` label on [`PROCESSING_ERRORS_TOTAL`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingErrorKind {
    /// A delivery attempt failed with a retryable error
    SendingFailed,
    /// A queued element was not a bundle
    UnsupportedResourceType,
    /// The consumer handed over no message
    MessageIsNull,
    /// A batch or bundle without entries
    MessageBatchIsEmpty,
}

impl ProcessingErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingErrorKind::SendingFailed => "sending-failed",
            ProcessingErrorKind::UnsupportedResourceType => "unsupported-resource-type",
            ProcessingErrorKind::MessageIsNull => "message-is-null",
            ProcessingErrorKind::MessageBatchIsEmpty => "message-batch-is-empty",
        }
    }
}

impl fmt::Display for ProcessingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics capability injected into the processor and the retry orchestrator
pub trait ProcessingMetrics: Send + Sync {
    /// Increments [`PROCESSING_ERRORS_TOTAL`] for the given kind
    fn increment_error(&self, kind: ProcessingErrorKind);

    /// Increments a label-less counter
    fn increment_counter(&self, name: &'static str, value: u64);

    /// Records a duration sample, in seconds
    fn record_duration(&self, name: &'static str, duration: Duration);

    /// Records a plain sample
    fn record_value(&self, name: &'static str, value: f64);
}
