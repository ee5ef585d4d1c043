//! `metrics` crate backed recorder and Prometheus exporter

use super::{
    ProcessingErrorKind, ProcessingMetrics, BUNDLE_SIZE, FILTER_DROPPED_TOTAL,
    FILTER_DURATION_SECONDS, FILTER_MATCHES_TOTAL, MERGE_DURATION_SECONDS,
    OBJECTS_WRITTEN_TOTAL, PROCESSING_ERRORS_TOTAL, TRANSACTION_DURATION_NORMALIZED_SECONDS,
    TRANSACTION_DURATION_SECONDS,
};
use crate::domain::{PipelineError, Result};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;
use tracing::info;

static DESCRIBE: Once = Once::new();

/// Buckets for the duration histograms, in seconds
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0,
];

/// Forwards processing metrics to the globally installed `metrics` recorder
///
/// Without an installed recorder every call is a no-op.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        describe_metrics();
        Self
    }
}

impl ProcessingMetrics for MetricsRecorder {
    fn increment_error(&self, kind: ProcessingErrorKind) {
        metrics::counter!(PROCESSING_ERRORS_TOTAL, "kind" => kind.as_str()).increment(1);
    }

    fn increment_counter(&self, name: &'static str, value: u64) {
        metrics::counter!(name).increment(value);
    }

    fn record_duration(&self, name: &'static str, duration: Duration) {
        metrics::histogram!(name).record(duration.as_secs_f64());
    }

    fn record_value(&self, name: &'static str, value: f64) {
        metrics::histogram!(name).record(value);
    }
}

/// Registers descriptions for every metric. Safe to call multiple times.
fn describe_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!(
            PROCESSING_ERRORS_TOTAL,
            Unit::Count,
            "Processing errors by kind"
        );
        describe_counter!(
            FILTER_MATCHES_TOTAL,
            Unit::Count,
            "Bundles that matched the filter expression"
        );
        describe_counter!(
            FILTER_DROPPED_TOTAL,
            Unit::Count,
            "Bundles dropped by the filter expression"
        );
        describe_histogram!(
            FILTER_DURATION_SECONDS,
            Unit::Seconds,
            "Time taken to evaluate the filter expression"
        );
        describe_histogram!(
            TRANSACTION_DURATION_SECONDS,
            Unit::Seconds,
            "Time taken to send a transaction bundle, retries included"
        );
        describe_histogram!(
            TRANSACTION_DURATION_NORMALIZED_SECONDS,
            Unit::Seconds,
            "Transaction duration divided by the bundle size"
        );
        describe_histogram!(
            MERGE_DURATION_SECONDS,
            Unit::Seconds,
            "Time taken to merge a batch of bundles"
        );
        describe_histogram!(BUNDLE_SIZE, Unit::Count, "Entries per sent bundle");
        describe_counter!(
            OBJECTS_WRITTEN_TOTAL,
            Unit::Count,
            "Objects written to the object store"
        );
    });
}

/// Installs the Prometheus recorder and serves `/metrics` on `listen_address`
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns `PipelineError::Configuration` if the exporter cannot be built or
/// a recorder is already installed.
pub fn install_prometheus_exporter(listen_address: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen_address)
        .set_buckets(DURATION_BUCKETS)
        .map_err(|e| PipelineError::Configuration(format!("Invalid metrics buckets: {e}")))?
        .install()
        .map_err(|e| {
            PipelineError::Configuration(format!("Failed to install metrics exporter: {e}"))
        })?;

    describe_metrics();
    info!(listen_address = %listen_address, "Prometheus metrics exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_without_exporter_is_noop() {
        let recorder = MetricsRecorder::new();
        recorder.increment_error(ProcessingErrorKind::SendingFailed);
        recorder.increment_counter(FILTER_MATCHES_TOTAL, 1);
        recorder.record_duration(MERGE_DURATION_SECONDS, Duration::from_millis(5));
        recorder.record_value(BUNDLE_SIZE, 12.0);
    }
}
