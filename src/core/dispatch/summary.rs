//! Processing summary
//!
//! Counts what happened to one batch or single message. Summaries of
//! consecutive batches can be folded together with [`DispatchSummary::merge`].

use std::time::Duration;

/// Outcome of processing one batch or single message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchSummary {
    /// Bundles found in the input
    pub bundles_received: usize,

    /// Input elements skipped because they were not bundles
    pub unsupported_skipped: usize,

    /// Bundles dropped by the filter expression
    pub filtered_out: usize,

    /// Transactions sent to the FHIR server
    pub transactions_sent: usize,

    /// Entries sent in those transactions
    pub entries_sent: usize,

    /// Objects written to the object store
    pub objects_written: usize,

    pub duration: Duration,
}

impl DispatchSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Adds the counts of another summary to this one
    pub fn merge(&mut self, other: &DispatchSummary) {
        self.bundles_received += other.bundles_received;
        self.unsupported_skipped += other.unsupported_skipped;
        self.filtered_out += other.filtered_out;
        self.transactions_sent += other.transactions_sent;
        self.entries_sent += other.entries_sent;
        self.objects_written += other.objects_written;
        self.duration += other.duration;
    }

    /// Whether anything reached a sink
    pub fn delivered_anything(&self) -> bool {
        self.transactions_sent > 0 || self.objects_written > 0
    }

    pub fn log_summary(&self) {
        tracing::info!(
            bundles_received = self.bundles_received,
            unsupported_skipped = self.unsupported_skipped,
            filtered_out = self.filtered_out,
            transactions_sent = self.transactions_sent,
            entries_sent = self.entries_sent,
            objects_written = self.objects_written,
            duration_ms = self.duration.as_millis() as u64,
            "Processing completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adds_counts() {
        let mut total = DispatchSummary::new();
        let batch = DispatchSummary {
            bundles_received: 3,
            transactions_sent: 2,
            entries_sent: 7,
            ..DispatchSummary::default()
        }
        .with_duration(Duration::from_millis(20));

        total.merge(&batch);
        total.merge(&batch);

        assert_eq!(total.bundles_received, 6);
        assert_eq!(total.transactions_sent, 4);
        assert_eq!(total.entries_sent, 14);
        assert_eq!(total.duration, Duration::from_millis(40));
        assert!(total.delivered_anything());
    }

    #[test]
    fn test_empty_summary_delivered_nothing() {
        assert!(!DispatchSummary::new().delivered_anything());
    }
}
