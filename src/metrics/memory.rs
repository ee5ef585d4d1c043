//! In-memory metrics capture

use super::{ProcessingErrorKind, ProcessingMetrics};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Records every metric call in memory
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    errors: Mutex<HashMap<ProcessingErrorKind, u64>>,
    counters: Mutex<HashMap<&'static str, u64>>,
    samples: Mutex<HashMap<&'static str, Vec<f64>>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of the processing error counter for `kind`
    pub fn errors(&self, kind: ProcessingErrorKind) -> u64 {
        self.errors
            .lock()
            .map(|errors| errors.get(&kind).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Current value of a label-less counter
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .map(|counters| counters.get(name).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// All samples recorded for a histogram, in recording order
    pub fn samples(&self, name: &str) -> Vec<f64> {
        self.samples
            .lock()
            .map(|samples| samples.get(name).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl ProcessingMetrics for InMemoryMetrics {
    fn increment_error(&self, kind: ProcessingErrorKind) {
        if let Ok(mut errors) = self.errors.lock() {
            *errors.entry(kind).or_insert(0) += 1;
        }
    }

    fn increment_counter(&self, name: &'static str, value: u64) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(name).or_insert(0) += value;
        }
    }

    fn record_duration(&self, name: &'static str, duration: Duration) {
        self.record_value(name, duration.as_secs_f64());
    }

    fn record_value(&self, name: &'static str, value: f64) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.entry(name).or_default().push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{BUNDLE_SIZE, FILTER_MATCHES_TOTAL};

    #[test]
    fn test_captures_counters_and_samples() {
        let metrics = InMemoryMetrics::new();
        metrics.increment_error(ProcessingErrorKind::SendingFailed);
        metrics.increment_error(ProcessingErrorKind::SendingFailed);
        metrics.increment_counter(FILTER_MATCHES_TOTAL, 1);
        metrics.record_value(BUNDLE_SIZE, 3.0);
        metrics.record_value(BUNDLE_SIZE, 5.0);

        assert_eq!(metrics.errors(ProcessingErrorKind::SendingFailed), 2);
        assert_eq!(metrics.errors(ProcessingErrorKind::MessageIsNull), 0);
        assert_eq!(metrics.counter(FILTER_MATCHES_TOTAL), 1);
        assert_eq!(metrics.samples(BUNDLE_SIZE), vec![3.0, 5.0]);
        assert!(metrics.samples("unknown").is_empty());
    }
}
