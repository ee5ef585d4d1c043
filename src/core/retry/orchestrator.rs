//! Retry loop around sink deliveries

use super::backoff::BackoffPolicy;
use super::classify::{classify, RetryDisposition};
use crate::domain::{DeliveryError, PipelineError, Result};
use crate::metrics::{ProcessingErrorKind, ProcessingMetrics};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// State of one [`RetryOrchestrator::execute`] call
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Failed attempts so far
    pub attempt_count: u32,

    /// Most recent retryable failure
    pub last_error: Option<DeliveryError>,

    /// Delay before the next attempt
    pub next_delay: Option<Duration>,
}

impl RetryState {
    fn record_failure(&mut self, error: DeliveryError, next_delay: Duration) {
        self.attempt_count += 1;
        self.last_error = Some(error);
        self.next_delay = Some(next_delay);
    }
}

/// Re-attempts deliveries until they succeed or fail fatally
///
/// There is no attempt cap: a destination that keeps failing with retryable
/// errors blocks the batch indefinitely. Delays are awaited inline.
pub struct RetryOrchestrator {
    policy: BackoffPolicy,
    metrics: Arc<dyn ProcessingMetrics>,
}

impl RetryOrchestrator {
    pub fn new(policy: BackoffPolicy, metrics: Arc<dyn ProcessingMetrics>) -> Self {
        Self { policy, metrics }
    }

    /// Runs `operation` until it succeeds or fails fatally
    ///
    /// Only `PipelineError::Delivery` errors classified as retryable are
    /// retried. Each retryable failure increments the `sending-failed`
    /// processing error counter.
    ///
    /// # Errors
    ///
    /// Returns the first fatal delivery error, or the first non-delivery
    /// error, unchanged.
    pub async fn execute<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = RetryState::default();

        loop {
            let delivery = match operation().await {
                Ok(value) => {
                    if state.attempt_count > 0 {
                        info!(
                            operation = operation_name,
                            failed_attempts = state.attempt_count,
                            "Delivery succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(PipelineError::Delivery(delivery)) => delivery,
                Err(other) => return Err(other),
            };

            if classify(delivery.kind) == RetryDisposition::Fatal {
                error!(
                    operation = operation_name,
                    attempt = state.attempt_count + 1,
                    kind = %delivery.kind,
                    error = %delivery,
                    "Delivery failed with a non-retryable error"
                );
                log_diagnostic(&delivery);
                return Err(delivery.into());
            }

            let delay = self.policy.next_delay(state.attempt_count);
            self.metrics.increment_error(ProcessingErrorKind::SendingFailed);
            warn!(
                operation = operation_name,
                attempt = state.attempt_count + 1,
                kind = %delivery.kind,
                delay_ms = delay.as_millis() as u64,
                error = %delivery,
                "Delivery failed; retrying"
            );
            log_diagnostic(&delivery);
            state.record_failure(delivery, delay);

            tokio::time::sleep(delay).await;
        }
    }
}

fn log_diagnostic(delivery: &DeliveryError) {
    if let Some(diagnostic) = &delivery.diagnostic {
        let rendered = serde_json::to_string_pretty(diagnostic).unwrap_or_default();
        warn!(diagnostic = %rendered, "Server returned an operation outcome");
    }
}
