//! In-memory transaction sink

use super::TransactionSink;
use crate::domain::{Bundle, DeliveryError, DeliveryErrorKind, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Records every executed transaction in memory
///
/// Failures queued with [`InMemoryTransactionSink::fail_next`] are returned
/// by the next transactions, in order.
#[derive(Debug, Default)]
pub struct InMemoryTransactionSink {
    bundles: Mutex<Vec<Bundle>>,
    failures: Mutex<VecDeque<DeliveryErrorKind>>,
}

impl InMemoryTransactionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next transaction fail with `kind`
    pub fn fail_next(&self, kind: DeliveryErrorKind) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(kind);
        }
    }

    /// Bundles executed successfully, in order
    pub fn bundles(&self) -> Vec<Bundle> {
        self.bundles
            .lock()
            .map(|bundles| bundles.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TransactionSink for InMemoryTransactionSink {
    async fn execute_transaction(&self, bundle: &Bundle) -> Result<()> {
        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.pop_front());
        if let Some(kind) = failure {
            return Err(DeliveryError::new(kind, "Injected transaction failure").into());
        }

        if let Ok(mut bundles) = self.bundles.lock() {
            bundles.push(bundle.clone());
        }
        Ok(())
    }
}
