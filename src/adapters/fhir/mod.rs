//! FHIR server sink
//!
//! [`TransactionSink`] is the seam the processor sends bundles through;
//! [`FhirServerClient`] is the `reqwest` implementation and
//! [`InMemoryTransactionSink`] records bundles for tests and dry runs.

pub mod client;
pub mod memory;

pub use client::{status_kind, FhirServerClient};
pub use memory::InMemoryTransactionSink;

use crate::domain::{Bundle, Result};
use async_trait::async_trait;

/// Executes a bundle as one transaction against a FHIR server
#[async_trait]
pub trait TransactionSink: Send + Sync {
    /// Sends the bundle
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Delivery` with the failure classified into a
    /// `DeliveryErrorKind`.
    async fn execute_transaction(&self, bundle: &Bundle) -> Result<()>;
}
