//! Core pipeline logic.
//!
//! # Modules
//!
//! - [`merge`] - last-write-wins merging of bundle batches and partitioning
//! - [`retry`] - error classification, backoff and the retry loop
//! - [`dispatch`] - delivery path selection and the batch processor
//!
//! # Pipeline
//!
//! 1. **Validate**: null and empty batches are counted and ignored
//! 2. **Parse**: queued resources that are not bundles are skipped
//! 3. **Merge**: redundant writes to the same identity collapse to the latest
//! 4. **Partition**: the merged bundle is split into bounded chunks
//! 5. **Deliver**: each chunk goes to the FHIR server or the object store,
//!    retried with randomized exponential backoff
//!
//! # Example
//!
//! ```rust,no_run
//! use fhir_to_server::adapters::fhir::FhirServerClient;
//! use fhir_to_server::adapters::fhirpath::JsonPathEvaluator;
//! use fhir_to_server::config::load_config;
//! use fhir_to_server::core::dispatch::{BatchProcessor, DeliverySink};
//! use fhir_to_server::domain::{BatchMetadata, Message};
//! use fhir_to_server::metrics::MetricsRecorder;
//! use std::sync::Arc;
//!
//! # async fn example(bundles: Vec<serde_json::Value>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("fhir-to-server.toml")?;
//! let client = Arc::new(FhirServerClient::new(&config.fhir)?);
//!
//! let processor = BatchProcessor::new(
//!     &config,
//!     DeliverySink::Fhir(client),
//!     Arc::new(JsonPathEvaluator::new()),
//!     Arc::new(MetricsRecorder::new()),
//! )?;
//!
//! let metadata = BatchMetadata::new("fhir.bundles", 0, 0, "fhir-to-server");
//! let summary = processor
//!     .process_batch(Some(Message::new(bundles, metadata)))
//!     .await?;
//! println!("Sent {} transactions", summary.transactions_sent);
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod merge;
pub mod retry;
