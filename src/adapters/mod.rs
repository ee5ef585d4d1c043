//! External system integrations.
//!
//! - [`fhirpath`] - path expressions for entry identity and bundle filtering
//! - [`fhir`] - FHIR server transaction endpoint
//! - [`object_store`] - S3 compatible object storage
//!
//! Every integration sits behind a narrow trait ([`fhir::TransactionSink`],
//! [`object_store::ObjectStore`], [`fhirpath::IdentityExtractor`],
//! [`fhirpath::ResourceFilter`]) so the pipeline can be driven by in-memory
//! implementations in tests and dry runs.
//!
//! # FHIR server
//!
//! ```rust,no_run
//! use fhir_to_server::adapters::fhir::{FhirServerClient, TransactionSink};
//! use fhir_to_server::config::FhirConfig;
//! use fhir_to_server::domain::{Bundle, BundleType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FhirConfig {
//!     url: "http://localhost:8080/fhir".to_string(),
//!     ..FhirConfig::default()
//! };
//!
//! let client = FhirServerClient::new(&config)?;
//! client
//!     .execute_transaction(&Bundle::new(BundleType::Transaction, vec![]))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod fhir;
pub mod fhirpath;
pub mod object_store;
