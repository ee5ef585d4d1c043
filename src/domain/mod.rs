//! Domain models and types.
//!
//! This module contains the core domain models and the error taxonomy of the
//! pipeline.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Bundles** ([`Bundle`], [`Entry`], [`Resource`]): immutable values
//!   built by constructor functions
//! - **Message envelopes** ([`Message`], [`BatchMetadata`])
//! - **Error types** ([`PipelineError`], [`DeliveryError`], [`DeliveryErrorKind`])
//! - **Result type alias** ([`Result`])
//!
//! # Example
//!
//! ```rust
//! use fhir_to_server::domain::{Bundle, BundleType, Entry, HttpVerb, Resource};
//! use serde_json::json;
//!
//! # fn example() -> fhir_to_server::domain::Result<()> {
//! let patient = Resource::from_json(json!({"resourceType": "Patient", "id": "p1"}))?;
//! let bundle = Bundle::new(
//!     BundleType::Transaction,
//!     vec![
//!         Entry::upsert(HttpVerb::Put, "Patient/p1", patient),
//!         Entry::delete("Observation/o1"),
//!     ],
//! );
//! assert!(bundle.has_deletes());
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod errors;
pub mod message;
pub mod result;

pub use bundle::{Bundle, BundleType, Entry, HttpVerb, Resource};
pub use errors::{DeliveryError, DeliveryErrorKind, PipelineError};
pub use message::{BatchMetadata, Message};
pub use result::Result;
