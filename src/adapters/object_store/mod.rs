//! Object store sink
//!
//! - [`ObjectStore`] - the put-object seam
//! - [`S3ObjectStore`] - `aws-sdk-s3` implementation
//! - [`InMemoryObjectStore`] - records every put; used by tests and dry runs
//! - [`BundleObjectStore`] - merges bundles and lays them out as objects

pub mod bundle_store;
pub mod memory;
pub mod s3;

pub use bundle_store::BundleObjectStore;
pub use memory::InMemoryObjectStore;
pub use s3::S3ObjectStore;

use crate::domain::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Content type of newline-delimited FHIR resources
pub const CONTENT_TYPE_FHIR_NDJSON: &str = "application/fhir+ndjson";

/// Content type of a single FHIR resource
pub const CONTENT_TYPE_FHIR_JSON: &str = "application/fhir+json";

/// One object to write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObject {
    pub key: String,
    pub content_type: String,
    /// User metadata attached to the object
    pub metadata: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl PutObject {
    /// Body as UTF-8 text, for logging and assertions
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or_default()
    }
}

/// Writes objects to a bucket
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes one object, replacing any object with the same key
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Delivery` with the failure classified into a
    /// `DeliveryErrorKind`.
    async fn put_object(&self, object: PutObject) -> Result<()>;
}
