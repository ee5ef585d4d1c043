//! Routing of batches to the configured sink
//!
//! - [`policy`] - selects the delivery path from configuration
//! - [`processor`] - batch and single-message entry points
//! - [`summary`] - per-batch counts

pub mod policy;
pub mod processor;
pub mod summary;

pub use policy::{DeliveryMode, SingleDeliveryMode};
pub use processor::{BatchProcessor, DeliverySink};
pub use summary::DispatchSummary;
