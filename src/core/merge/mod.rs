//! Merge and partition of bundle batches
//!
//! - [`merger`] - last-write-wins deduplication across a batch of bundles
//! - [`partition`] - size-bounded chunking of a merged bundle

pub mod merger;
pub mod partition;

pub use merger::{BundleMerger, MergeResult, DEFAULT_IDENTITY_EXPRESSION};
pub use partition::partition;
