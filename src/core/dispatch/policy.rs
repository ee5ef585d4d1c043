//! Delivery path selection
//!
//! The path is chosen once, from configuration, when the processor is built.

use crate::config::AppConfig;
use std::fmt;
use std::num::NonZeroUsize;

/// How a batch of bundles is delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Merge the batch and write it to the object store
    ObjectStore,
    /// Merge the batch into one bundle, optionally split into chunks, and
    /// send every chunk as a transaction
    MergedBatch {
        identity_expression: String,
        max_bundle_size: Option<NonZeroUsize>,
    },
    /// Send every bundle of the batch as its own transaction
    PerBundle,
}

impl DeliveryMode {
    /// Object store first, then merging, then one transaction per bundle
    pub fn from_config(config: &AppConfig) -> Self {
        if config.object_store.enabled {
            return DeliveryMode::ObjectStore;
        }

        let merge = &config.fhir.merge_batches_into_single_bundle;
        if merge.enabled {
            return DeliveryMode::MergedBatch {
                identity_expression: merge.entry_uniqueness_fhirpath_expression.clone(),
                max_bundle_size: merge.bundle_max_size.and_then(NonZeroUsize::new),
            };
        }

        DeliveryMode::PerBundle
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::ObjectStore => f.write_str("object-store"),
            DeliveryMode::MergedBatch {
                max_bundle_size: Some(max),
                ..
            } => write!(f, "merged-batch (max {max} entries)"),
            DeliveryMode::MergedBatch { .. } => f.write_str("merged-batch"),
            DeliveryMode::PerBundle => f.write_str("per-bundle"),
        }
    }
}

/// How a single message is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleDeliveryMode {
    ObjectStore,
    Direct,
}

impl SingleDeliveryMode {
    pub fn from_config(config: &AppConfig) -> Self {
        if config.object_store.enabled {
            SingleDeliveryMode::ObjectStore
        } else {
            SingleDeliveryMode::Direct
        }
    }
}
