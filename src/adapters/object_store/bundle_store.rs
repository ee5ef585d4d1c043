//! Bundle layout on the object store
//!
//! Bundles are merged first, so each stored object only carries the most
//! recent write of every identity. Key formats:
//!
//! | layout           | upserts                                  | deletes                                          |
//! |------------------|------------------------------------------|--------------------------------------------------|
//! | `ndjson-by-type` | `<prefix><Type>/bundle-<id>.ndjson`      | `<prefix><Type>/_delete/bundle-<id>.json`        |
//! | `whole-bundle`   | `<prefix>Bundle/bundle-<id>.json`        | `<prefix>Bundle/_delete/bundle-<id>.json`        |
//!
//! `<id>` is `<received-ms>-<partition>-<offset>` for batches and the current
//! wall-clock milliseconds for single messages.

use super::{ObjectStore, PutObject, CONTENT_TYPE_FHIR_JSON, CONTENT_TYPE_FHIR_NDJSON};
use crate::config::ObjectLayout;
use crate::core::merge::{BundleMerger, MergeResult};
use crate::domain::{BatchMetadata, Bundle, BundleType, Entry, Result};
use crate::metrics::{ProcessingMetrics, OBJECTS_WRITTEN_TOTAL};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Merges bundles and writes them as objects
pub struct BundleObjectStore {
    store: Arc<dyn ObjectStore>,
    merger: Arc<BundleMerger>,
    identity_expression: String,
    prefix: String,
    layout: ObjectLayout,
    metrics: Arc<dyn ProcessingMetrics>,
}

impl BundleObjectStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        merger: Arc<BundleMerger>,
        identity_expression: impl Into<String>,
        prefix: impl Into<String>,
        layout: ObjectLayout,
        metrics: Arc<dyn ProcessingMetrics>,
    ) -> Self {
        Self {
            store,
            merger,
            identity_expression: identity_expression.into(),
            prefix: prefix.into(),
            layout,
            metrics,
        }
    }

    /// Merges and stores a batch, returning the number of objects written
    ///
    /// Keys are derived from the batch coordinates, so storing the same batch
    /// again overwrites the same objects.
    pub async fn store_batch(&self, bundles: &[Bundle], metadata: &BatchMetadata) -> Result<usize> {
        let disambiguator = format!(
            "{}-{}-{}",
            metadata.received_timestamp.timestamp_millis(),
            metadata.partition,
            metadata.offset
        );
        self.store_merged(bundles, &disambiguator, metadata).await
    }

    /// Stores a single bundle, returning the number of objects written
    pub async fn store_single(&self, bundle: &Bundle, metadata: &BatchMetadata) -> Result<usize> {
        let disambiguator = Utc::now().timestamp_millis().to_string();
        self.store_merged(std::slice::from_ref(bundle), &disambiguator, metadata)
            .await
    }

    async fn store_merged(
        &self,
        bundles: &[Bundle],
        disambiguator: &str,
        metadata: &BatchMetadata,
    ) -> Result<usize> {
        let merged = self
            .merger
            .merge_separate_deletes(bundles, &self.identity_expression)?;
        let objects = self.layout_objects(&merged, disambiguator, metadata)?;

        debug!(
            upserts = merged.upserts.len(),
            deletes = merged.deletes.len(),
            objects = objects.len(),
            "Storing merged bundles"
        );

        let mut written = 0;
        for object in objects {
            debug!(key = %object.key, bytes = object.body.len(), "Storing object");
            self.store.put_object(object).await?;
            self.metrics.increment_counter(OBJECTS_WRITTEN_TOTAL, 1);
            written += 1;
        }
        Ok(written)
    }

    /// Builds the objects for a merge result without writing them
    pub fn layout_objects(
        &self,
        merged: &MergeResult,
        disambiguator: &str,
        metadata: &BatchMetadata,
    ) -> Result<Vec<PutObject>> {
        let object_metadata = object_metadata(metadata);
        let mut objects = Vec::new();

        match self.layout {
            ObjectLayout::NdjsonByType => {
                for (resource_type, entries) in group_by(merged.upserts.entries(), Entry::resource_type) {
                    let lines = entries
                        .iter()
                        .filter_map(|entry| entry.resource())
                        .map(|resource| serde_json::to_string(resource.body()))
                        .collect::<std::result::Result<Vec<_>, _>>()?;

                    objects.push(PutObject {
                        key: format!(
                            "{}{}/bundle-{}.ndjson",
                            self.prefix, resource_type, disambiguator
                        ),
                        content_type: CONTENT_TYPE_FHIR_NDJSON.to_string(),
                        metadata: object_metadata.clone(),
                        body: lines.join("\n").into_bytes(),
                    });
                }

                for (resource_type, entries) in
                    group_by(merged.deletes.entries(), Entry::url_resource_type)
                {
                    // only the requests are kept
                    let requests = entries.iter().map(|e| e.request_only()).collect();
                    let bundle = Bundle::new(BundleType::Transaction, requests);

                    objects.push(PutObject {
                        key: format!(
                            "{}{}/_delete/bundle-{}.json",
                            self.prefix, resource_type, disambiguator
                        ),
                        content_type: CONTENT_TYPE_FHIR_JSON.to_string(),
                        metadata: object_metadata.clone(),
                        body: serde_json::to_vec(&bundle.to_fhir_json())?,
                    });
                }
            }
            ObjectLayout::WholeBundle => {
                if !merged.upserts.is_empty() {
                    objects.push(PutObject {
                        key: format!("{}Bundle/bundle-{}.json", self.prefix, disambiguator),
                        content_type: CONTENT_TYPE_FHIR_JSON.to_string(),
                        metadata: object_metadata.clone(),
                        body: serde_json::to_vec(&merged.upserts.to_fhir_json())?,
                    });
                }
                if !merged.deletes.is_empty() {
                    objects.push(PutObject {
                        key: format!("{}Bundle/_delete/bundle-{}.json", self.prefix, disambiguator),
                        content_type: CONTENT_TYPE_FHIR_JSON.to_string(),
                        metadata: object_metadata,
                        body: serde_json::to_vec(&merged.deletes.to_fhir_json())?,
                    });
                }
            }
        }

        Ok(objects)
    }
}

/// Groups entries by a key, keeping the order in which keys are first seen
fn group_by<'a>(
    entries: &'a [Entry],
    key: impl Fn(&'a Entry) -> &'a str,
) -> Vec<(&'a str, Vec<&'a Entry>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&Entry>)> = Vec::new();

    for entry in entries {
        let k = key(entry);
        match index.get(k) {
            Some(&i) => groups[i].1.push(entry),
            None => {
                index.insert(k, groups.len());
                groups.push((k, vec![entry]));
            }
        }
    }

    groups
}

fn object_metadata(metadata: &BatchMetadata) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("kafka-topic".to_string(), metadata.topic.clone()),
        ("kafka-partition".to_string(), metadata.partition.to_string()),
        ("kafka-offset".to_string(), metadata.offset.to_string()),
        (
            "kafka-timestamp".to_string(),
            metadata.received_timestamp.timestamp_millis().to_string(),
        ),
        ("kafka-group-id".to_string(), metadata.consumer_group.clone()),
    ])
}
