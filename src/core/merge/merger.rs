//! Bundle merging
//!
//! Collapses a chronologically ordered batch of bundles so that every logical
//! identity appears at most once, keeping only its most recent write.

use crate::adapters::fhirpath::IdentityExtractor;
use crate::domain::{Bundle, Entry, PipelineError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Identity expression used when none is configured
pub const DEFAULT_IDENTITY_EXPRESSION: &str = "request.url.toString()";

/// Upserts and deletes surviving a merge
///
/// Both bundles carry the type of the first input bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub upserts: Bundle,
    pub deletes: Bundle,
}

/// Merges batches of bundles by entry identity
pub struct BundleMerger {
    extractor: Arc<dyn IdentityExtractor>,
}

/// Last-write-wins state of one sweep
///
/// Each surviving entry is stored with the sequence number of the write
/// that placed it, so output order follows the position of each identity's
/// last write.
#[derive(Default)]
struct Sweep {
    seq: usize,
    upserts: HashMap<String, (usize, Entry)>,
    deletes: HashMap<String, (usize, Entry)>,
}

impl Sweep {
    fn apply(&mut self, identity: String, entry: &Entry) {
        self.seq += 1;
        if entry.is_delete() {
            self.upserts.remove(&identity);
            self.deletes.insert(identity, (self.seq, entry.clone()));
        } else {
            self.deletes.remove(&identity);
            self.upserts.insert(identity, (self.seq, entry.clone()));
        }
    }

    fn into_ordered(map: HashMap<String, (usize, Entry)>) -> Vec<Entry> {
        let mut entries: Vec<(usize, Entry)> = map.into_values().collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, entry)| entry).collect()
    }
}

impl BundleMerger {
    pub fn new(extractor: Arc<dyn IdentityExtractor>) -> Self {
        Self { extractor }
    }

    /// Merges bundles into separate upsert and delete bundles
    ///
    /// Bundles are processed oldest first and entries in order. For every
    /// identity the last entry touching it decides whether it ends up in
    /// `upserts` or `deletes`. Entries whose identity cannot be resolved are
    /// dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidArgument` if `bundles` is empty.
    pub fn merge_separate_deletes(&self, bundles: &[Bundle], expression: &str) -> Result<MergeResult> {
        let first = bundles.first().ok_or_else(|| {
            PipelineError::InvalidArgument("bundles to merge cannot be empty".to_string())
        })?;
        let bundle_type = first.bundle_type();

        let sweep = self.sweep(bundles, expression);
        let upserts = Bundle::from_parts(bundle_type, Sweep::into_ordered(sweep.upserts));
        let deletes = Bundle::from_parts(bundle_type, Sweep::into_ordered(sweep.deletes));

        debug!(
            bundles = bundles.len(),
            upserts = upserts.len(),
            deletes = deletes.len(),
            "Merged bundles"
        );

        Ok(MergeResult { upserts, deletes })
    }

    /// Merges bundles into a single bundle of surviving upserts
    ///
    /// A later `DELETE` evicts earlier upserts of the same identity but is
    /// not itself part of the result. A single bundle without deletes is
    /// returned as is.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidArgument` if `bundles` is empty.
    pub fn merge(&self, bundles: &[Bundle], expression: &str) -> Result<Bundle> {
        match bundles {
            [] => Err(PipelineError::InvalidArgument(
                "bundles to merge cannot be empty".to_string(),
            )),
            [only] if !only.has_deletes() => Ok(only.clone()),
            _ => Ok(self.merge_separate_deletes(bundles, expression)?.upserts),
        }
    }

    fn sweep(&self, bundles: &[Bundle], expression: &str) -> Sweep {
        let mut sweep = Sweep::default();

        for bundle in bundles {
            for entry in bundle.entries() {
                match self.resolve(entry, expression) {
                    Some(identity) => sweep.apply(identity, entry),
                    None => warn!(
                        expression = %expression,
                        bundle_id = bundle.id().unwrap_or("<none>"),
                        url = entry.url().unwrap_or("<none>"),
                        "Entry identity could not be resolved; entry dropped from merge"
                    ),
                }
            }
        }

        sweep
    }

    fn resolve(&self, entry: &Entry, expression: &str) -> Option<String> {
        self.extractor
            .evaluate(entry, expression)
            .filter(|identity| !identity.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fhirpath::JsonPathEvaluator;
    use crate::domain::{BundleType, HttpVerb, Resource};
    use serde_json::json;

    fn merger() -> BundleMerger {
        BundleMerger::new(Arc::new(JsonPathEvaluator::new()))
    }

    fn put(url: &str, version: &str) -> Entry {
        let (resource_type, id) = url.split_once('/').unwrap();
        let resource = Resource::from_json(json!({
            "resourceType": resource_type,
            "id": id,
            "meta": {"versionId": version}
        }))
        .unwrap();
        Entry::upsert(HttpVerb::Put, url, resource)
    }

    fn version(entry: &Entry) -> &str {
        entry.resource().unwrap().body()["meta"]["versionId"]
            .as_str()
            .unwrap()
    }

    fn transaction(entries: Vec<Entry>) -> Bundle {
        Bundle::new(BundleType::Transaction, entries)
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let err = merger()
            .merge_separate_deletes(&[], DEFAULT_IDENTITY_EXPRESSION)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument(_)));

        let err = merger().merge(&[], DEFAULT_IDENTITY_EXPRESSION).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument(_)));
    }

    #[test]
    fn test_single_bundle_without_deletes_is_returned_unchanged() {
        let bundle = Bundle::with_id(
            "b1",
            BundleType::Batch,
            vec![put("Patient/p", "1"), put("Patient/p", "2")],
        );
        let merged = merger().merge(&[bundle.clone()], "not a valid expression").unwrap();
        assert_eq!(merged, bundle);
    }

    #[test]
    fn test_later_bundle_wins() {
        let bundles = vec![
            transaction(vec![put("Patient/p", "1"), put("Observation/o", "1")]),
            transaction(vec![put("Patient/p", "2")]),
        ];

        let merged = merger().merge(&bundles, DEFAULT_IDENTITY_EXPRESSION).unwrap();
        assert_eq!(merged.len(), 2);
        // order follows the last write of each identity
        assert_eq!(merged.entries()[0].url(), Some("Observation/o"));
        assert_eq!(merged.entries()[1].url(), Some("Patient/p"));
        assert_eq!(version(&merged.entries()[1]), "2");
    }

    #[test]
    fn test_delete_after_upsert() {
        let bundles = vec![
            transaction(vec![put("Patient/p", "1")]),
            transaction(vec![Entry::delete("Patient/p")]),
        ];

        let result = merger()
            .merge_separate_deletes(&bundles, DEFAULT_IDENTITY_EXPRESSION)
            .unwrap();
        assert!(result.upserts.is_empty());
        assert_eq!(result.deletes.len(), 1);
        assert_eq!(result.deletes.entries()[0].url(), Some("Patient/p"));

        let combined = merger().merge(&bundles, DEFAULT_IDENTITY_EXPRESSION).unwrap();
        assert!(combined.is_empty());
    }

    #[test]
    fn test_upsert_after_delete() {
        let bundles = vec![
            transaction(vec![Entry::delete("Patient/p")]),
            transaction(vec![put("Patient/p", "3")]),
        ];

        let result = merger()
            .merge_separate_deletes(&bundles, DEFAULT_IDENTITY_EXPRESSION)
            .unwrap();
        assert!(result.deletes.is_empty());
        assert_eq!(result.upserts.len(), 1);
        assert_eq!(version(&result.upserts.entries()[0]), "3");
    }

    #[test]
    fn test_unresolved_identity_is_excluded() {
        let bundles = vec![transaction(vec![
            put("Patient/p", "1"),
            Entry::delete("Observation/o"),
        ])];

        let result = merger()
            .merge_separate_deletes(&bundles, "resource.meta.versionId")
            .unwrap();
        assert_eq!(result.upserts.len(), 1);
        assert!(result.deletes.is_empty());
    }

    #[test]
    fn test_blank_identity_is_unresolved() {
        let resource = Resource::from_json(json!({"resourceType": "Patient", "id": " "})).unwrap();
        let bundles = vec![
            transaction(vec![Entry::upsert(HttpVerb::Put, "Patient", resource)]),
            transaction(vec![put("Patient/p", "1")]),
        ];

        let merged = merger().merge(&bundles, "resource.id").unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.entries()[0].url(), Some("Patient/p"));
    }

    #[test]
    fn test_output_carries_first_bundle_type() {
        let bundles = vec![
            Bundle::new(BundleType::Batch, vec![put("Patient/a", "1")]),
            transaction(vec![Entry::delete("Patient/b")]),
        ];

        let result = merger()
            .merge_separate_deletes(&bundles, DEFAULT_IDENTITY_EXPRESSION)
            .unwrap();
        assert_eq!(result.upserts.bundle_type(), Some(BundleType::Batch));
        assert_eq!(result.deletes.bundle_type(), Some(BundleType::Batch));
    }

    #[test]
    fn test_duplicates_within_one_bundle_are_collapsed() {
        let bundles = vec![transaction(vec![
            put("Patient/p", "1"),
            Entry::delete("Observation/o"),
            put("Patient/p", "2"),
        ])];

        let result = merger()
            .merge_separate_deletes(&bundles, DEFAULT_IDENTITY_EXPRESSION)
            .unwrap();
        assert_eq!(result.upserts.len(), 1);
        assert_eq!(version(&result.upserts.entries()[0]), "2");
        assert_eq!(result.deletes.len(), 1);
    }
}
