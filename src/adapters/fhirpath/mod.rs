//! Path expression evaluation over FHIR JSON
//!
//! The merger and the processor depend on two narrow capabilities:
//!
//! - [`IdentityExtractor`] computes an identity string for a bundle entry
//! - [`ResourceFilter`] decides whether a bundle should be sent
//!
//! [`JsonPathEvaluator`] implements both over the JSON form of entries and
//! bundles using [`PathExpression`].

pub mod expression;

pub use expression::PathExpression;

use crate::domain::{Bundle, Entry, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::warn;

/// Computes an identity string for an entry
pub trait IdentityExtractor: Send + Sync {
    /// Evaluates `expression` against the entry
    ///
    /// Returns `None` when the expression yields nothing, a non-primitive, or
    /// cannot be evaluated.
    fn evaluate(&self, entry: &Entry, expression: &str) -> Option<String>;
}

/// Decides whether a bundle passes a configured filter
pub trait ResourceFilter: Send + Sync {
    /// Returns `true` if `expression` evaluates to `true` for the bundle
    fn matches(&self, bundle: &Bundle, expression: &str) -> bool;
}

/// JSON-backed evaluator for both seams
///
/// Parsed expressions are cached by source text since the same handful of
/// configured expressions is evaluated for every entry.
#[derive(Debug, Default)]
pub struct JsonPathEvaluator {
    cache: RwLock<HashMap<String, PathExpression>>,
}

impl JsonPathEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(&self, expression: &str) -> Result<PathExpression> {
        if let Ok(cache) = self.cache.read() {
            if let Some(parsed) = cache.get(expression) {
                return Ok(parsed.clone());
            }
        }

        let parsed = PathExpression::parse(expression)?;
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(expression.to_string(), parsed.clone());
        }
        Ok(parsed)
    }
}

impl IdentityExtractor for JsonPathEvaluator {
    fn evaluate(&self, entry: &Entry, expression: &str) -> Option<String> {
        match self.compile(expression) {
            Ok(parsed) => parsed.evaluate_first_string(&entry.to_fhir_json()),
            Err(e) => {
                warn!(expression = %expression, error = %e, "Failed to parse identity expression");
                None
            }
        }
    }
}

impl ResourceFilter for JsonPathEvaluator {
    fn matches(&self, bundle: &Bundle, expression: &str) -> bool {
        match self.compile(expression) {
            Ok(parsed) => parsed.evaluate_bool(&bundle.to_fhir_json()),
            Err(e) => {
                warn!(expression = %expression, error = %e, "Failed to parse filter expression");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BundleType, HttpVerb, Resource};
    use serde_json::json;

    fn patient_entry(id: &str) -> Entry {
        let resource = Resource::from_json(json!({
            "resourceType": "Patient",
            "id": id,
            "identifier": [{"system": "urn:mrn", "value": format!("mrn-{id}")}]
        }))
        .unwrap();
        Entry::upsert(HttpVerb::Put, format!("Patient/{id}"), resource)
    }

    #[test]
    fn test_default_identity_expression() {
        let evaluator = JsonPathEvaluator::new();
        assert_eq!(
            evaluator.evaluate(&patient_entry("p1"), "request.url.toString()"),
            Some("Patient/p1".to_string())
        );
        assert_eq!(
            evaluator.evaluate(&Entry::delete("Patient/p1"), "request.url"),
            Some("Patient/p1".to_string())
        );
    }

    #[test]
    fn test_identity_from_resource_identifier() {
        let evaluator = JsonPathEvaluator::new();
        assert_eq!(
            evaluator.evaluate(&patient_entry("p2"), "resource.identifier.value.first()"),
            Some("mrn-p2".to_string())
        );
        // deletes carry no resource, so the identity is unresolved
        assert_eq!(
            evaluator.evaluate(&Entry::delete("Patient/p2"), "resource.identifier.value"),
            None
        );
    }

    #[test]
    fn test_invalid_expression_is_unresolved() {
        let evaluator = JsonPathEvaluator::new();
        assert_eq!(evaluator.evaluate(&patient_entry("p1"), "request..url"), None);
    }

    #[test]
    fn test_filter_matches() {
        let evaluator = JsonPathEvaluator::new();
        let bundle = Bundle::new(BundleType::Transaction, vec![patient_entry("p1")]);

        assert!(evaluator.matches(&bundle, "entry.resource.resourceType = 'Patient'"));
        assert!(!evaluator.matches(&bundle, "entry.resource.resourceType = 'Observation'"));
        assert!(evaluator.matches(&bundle, "type = 'transaction' and entry.exists()"));
        assert!(!evaluator.matches(&bundle, "entry.resource.id"));
        assert!(!evaluator.matches(&bundle, "entry..id"));
    }

    #[test]
    fn test_cache_reuses_parsed_expressions() {
        let evaluator = JsonPathEvaluator::new();
        let entry = patient_entry("p1");
        evaluator.evaluate(&entry, "request.url");
        evaluator.evaluate(&entry, "request.url");
        assert_eq!(evaluator.cache.read().unwrap().len(), 1);
    }
}
