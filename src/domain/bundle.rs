//! Bundle domain model
//!
//! A [`Bundle`] is an ordered batch of [`Entry`] operations that is delivered
//! as a unit. Values are immutable once constructed: every transformation
//! returns a new bundle.

use super::errors::PipelineError;
use super::result::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// FHIR bundle type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    Document,
    Message,
    Transaction,
    TransactionResponse,
    Batch,
    BatchResponse,
    History,
    Searchset,
    Collection,
}

impl BundleType {
    /// FHIR code of the bundle type
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleType::Document => "document",
            BundleType::Message => "message",
            BundleType::Transaction => "transaction",
            BundleType::TransactionResponse => "transaction-response",
            BundleType::Batch => "batch",
            BundleType::BatchResponse => "batch-response",
            BundleType::History => "history",
            BundleType::Searchset => "searchset",
            BundleType::Collection => "collection",
        }
    }
}

impl fmt::Display for BundleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundleType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "document" => Ok(BundleType::Document),
            "message" => Ok(BundleType::Message),
            "transaction" => Ok(BundleType::Transaction),
            "transaction-response" => Ok(BundleType::TransactionResponse),
            "batch" => Ok(BundleType::Batch),
            "batch-response" => Ok(BundleType::BatchResponse),
            "history" => Ok(BundleType::History),
            "searchset" => Ok(BundleType::Searchset),
            "collection" => Ok(BundleType::Collection),
            other => Err(PipelineError::Serialization(format!(
                "Unknown bundle type '{other}'"
            ))),
        }
    }
}

/// HTTP verb of a bundle entry request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Head => "HEAD",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Patch => "PATCH",
            HttpVerb::Delete => "DELETE",
        }
    }

    /// Whether the verb removes its target
    pub fn is_delete(&self) -> bool {
        matches!(self, HttpVerb::Delete)
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpVerb {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(HttpVerb::Get),
            "HEAD" => Ok(HttpVerb::Head),
            "POST" => Ok(HttpVerb::Post),
            "PUT" => Ok(HttpVerb::Put),
            "PATCH" => Ok(HttpVerb::Patch),
            "DELETE" => Ok(HttpVerb::Delete),
            other => Err(PipelineError::Serialization(format!(
                "Unknown HTTP verb '{other}'"
            ))),
        }
    }
}

/// A typed FHIR resource
///
/// The pipeline only ever reads the `resource_type` tag; the body is kept
/// as shared, immutable JSON and passed through to the sinks untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    resource_type: String,
    body: Arc<Value>,
}

impl Resource {
    /// Wraps a JSON resource, reading its `resourceType`
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Serialization` if the value is not an object
    /// with a string `resourceType`.
    pub fn from_json(body: Value) -> Result<Self> {
        let resource_type = body
            .get("resourceType")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                PipelineError::Serialization("resource has no resourceType".to_string())
            })?
            .to_string();

        Ok(Self {
            resource_type,
            body: Arc::new(body),
        })
    }

    /// Resource type tag (e.g. `Patient`)
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Logical id of the resource, if present
    pub fn id(&self) -> Option<&str> {
        self.body.get("id").and_then(Value::as_str)
    }

    /// JSON body of the resource
    pub fn body(&self) -> &Value {
        &self.body
    }
}

/// One operation within a bundle
///
/// The entry element is kept as received and written back unchanged, so
/// conditional request headers, `search` and `response` pass through. The
/// typed accessors only expose what the pipeline reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    method: Option<HttpVerb>,
    url: Option<String>,
    resource: Option<Resource>,
    element: Arc<Map<String, Value>>,
}

impl Entry {
    /// Creates an upsert entry (`PUT`, `POST` or `PATCH`) carrying a resource
    pub fn upsert(method: HttpVerb, url: impl Into<String>, resource: Resource) -> Self {
        let url = url.into();
        let mut element = Map::new();
        element.insert("resource".to_string(), resource.body().clone());
        element.insert(
            "request".to_string(),
            json!({"method": method.as_str(), "url": url}),
        );

        Self {
            method: Some(method),
            url: Some(url),
            resource: Some(resource),
            element: Arc::new(element),
        }
    }

    /// Creates a `DELETE` entry for the given request URL
    pub fn delete(url: impl Into<String>) -> Self {
        let url = url.into();
        let mut element = Map::new();
        element.insert(
            "request".to_string(),
            json!({"method": HttpVerb::Delete.as_str(), "url": url}),
        );

        Self {
            method: Some(HttpVerb::Delete),
            url: Some(url),
            resource: None,
            element: Arc::new(element),
        }
    }

    /// Request verb; `None` without a request or for an unknown method
    pub fn method(&self) -> Option<HttpVerb> {
        self.method
    }

    /// Request URL (e.g. `Patient/p1`)
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn full_url(&self) -> Option<&str> {
        self.element.get("fullUrl").and_then(Value::as_str)
    }

    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    pub fn is_delete(&self) -> bool {
        self.method.is_some_and(|method| method.is_delete())
    }

    /// Resource type tag used for grouping
    ///
    /// The payload's `resourceType` when a payload is present, otherwise the
    /// first path segment of the request URL.
    pub fn resource_type(&self) -> &str {
        match &self.resource {
            Some(resource) => resource.resource_type(),
            None => self.url_resource_type(),
        }
    }

    /// First path segment of the request URL
    pub fn url_resource_type(&self) -> &str {
        self.url
            .as_deref()
            .unwrap_or_default()
            .trim_start_matches('/')
            .split(['/', '?'])
            .next()
            .unwrap_or_default()
    }

    /// Copy of the entry holding only its `request` element
    pub fn request_only(&self) -> Self {
        let mut element = Map::new();
        if let Some(request) = self.element.get("request") {
            element.insert("request".to_string(), request.clone());
        }

        Self {
            method: self.method,
            url: self.url.clone(),
            resource: None,
            element: Arc::new(element),
        }
    }

    /// Renders the entry as a FHIR `Bundle.entry` element
    pub fn to_fhir_json(&self) -> Value {
        Value::Object(self.element.as_ref().clone())
    }

    /// Parses a FHIR `Bundle.entry` element
    ///
    /// A resource without a `resourceType` or a request with an unknown
    /// method is kept in the element but not exposed through the accessors.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Serialization` if the element is not an object.
    pub fn from_fhir_json(value: &Value) -> Result<Self> {
        let element = value.as_object().ok_or_else(|| {
            PipelineError::Serialization("bundle entry must be a JSON object".to_string())
        })?;

        let resource = element
            .get("resource")
            .filter(|body| !body.is_null())
            .and_then(|body| Resource::from_json(body.clone()).ok());

        let request = element.get("request");
        let method = request
            .and_then(|r| r.get("method"))
            .and_then(Value::as_str)
            .and_then(|m| m.parse::<HttpVerb>().ok());
        let url = request
            .and_then(|r| r.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            method,
            url,
            resource,
            element: Arc::new(element.clone()),
        })
    }
}

/// An ordered batch of entry operations
///
/// Top-level members other than `entry` (`id`, `meta`, `timestamp`,
/// `identifier`, ...) are carried along and written back as received. Only
/// `type` is rewritten, and only when the bundle has a known type.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    bundle_type: Option<BundleType>,
    entries: Vec<Entry>,
    members: Arc<Map<String, Value>>,
}

impl Bundle {
    /// Creates a bundle without an id
    pub fn new(bundle_type: BundleType, entries: Vec<Entry>) -> Self {
        Self::from_parts(Some(bundle_type), entries)
    }

    /// Creates a bundle whose type may be unknown, e.g. a merge result
    pub fn from_parts(bundle_type: Option<BundleType>, entries: Vec<Entry>) -> Self {
        let mut members = Map::new();
        members.insert("resourceType".to_string(), json!("Bundle"));
        Self {
            bundle_type,
            entries,
            members: Arc::new(members),
        }
    }

    /// Creates a bundle carrying an id used for logging
    pub fn with_id(id: impl Into<String>, bundle_type: BundleType, entries: Vec<Entry>) -> Self {
        let mut members = Map::new();
        members.insert("resourceType".to_string(), json!("Bundle"));
        members.insert("id".to_string(), json!(id.into()));
        Self {
            bundle_type: Some(bundle_type),
            entries,
            members: Arc::new(members),
        }
    }

    /// Returns a copy of this bundle with its type replaced
    pub fn with_type(&self, bundle_type: BundleType) -> Self {
        Self {
            bundle_type: Some(bundle_type),
            ..self.clone()
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.members.get("id").and_then(Value::as_str)
    }

    /// Bundle type; `None` when the input had no type or an unknown one
    pub fn bundle_type(&self) -> Option<BundleType> {
        self.bundle_type
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any entry is a `DELETE`
    pub fn has_deletes(&self) -> bool {
        self.entries.iter().any(Entry::is_delete)
    }

    /// Renders the bundle as a FHIR `Bundle` resource
    pub fn to_fhir_json(&self) -> Value {
        let mut bundle = self.members.as_ref().clone();
        if let Some(bundle_type) = self.bundle_type {
            bundle.insert("type".to_string(), json!(bundle_type.as_str()));
        }
        if !self.entries.is_empty() {
            bundle.insert(
                "entry".to_string(),
                Value::Array(self.entries.iter().map(Entry::to_fhir_json).collect()),
            );
        }
        Value::Object(bundle)
    }

    /// Parses a FHIR `Bundle` resource
    ///
    /// Content problems never reject the bundle: a missing or unknown `type`
    /// leaves the type unset and malformed entry elements are skipped with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::UnsupportedPayload` if the value is not a
    /// bundle.
    pub fn from_fhir_json(value: &Value) -> Result<Self> {
        let resource_type = value.get("resourceType").and_then(Value::as_str);
        let mut members = match value.as_object() {
            Some(object) if resource_type == Some("Bundle") => object.clone(),
            _ => {
                return Err(PipelineError::UnsupportedPayload(format!(
                    "expected a Bundle, got {}",
                    resource_type.unwrap_or("an untyped value")
                )))
            }
        };

        let bundle_type = members
            .get("type")
            .and_then(Value::as_str)
            .and_then(|t| t.parse::<BundleType>().ok());
        if bundle_type.is_none() {
            debug!(
                bundle_type = ?members.get("type"),
                "Bundle has no known type"
            );
        }

        let entries = match members.remove("entry") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match Entry::from_fhir_json(item) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed bundle entry");
                        None
                    }
                })
                .collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                warn!("Bundle entry is not an array. Ignoring its entries.");
                Vec::new()
            }
        };

        Ok(Self {
            bundle_type,
            entries,
            members: Arc::new(members),
        })
    }
}
