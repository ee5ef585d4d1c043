//! FHIR REST transaction client
//!
//! Posts bundles to the transaction endpoint of a FHIR server and maps every
//! failure to a [`DeliveryErrorKind`].

use super::TransactionSink;
use crate::config::FhirConfig;
use crate::domain::{Bundle, DeliveryError, DeliveryErrorKind, PipelineError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, ClientBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::debug;

const FHIR_JSON: &str = "application/fhir+json";

/// FHIR server client
///
/// # Example
///
/// ```no_run
/// use fhir_to_server::adapters::fhir::{FhirServerClient, TransactionSink};
/// use fhir_to_server::config::FhirConfig;
/// use fhir_to_server::domain::{Bundle, BundleType};
///
/// # async fn example() -> fhir_to_server::domain::Result<()> {
/// let client = FhirServerClient::new(&FhirConfig::default())?;
/// client
///     .execute_transaction(&Bundle::new(BundleType::Transaction, vec![]))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct FhirServerClient {
    url: String,
    client: Client,
    auth_header: Option<String>,
}

impl FhirServerClient {
    /// Creates a client for the configured server
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(config: &FhirConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.http_timeout())
            .connect_timeout(config.http_timeout())
            .build()
            .map_err(|e| {
                PipelineError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        let auth_header = match (&config.auth.username, &config.auth.password) {
            (Some(username), Some(password)) if config.auth.basic_enabled => {
                let credentials = format!("{username}:{}", password.expose_secret().as_str());
                let encoded = general_purpose::STANDARD.encode(credentials.as_bytes());
                Some(format!("Basic {encoded}"))
            }
            _ => None,
        };

        Ok(Self {
            url: config.url.clone(),
            client,
            auth_header,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TransactionSink for FhirServerClient {
    async fn execute_transaction(&self, bundle: &Bundle) -> Result<()> {
        let body = serde_json::to_vec(&bundle.to_fhir_json())?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, FHIR_JSON)
            .header(reqwest::header::ACCEPT, FHIR_JSON)
            .body(body);
        if let Some(auth) = &self.auth_header {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if status.is_success() {
            debug!(status = status.as_u16(), entries = bundle.len(), "Transaction accepted");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let outcome = serde_json::from_str::<Value>(&text)
            .ok()
            .filter(|v| v.get("resourceType").and_then(Value::as_str) == Some("OperationOutcome"));

        let kind = status_kind(status, outcome.is_some());
        let mut error = DeliveryError::new(
            kind,
            format!("FHIR server responded with {status}"),
        );
        if let Some(outcome) = outcome {
            error = error.with_diagnostic(outcome);
        }
        Err(error.into())
    }
}

/// Maps a non-success HTTP status to a delivery error kind
pub fn status_kind(status: StatusCode, has_outcome: bool) -> DeliveryErrorKind {
    match status.as_u16() {
        500 if has_outcome => DeliveryErrorKind::InternalError,
        500..=599 => DeliveryErrorKind::ServerError,
        400 | 422 => DeliveryErrorKind::MalformedPayload,
        401 | 403 => DeliveryErrorKind::InvalidCredentials,
        404 | 410 => DeliveryErrorKind::NotFound,
        409 | 412 => DeliveryErrorKind::VersionConflict,
        _ => DeliveryErrorKind::Unclassified,
    }
}

fn transport_error(e: reqwest::Error) -> PipelineError {
    let kind = if e.is_connect() || e.is_timeout() || e.is_request() {
        DeliveryErrorKind::Connection
    } else if e.is_body() || e.is_decode() {
        DeliveryErrorKind::Io
    } else if e.is_builder() {
        DeliveryErrorKind::MalformedPayload
    } else {
        DeliveryErrorKind::Unclassified
    };
    DeliveryError::new(kind, format!("Request to FHIR server failed: {e}")).into()
}
