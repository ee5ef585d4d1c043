//! S3 compatible object store

use super::{ObjectStore, PutObject};
use crate::config::ObjectStoreConfig;
use crate::domain::{DeliveryError, DeliveryErrorKind, PipelineError, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::{Builder, Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use tracing::{debug, info};

/// Writes objects to one bucket of an S3 compatible store
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Builds a client from the default AWS configuration chain
    ///
    /// Static credentials, a custom endpoint and the region from the
    /// configuration take precedence over the environment.
    pub async fn from_config(config: &ObjectStoreConfig) -> Result<Self> {
        if config.bucket_name.is_empty() {
            return Err(PipelineError::Configuration(
                "object_store.bucket_name cannot be empty".to_string(),
            ));
        }

        info!(
            bucket = %config.bucket_name,
            endpoint = config.endpoint_url.as_deref().unwrap_or("<aws>"),
            "Initializing S3 object store"
        );

        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint);
        }

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            config_loader = config_loader.credentials_provider(Credentials::new(
                access_key,
                secret_key.expose_secret().as_str().to_string(),
                None,
                None,
                "fhir-to-server",
            ));
        }

        let mut s3_config = Builder::from(&config_loader.load().await);
        if config.endpoint_url.is_some() {
            // custom s3 endpoints need force_path_style set
            s3_config = s3_config.force_path_style(true);
        }

        Ok(Self {
            client: S3Client::from_conf(s3_config.build()),
            bucket: config.bucket_name.clone(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, object: PutObject) -> Result<()> {
        let size = object.body.len();
        let metadata: HashMap<String, String> = object.metadata.into_iter().collect();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object.key)
            .content_type(&object.content_type)
            .set_metadata(Some(metadata))
            .body(ByteStream::from(object.body))
            .send()
            .await
            .map_err(|e| {
                let kind = sdk_error_kind(&e);
                DeliveryError::new(
                    kind,
                    format!("Failed to write object '{}': {e}", object.key),
                )
            })?;

        debug!(bucket = %self.bucket, key = %object.key, bytes = size, "Object written");
        Ok(())
    }
}

/// Maps an SDK failure to a delivery error kind
fn sdk_error_kind<E, R>(error: &SdkError<E, R>) -> DeliveryErrorKind {
    match error {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => DeliveryErrorKind::Connection,
        SdkError::ServiceError(_) => DeliveryErrorKind::BackendService,
        SdkError::ResponseError(_) => DeliveryErrorKind::Io,
        SdkError::ConstructionFailure(_) => DeliveryErrorKind::BackendService,
        _ => DeliveryErrorKind::Unclassified,
    }
}
