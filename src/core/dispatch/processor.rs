//! Batch processor
//!
//! Entry point for batches and single messages handed over by the consumer.
//! Validates the input, skips anything that is not a bundle, and routes the
//! bundles along the configured [`DeliveryMode`]. Every delivery runs under
//! the [`RetryOrchestrator`]; a fatal delivery error aborts the batch.

use super::policy::{DeliveryMode, SingleDeliveryMode};
use super::summary::DispatchSummary;
use crate::adapters::fhir::TransactionSink;
use crate::adapters::fhirpath::{IdentityExtractor, ResourceFilter};
use crate::adapters::object_store::{BundleObjectStore, ObjectStore};
use crate::config::AppConfig;
use crate::core::merge::{partition, BundleMerger};
use crate::core::retry::RetryOrchestrator;
use crate::domain::{BatchMetadata, Bundle, BundleType, Message, PipelineError, Result};
use crate::metrics::{
    ProcessingErrorKind, ProcessingMetrics, BUNDLE_SIZE, FILTER_DROPPED_TOTAL,
    FILTER_DURATION_SECONDS, FILTER_MATCHES_TOTAL, MERGE_DURATION_SECONDS,
    TRANSACTION_DURATION_NORMALIZED_SECONDS, TRANSACTION_DURATION_SECONDS,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, field, info_span, warn, Instrument};
use uuid::Uuid;

/// Destination the processor delivers to
#[derive(Clone)]
pub enum DeliverySink {
    /// Transactions against a FHIR server
    Fhir(Arc<dyn TransactionSink>),
    /// Objects in a bucket
    ObjectStore(Arc<dyn ObjectStore>),
}

impl DeliverySink {
    fn name(&self) -> &'static str {
        match self {
            DeliverySink::Fhir(_) => "fhir",
            DeliverySink::ObjectStore(_) => "object-store",
        }
    }
}

/// Processes batches and single messages
pub struct BatchProcessor {
    mode: DeliveryMode,
    single_mode: SingleDeliveryMode,
    merger: Arc<BundleMerger>,
    filter: Arc<dyn ResourceFilter>,
    filter_expression: Option<String>,
    override_bundle_type: Option<BundleType>,
    transaction_sink: Option<Arc<dyn TransactionSink>>,
    object_store: Option<BundleObjectStore>,
    retry: RetryOrchestrator,
    metrics: Arc<dyn ProcessingMetrics>,
}

impl BatchProcessor {
    /// Creates a processor for the configured delivery path
    ///
    /// `evaluator` serves both as the identity extractor of the merger and
    /// as the bundle filter.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if the sink does not match the
    /// configured delivery path.
    pub fn new<E>(
        config: &AppConfig,
        sink: DeliverySink,
        evaluator: Arc<E>,
        metrics: Arc<dyn ProcessingMetrics>,
    ) -> Result<Self>
    where
        E: IdentityExtractor + ResourceFilter + 'static,
    {
        let mode = DeliveryMode::from_config(config);
        let single_mode = SingleDeliveryMode::from_config(config);

        let extractor: Arc<dyn IdentityExtractor> = evaluator.clone();
        let filter: Arc<dyn ResourceFilter> = evaluator;
        let merger = Arc::new(BundleMerger::new(extractor));

        let (transaction_sink, object_store) = match (&mode, sink) {
            (DeliveryMode::ObjectStore, DeliverySink::ObjectStore(store)) => {
                let object_store = &config.object_store;
                let bundle_store = BundleObjectStore::new(
                    store,
                    merger.clone(),
                    config
                        .fhir
                        .merge_batches_into_single_bundle
                        .entry_uniqueness_fhirpath_expression
                        .clone(),
                    object_store.object_name_prefix.clone(),
                    object_store.layout,
                    metrics.clone(),
                );
                (None, Some(bundle_store))
            }
            (DeliveryMode::ObjectStore, other) => {
                return Err(PipelineError::Configuration(format!(
                    "object store delivery is enabled but a {} sink was given",
                    other.name()
                )));
            }
            (_, DeliverySink::Fhir(sink)) => (Some(sink), None),
            (_, other) => {
                return Err(PipelineError::Configuration(format!(
                    "FHIR server delivery is configured but a {} sink was given",
                    other.name()
                )));
            }
        };

        debug!(mode = %mode, "Created batch processor");

        Ok(Self {
            mode,
            single_mode,
            merger,
            filter,
            filter_expression: config.fhir.filter().map(str::to_string),
            override_bundle_type: config.fhir.override_bundle_type,
            transaction_sink,
            object_store,
            retry: RetryOrchestrator::new(config.retry.backoff_policy(), metrics.clone()),
            metrics,
        })
    }

    pub fn mode(&self) -> &DeliveryMode {
        &self.mode
    }

    /// Processes one batch of queued FHIR resources
    ///
    /// A missing message or an empty batch is counted and ignored. Elements
    /// that are not bundles are counted and skipped.
    ///
    /// # Errors
    ///
    /// Returns the first fatal delivery error, or a merge or partition
    /// failure. Nothing after the failing delivery is sent.
    pub async fn process_batch(
        &self,
        message: Option<Message<Vec<Value>>>,
    ) -> Result<DispatchSummary> {
        let Some(message) = message else {
            warn!("Batch message is null. Ignoring.");
            self.metrics.increment_error(ProcessingErrorKind::MessageIsNull);
            return Ok(DispatchSummary::new());
        };

        let span = info_span!(
            "batch",
            batch_id = %Uuid::new_v4(),
            topic = %message.metadata.topic,
            partition = message.metadata.partition,
            offset = message.metadata.offset,
        );
        self.dispatch_batch(message).instrument(span).await
    }

    /// Processes one queued FHIR resource
    ///
    /// # Errors
    ///
    /// Returns a fatal delivery error.
    pub async fn process_single(&self, message: Option<Message<Value>>) -> Result<DispatchSummary> {
        let Some(message) = message else {
            warn!("Message is null. Ignoring.");
            self.metrics.increment_error(ProcessingErrorKind::MessageIsNull);
            return Ok(DispatchSummary::new());
        };

        let span = info_span!(
            "message",
            batch_id = %Uuid::new_v4(),
            topic = %message.metadata.topic,
            partition = message.metadata.partition,
            offset = message.metadata.offset,
        );
        self.dispatch_single(message).instrument(span).await
    }

    async fn dispatch_batch(&self, message: Message<Vec<Value>>) -> Result<DispatchSummary> {
        let start_time = Instant::now();
        let mut summary = DispatchSummary::new();

        if message.payload.is_empty() {
            warn!("Received batch is empty. Ignoring.");
            self.metrics
                .increment_error(ProcessingErrorKind::MessageBatchIsEmpty);
            return Ok(summary);
        }

        debug!(batch_size = message.payload.len(), "Processing batch");

        let mut bundles = Vec::with_capacity(message.payload.len());
        for value in &message.payload {
            match self.parse_bundle(value) {
                Some(bundle) => bundles.push(bundle),
                None => summary.unsupported_skipped += 1,
            }
        }
        summary.bundles_received = bundles.len();

        if bundles.is_empty() {
            debug!("No bundles left in batch after skipping unsupported resources");
            return Ok(summary.with_duration(start_time.elapsed()));
        }

        match &self.mode {
            DeliveryMode::ObjectStore => {
                debug!("Sending all bundles to object storage as merged bundles");
                summary.objects_written = self.store_batch(&bundles, &message.metadata).await?;
            }
            DeliveryMode::MergedBatch {
                identity_expression,
                max_bundle_size,
            } => {
                debug!("Sending bundles as merged batches");
                let merge_start = Instant::now();
                let merged = self.merger.merge(&bundles, identity_expression)?;
                self.metrics
                    .record_duration(MERGE_DURATION_SECONDS, merge_start.elapsed());

                let chunks = match max_bundle_size {
                    Some(max_size) => {
                        debug!(
                            bundle_size = merged.len(),
                            max_partition_size = max_size.get(),
                            "Partitioning merged bundle"
                        );
                        partition(&merged, max_size.get())?
                    }
                    None => vec![merged],
                };

                for chunk in chunks {
                    self.send_bundle(chunk, &mut summary).await?;
                }
            }
            DeliveryMode::PerBundle => {
                debug!("Sending all bundles in batch one by one");
                for bundle in bundles {
                    let span = info_span!(
                        "bundle",
                        bundle_size = bundle.len(),
                        bundle_first_entry_id = field::Empty,
                        bundle_first_entry_type = field::Empty,
                    );
                    if let Some(resource) = bundle.entries().first().and_then(|e| e.resource()) {
                        span.record("bundle_first_entry_type", resource.resource_type());
                        if let Some(id) = resource.id() {
                            span.record(
                                "bundle_first_entry_id",
                                format!("{}/{}", resource.resource_type(), id).as_str(),
                            );
                        }
                    }

                    self.send_bundle(bundle, &mut summary)
                        .instrument(span)
                        .await?;
                }
            }
        }

        let summary = summary.with_duration(start_time.elapsed());
        summary.log_summary();
        Ok(summary)
    }

    async fn dispatch_single(&self, message: Message<Value>) -> Result<DispatchSummary> {
        let start_time = Instant::now();
        let mut summary = DispatchSummary::new();

        let Some(bundle) = self.parse_bundle(&message.payload) else {
            summary.unsupported_skipped = 1;
            return Ok(summary);
        };

        if bundle.is_empty() {
            warn!("Received bundle is empty. Ignoring.");
            self.metrics
                .increment_error(ProcessingErrorKind::MessageBatchIsEmpty);
            return Ok(summary);
        }

        summary.bundles_received = 1;
        debug!(bundle_id = bundle.id().unwrap_or_default(), "Processing single bundle");

        match self.single_mode {
            SingleDeliveryMode::ObjectStore => {
                debug!("Sending bundle to object storage");
                let store = self.bundle_store()?;
                summary.objects_written = self
                    .retry
                    .execute("store-single", || {
                        store.store_single(&bundle, &message.metadata)
                    })
                    .await?;
            }
            SingleDeliveryMode::Direct => {
                debug!("Sending single bundle");
                self.send_bundle(bundle, &mut summary).await?;
            }
        }

        Ok(summary.with_duration(start_time.elapsed()))
    }

    /// Parses a queued element, counting it if it is not a bundle
    ///
    /// The configured type override is applied here so that it reaches every
    /// sink, the object store included.
    fn parse_bundle(&self, value: &Value) -> Option<Bundle> {
        match Bundle::from_fhir_json(value) {
            Ok(bundle) => Some(match self.override_bundle_type {
                Some(bundle_type) => bundle.with_type(bundle_type),
                None => bundle,
            }),
            Err(e) => {
                warn!(error = %e, "Can only process resources of type Bundle. Ignoring.");
                self.metrics
                    .increment_error(ProcessingErrorKind::UnsupportedResourceType);
                None
            }
        }
    }

    async fn store_batch(&self, bundles: &[Bundle], metadata: &BatchMetadata) -> Result<usize> {
        let store = self.bundle_store()?;
        self.retry
            .execute("store-batch", || store.store_batch(bundles, metadata))
            .await
    }

    /// Applies the filter, then sends the bundle as a transaction
    async fn send_bundle(&self, bundle: Bundle, summary: &mut DispatchSummary) -> Result<()> {
        if let Some(expression) = &self.filter_expression {
            debug!(expression = %expression, "Applying path filter to bundle");

            let filter_start = Instant::now();
            let matched = self.filter.matches(&bundle, expression);
            self.metrics
                .record_duration(FILTER_DURATION_SECONDS, filter_start.elapsed());

            if matched {
                debug!("Path filter matched");
                self.metrics.increment_counter(FILTER_MATCHES_TOTAL, 1);
            } else {
                debug!("Filtered out bundle via path expression");
                self.metrics.increment_counter(FILTER_DROPPED_TOTAL, 1);
                summary.filtered_out += 1;
                return Ok(());
            }
        }

        if bundle.is_empty() {
            debug!("Skipping bundle without entries");
            return Ok(());
        }

        let sink = self.transaction_sink()?;
        let bundle_size = bundle.len();
        debug!(bundle_size, "Sending bundle to server");
        self.metrics.record_value(BUNDLE_SIZE, bundle_size as f64);

        let send_start = Instant::now();
        self.retry
            .execute("fhir-transaction", || sink.execute_transaction(&bundle))
            .await?;
        let elapsed = send_start.elapsed();

        self.metrics
            .record_duration(TRANSACTION_DURATION_SECONDS, elapsed);
        self.metrics.record_duration(
            TRANSACTION_DURATION_NORMALIZED_SECONDS,
            elapsed.div_f64(bundle_size as f64),
        );

        summary.transactions_sent += 1;
        summary.entries_sent += bundle_size;
        Ok(())
    }

    fn transaction_sink(&self) -> Result<&Arc<dyn TransactionSink>> {
        self.transaction_sink.as_ref().ok_or_else(|| {
            PipelineError::Configuration("no FHIR server sink is configured".to_string())
        })
    }

    fn bundle_store(&self) -> Result<&BundleObjectStore> {
        self.object_store.as_ref().ok_or_else(|| {
            PipelineError::Configuration("no object store sink is configured".to_string())
        })
    }
}
