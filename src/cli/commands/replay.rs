//! Replay command implementation
//!
//! Reads FHIR resources from an NDJSON file, one per line, and feeds them to
//! the batch processor as if they had been consumed from a topic named after
//! the file.

use crate::adapters::fhir::{FhirServerClient, InMemoryTransactionSink};
use crate::adapters::fhirpath::JsonPathEvaluator;
use crate::adapters::object_store::{InMemoryObjectStore, S3ObjectStore};
use crate::config::{load_config, AppConfig};
use crate::core::dispatch::{BatchProcessor, DeliverySink, DispatchSummary};
use crate::domain::{BatchMetadata, Message};
use crate::metrics::{install_prometheus_exporter, MetricsRecorder};
use anyhow::Context;
use clap::Args;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// Consumer group recorded in the metadata of replayed batches
pub const REPLAY_CONSUMER_GROUP: &str = "replay";

/// Arguments for the replay command
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// NDJSON file with one FHIR resource per line
    #[arg(short, long)]
    pub input: PathBuf,

    /// Lines per batch
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    pub batch_size: u32,

    /// Send every line through the single-message path
    #[arg(long)]
    pub single: bool,

    /// Deliver to in-memory sinks and print what would have been sent
    #[arg(long)]
    pub dry_run: bool,
}

/// One input line with its 1-based line number
#[derive(Debug, Clone, PartialEq)]
pub struct InputLine {
    pub line_number: i64,
    pub value: Value,
}

/// In-memory sinks kept around to report a dry run
enum DryRunSinks {
    Fhir(Arc<InMemoryTransactionSink>),
    ObjectStore(Arc<InMemoryObjectStore>),
}

impl ReplayArgs {
    /// Execute the replay command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(input = %self.input.display(), "Starting replay command");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        if config.metrics.enabled && !self.dry_run {
            let started = config
                .metrics
                .socket_addr()
                .map_err(anyhow::Error::msg)
                .and_then(|addr| install_prometheus_exporter(addr).map_err(Into::into));
            if let Err(e) = started {
                tracing::error!(error = %e, "Failed to start metrics exporter");
                eprintln!("Failed to start metrics exporter: {e}");
                return Ok(4);
            }
        }

        let (sink, dry_run_sinks) = match self.create_sink(&config).await {
            Ok(sinks) => sinks,
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize sink");
                eprintln!("Failed to initialize sink: {e}");
                return Ok(4);
            }
        };

        let processor = match BatchProcessor::new(
            &config,
            sink,
            Arc::new(JsonPathEvaluator::new()),
            Arc::new(MetricsRecorder::new()),
        ) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to initialize processor: {e}");
                return Ok(4);
            }
        };

        let lines = read_input(&self.input)?;
        let topic = topic_name(&self.input);

        if self.dry_run {
            println!("🔍 DRY RUN MODE - nothing will be delivered");
            println!();
        }
        println!(
            "🚀 Replaying {} resources from {} ({})",
            lines.len(),
            self.input.display(),
            processor.mode()
        );

        let mut total = DispatchSummary::new();
        let mut interrupted = false;

        if self.single {
            for line in lines {
                if *shutdown_signal.borrow() {
                    interrupted = true;
                    break;
                }
                let metadata =
                    BatchMetadata::new(&topic, 0, line.line_number, REPLAY_CONSUMER_GROUP);
                match processor
                    .process_single(Some(Message::new(line.value, metadata)))
                    .await
                {
                    Ok(summary) => total.merge(&summary),
                    Err(e) => return Ok(report_failure(&e, line.line_number)),
                }
            }
        } else {
            for batch in batches(lines, self.batch_size as usize) {
                if *shutdown_signal.borrow() {
                    interrupted = true;
                    break;
                }
                let offset = batch.first().map(|l| l.line_number).unwrap_or_default();
                let metadata = BatchMetadata::new(&topic, 0, offset, REPLAY_CONSUMER_GROUP);
                let payload = batch.into_iter().map(|l| l.value).collect();
                match processor
                    .process_batch(Some(Message::new(payload, metadata)))
                    .await
                {
                    Ok(summary) => total.merge(&summary),
                    Err(e) => return Ok(report_failure(&e, offset)),
                }
            }
        }

        println!();
        println!("📊 Replay Summary:");
        println!("  Bundles: {}", total.bundles_received);
        println!("  Unsupported skipped: {}", total.unsupported_skipped);
        println!("  Filtered out: {}", total.filtered_out);
        println!("  Transactions sent: {}", total.transactions_sent);
        println!("  Entries sent: {}", total.entries_sent);
        println!("  Objects written: {}", total.objects_written);
        println!("  Duration: {:.2}s", total.duration.as_secs_f64());
        println!();

        if let Some(sinks) = dry_run_sinks {
            print_dry_run(&sinks);
        }

        if interrupted {
            println!("⚠️  Replay interrupted gracefully after the current batch.");
            tracing::info!("Replay interrupted by user signal");
            return Ok(130);
        }

        println!("✅ Replay completed!");
        Ok(0)
    }

    async fn create_sink(
        &self,
        config: &AppConfig,
    ) -> crate::domain::Result<(DeliverySink, Option<DryRunSinks>)> {
        if self.dry_run {
            tracing::info!("Dry run mode enabled - using in-memory sinks");
            return Ok(if config.object_store.enabled {
                let store = Arc::new(InMemoryObjectStore::new());
                (
                    DeliverySink::ObjectStore(store.clone()),
                    Some(DryRunSinks::ObjectStore(store)),
                )
            } else {
                let sink = Arc::new(InMemoryTransactionSink::new());
                (
                    DeliverySink::Fhir(sink.clone()),
                    Some(DryRunSinks::Fhir(sink)),
                )
            });
        }

        if config.object_store.enabled {
            let store = S3ObjectStore::from_config(&config.object_store).await?;
            Ok((DeliverySink::ObjectStore(Arc::new(store)), None))
        } else {
            let client = FhirServerClient::new(&config.fhir)?;
            Ok((DeliverySink::Fhir(Arc::new(client)), None))
        }
    }
}

fn report_failure(error: &crate::domain::PipelineError, offset: i64) -> i32 {
    tracing::error!(error = %error, offset, "Replay failed");
    eprintln!("Replay failed at line {offset}: {error}");
    5
}

fn print_dry_run(sinks: &DryRunSinks) {
    match sinks {
        DryRunSinks::Fhir(sink) => {
            let bundles = sink.bundles();
            println!("Would have sent {} transaction(s):", bundles.len());
            for (i, bundle) in bundles.iter().enumerate() {
                println!(
                    "  {}. {} bundle with {} entries",
                    i + 1,
                    bundle
                        .bundle_type()
                        .map(|t| t.as_str())
                        .unwrap_or("untyped"),
                    bundle.len()
                );
            }
        }
        DryRunSinks::ObjectStore(store) => {
            let objects = store.objects();
            println!("Would have written {} object(s):", objects.len());
            for object in &objects {
                println!("  - {} ({} bytes)", object.key, object.body.len());
            }
        }
    }
    println!();
}

/// Reads non-blank lines as JSON values
///
/// # Errors
///
/// Fails if the file cannot be read or a line is not valid JSON.
pub fn read_input(path: &Path) -> anyhow::Result<Vec<InputLine>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file {}", path.display()))?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let line_number = i as i64 + 1;
            serde_json::from_str(line)
                .map(|value| InputLine { line_number, value })
                .with_context(|| format!("Line {line_number} is not valid JSON"))
        })
        .collect()
}

/// Groups lines into batches of at most `batch_size`
pub fn batches(lines: Vec<InputLine>, batch_size: usize) -> Vec<Vec<InputLine>> {
    let mut batches = Vec::new();
    let mut current = Vec::with_capacity(batch_size);
    for line in lines {
        current.push(line);
        if current.len() == batch_size {
            batches.push(std::mem::replace(
                &mut current,
                Vec::with_capacity(batch_size),
            ));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Topic name used for replayed batches: the file stem
pub fn topic_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "replay".to_string())
}
