//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "fhir-to-server.toml")]
    pub output: String,

    /// Include example values and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing fhir-to-server configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your settings", self.output);
                println!("  2. Put credentials in a .env file, e.g.");
                println!("     - FHIR_TO_SERVER_FHIR_AUTH_PASSWORD");
                println!("     - FHIR_TO_SERVER_OBJECT_STORE_SECRET_KEY");
                println!("  3. Validate configuration: fhir-to-server validate-config");
                println!("  4. Try it out: fhir-to-server replay --input bundles.ndjson --dry-run");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {}", e);
                Ok(5)
            }
        }
    }

    /// Generate minimal configuration
    pub fn generate_minimal_config() -> String {
        r#"# fhir-to-server configuration

[application]
log_level = "info"

[fhir]
url = "http://localhost:8080/fhir"
http_timeout_seconds = 60

[fhir.auth]
basic_enabled = false

[fhir.merge_batches_into_single_bundle]
enabled = false
entry_uniqueness_fhirpath_expression = "request.url.toString()"

[object_store]
enabled = false

[retry]
initial_delay_ms = 10000
max_delay_ms = 300000
multiplier = 2.0

[metrics]
enabled = false
listen_address = "0.0.0.0:9090"

[logging]
local_enabled = false
local_path = "/var/log/fhir-to-server"
local_rotation = "daily"
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    pub fn generate_config_with_examples() -> String {
        r#"# fhir-to-server configuration
#
# Every value can be overridden with an environment variable named
# FHIR_TO_SERVER_<SECTION>_<KEY>, e.g. FHIR_TO_SERVER_FHIR_URL.
# ${VAR} placeholders are replaced from the environment when the file is loaded.

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# ============================================================================
# FHIR Server
# ============================================================================
[fhir]
# Transaction bundles are POSTed to this URL
url = "http://localhost:8080/fhir"

# Per-request timeout in seconds
http_timeout_seconds = 60

# Only bundles for which this expression is true are sent
# filter_expression = "entry.resource.resourceType = 'Patient'"

# Replace the type of every bundle before sending (transaction, batch, ...)
# override_bundle_type = "transaction"

[fhir.auth]
basic_enabled = false
# username = "fhir"
# password = "${FHIR_PASSWORD}"

# Merge all bundles of a batch into one, keeping only the latest write of
# every entry identity
[fhir.merge_batches_into_single_bundle]
enabled = false

# Expression computing the identity of an entry
entry_uniqueness_fhirpath_expression = "request.url.toString()"

# Split merged bundles into chunks of at most this many entries
# bundle_max_size = 500

# ============================================================================
# Object Store
# When enabled, everything goes to the bucket instead of the FHIR server
# ============================================================================
[object_store]
enabled = false
# endpoint_url = "http://localhost:9000"
region = "us-east-1"
# access_key = "admin"
# secret_key = "${S3_SECRET_KEY}"
# bucket_name = "fhir"
object_name_prefix = ""

# ndjson-by-type: one NDJSON object per resource type
# whole-bundle:   the merged bundle stored as is
layout = "ndjson-by-type"

# ============================================================================
# Retry
# Failed deliveries are retried without limit, with randomized exponential
# backoff between initial_delay_ms and max_delay_ms
# ============================================================================
[retry]
initial_delay_ms = 10000
max_delay_ms = 300000
multiplier = 2.0

# ============================================================================
# Metrics
# ============================================================================
[metrics]
# Serve Prometheus metrics on /metrics
enabled = false
listen_address = "0.0.0.0:9090"

# ============================================================================
# Logging
# ============================================================================
[logging]
# Enable local JSON file logging
local_enabled = false

# Local log directory
local_path = "/var/log/fhir-to-server"

# Log rotation (daily, hourly or never)
local_rotation = "daily"
"#
        .to_string()
    }
}
