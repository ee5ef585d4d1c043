//! Validate config command implementation

use crate::config::load_config;
use crate::core::dispatch::DeliveryMode;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        if let Err(e) = config.validate() {
            println!("❌ Configuration validation failed");
            println!("   Error: {e}");
            println!();
            return Ok(2);
        }

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Delivery Mode: {}", DeliveryMode::from_config(&config));

        if config.object_store.enabled {
            let store = &config.object_store;
            println!(
                "  Object Store Endpoint: {}",
                store.endpoint_url.as_deref().unwrap_or("AWS default")
            );
            println!("  Bucket: {}", store.bucket_name);
            println!("  Region: {}", store.region);
            println!("  Object Prefix: {:?}", store.object_name_prefix);
            println!("  Layout: {:?}", store.layout);
        } else {
            println!("  FHIR Server: {}", config.fhir.url);
            println!("  HTTP Timeout: {}s", config.fhir.http_timeout_seconds);
            println!("  Basic Auth: {}", config.fhir.auth.basic_enabled);
            println!(
                "  Filter: {}",
                config.fhir.filter().unwrap_or("none")
            );
            if let Some(bundle_type) = config.fhir.override_bundle_type {
                println!("  Override Bundle Type: {bundle_type}");
            }
        }

        println!(
            "  Identity Expression: {}",
            config
                .fhir
                .merge_batches_into_single_bundle
                .entry_uniqueness_fhirpath_expression
        );
        println!(
            "  Retry: {}ms initial, {}ms max, x{}",
            config.retry.initial_delay_ms, config.retry.max_delay_ms, config.retry.multiplier
        );
        if config.metrics.enabled {
            println!("  Metrics: {}", config.metrics.listen_address);
        }
        println!();
        Ok(0)
    }
}
