// fhir-to-server - FHIR bundle merge and delivery pipeline
// Copyright (c) 2025 fhir-to-server Contributors
// Licensed under the MIT License

//! # fhir-to-server
//!
//! Delivers batches of FHIR transaction bundles to a FHIR server or an S3
//! compatible object store.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Merging** the bundles of a batch so every entry identity keeps only its
//!   most recent write
//! - **Partitioning** merged bundles into size-bounded chunks
//! - **Dispatching** bundles to the configured sink
//! - **Retrying** transient delivery failures with randomized exponential
//!   backoff, without an attempt limit
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Merge, partition, retry and dispatch
//! - [`adapters`] - FHIR server, object store and path expressions
//! - [`domain`] - Bundles, message envelopes and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//! - [`metrics`] - Processing metrics and the Prometheus exporter
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fhir_to_server::adapters::fhirpath::JsonPathEvaluator;
//! use fhir_to_server::core::merge::BundleMerger;
//! use fhir_to_server::domain::{Bundle, BundleType, Entry, HttpVerb, Resource};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn example() -> fhir_to_server::domain::Result<()> {
//! let merger = BundleMerger::new(Arc::new(JsonPathEvaluator::new()));
//!
//! let patient = Resource::from_json(json!({"resourceType": "Patient", "id": "p"}))?;
//! let first = Bundle::new(
//!     BundleType::Transaction,
//!     vec![Entry::upsert(HttpVerb::Put, "Patient/p", patient.clone())],
//! );
//! let second = Bundle::new(
//!     BundleType::Transaction,
//!     vec![Entry::upsert(HttpVerb::Put, "Patient/p", patient)],
//! );
//!
//! let merged = merger.merge(&[first, second], "request.url.toString()")?;
//! assert_eq!(merged.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Library code returns [`domain::PipelineError`]. Only
//! [`domain::PipelineError::Delivery`] errors are ever retried, and only when
//! their [`domain::DeliveryErrorKind`] is classified as retryable.
//!
//! ## Logging
//!
//! All components log through `tracing` with structured fields; see
//! [`logging::init_logging`].

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
pub mod metrics;
