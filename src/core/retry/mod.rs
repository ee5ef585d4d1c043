//! Retry of failed deliveries
//!
//! - [`classify`] - maps each [`DeliveryErrorKind`](crate::domain::DeliveryErrorKind)
//!   to a [`RetryDisposition`]
//! - [`backoff`] - randomized exponential delays
//! - [`orchestrator`] - the unbounded retry loop

pub mod backoff;
pub mod classify;
pub mod orchestrator;

pub use backoff::BackoffPolicy;
pub use classify::{classify, RetryDisposition};
pub use orchestrator::{RetryOrchestrator, RetryState};
