//! Queue message envelope
//!
//! Message consumption happens outside the pipeline. The consumer hands over
//! an already materialized payload together with the queue coordinates it
//! was read from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue coordinates of a batch or single message
///
/// Used only to name object-store keys and to tag object metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMetadata {
    /// When the batch was received from the queue
    pub received_timestamp: DateTime<Utc>,

    /// Queue partition
    pub partition: i32,

    /// Offset of the first message of the batch
    pub offset: i64,

    /// Source topic
    pub topic: String,

    /// Consumer group that read the batch
    pub consumer_group: String,
}

impl BatchMetadata {
    /// Creates metadata received now
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        consumer_group: impl Into<String>,
    ) -> Self {
        Self {
            received_timestamp: Utc::now(),
            partition,
            offset,
            topic: topic.into(),
            consumer_group: consumer_group.into(),
        }
    }

    /// Overrides the receive timestamp
    pub fn received_at(mut self, received_timestamp: DateTime<Utc>) -> Self {
        self.received_timestamp = received_timestamp;
        self
    }
}

/// A payload paired with its queue metadata
#[derive(Debug, Clone)]
pub struct Message<T> {
    pub payload: T,
    pub metadata: BatchMetadata,
}

impl<T> Message<T> {
    pub fn new(payload: T, metadata: BatchMetadata) -> Self {
        Self { payload, metadata }
    }
}
