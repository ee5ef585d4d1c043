//! In-memory object store

use super::{ObjectStore, PutObject};
use crate::domain::{DeliveryError, DeliveryErrorKind, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Records every written object in memory
///
/// Failures queued with [`InMemoryObjectStore::fail_next`] are returned by
/// the next puts, in order, before any write succeeds.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<Vec<PutObject>>,
    failures: Mutex<VecDeque<DeliveryErrorKind>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next put fail with `kind`
    pub fn fail_next(&self, kind: DeliveryErrorKind) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(kind);
        }
    }

    /// All objects written so far, in write order
    pub fn objects(&self) -> Vec<PutObject> {
        self.objects
            .lock()
            .map(|objects| objects.clone())
            .unwrap_or_default()
    }

    /// The most recent object written under `key`
    pub fn get(&self, key: &str) -> Option<PutObject> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.iter().rev().find(|o| o.key == key).cloned())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, object: PutObject) -> Result<()> {
        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.pop_front());
        if let Some(kind) = failure {
            return Err(
                DeliveryError::new(kind, format!("Injected failure for '{}'", object.key)).into(),
            );
        }

        if let Ok(mut objects) = self.objects.lock() {
            objects.push(object);
        }
        Ok(())
    }
}
