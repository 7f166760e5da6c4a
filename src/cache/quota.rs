//! Quota-exceeded callback registry.

use futures::future::BoxFuture;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

type QuotaCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Callbacks run (in registration order) whenever a cache write fails because
/// the storage quota was exceeded. Typically used to evict expired entries.
#[derive(Default)]
pub struct QuotaErrorCallbacks {
    callbacks: RwLock<Vec<QuotaCallback>>,
}

impl QuotaErrorCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, callback: F)
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn execute(&self) {
        let callbacks: Vec<QuotaCallback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!(count = callbacks.len(), "running quota error callbacks");
        for callback in callbacks {
            callback().await;
        }
    }
}
