//! In-memory page source with simulated latency and failure injection.
//!
//! Stands in for a remote endpoint in the demo binary, tests and benchmarks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::listing::page::Page;
use crate::listing::source::PageSource;

/// A simulated remote list backed by a vector.
pub struct MemorySource<T> {
    items: Arc<Vec<T>>,

    /// Delay applied to every fetch.
    latency: Duration,

    /// Number of upcoming fetches that fail.
    failures_left: AtomicUsize,

    /// Every `(offset, limit)` requested so far.
    requests: Mutex<Vec<(usize, usize)>>,
}

impl<T: Clone + Send + Sync + 'static> MemorySource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: Arc::new(items),
            latency: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next `count` fetches fail.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<(usize, usize)> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl MemorySource<String> {
    /// Source of `item-0`, `item-1`, ... as configured for the demo.
    pub fn from_config(config: &SourceConfig) -> Self {
        let items = (0..config.total_items).map(|i| format!("item-{i}")).collect();
        let source = Self::new(items).with_latency(Duration::from_millis(config.latency_ms));
        source.fail_next(config.fail_first);
        source
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> PageSource<T> for MemorySource<T> {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Page<T>, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((offset, limit));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.take_failure() {
            debug!(offset, limit, "Simulated fetch failure");
            return Err(format!("simulated failure at offset {offset}").into());
        }

        let start = offset.min(self.items.len());
        let end = offset.saturating_add(limit).min(self.items.len());
        Ok(Page::new(self.items[start..end].to_vec(), self.items.len()))
    }
}
