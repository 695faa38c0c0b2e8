//! The unit of data returned by a page source.

use serde::{Deserialize, Serialize};

/// One fetched batch of items plus the source's best estimate of the list length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in list order, starting at the requested offset.
    pub items: Vec<T>,

    /// Total number of items the source currently reports.
    pub total_count: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: usize) -> Self {
        Self { items, total_count }
    }

    /// Number of items carried by this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}
