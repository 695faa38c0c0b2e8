//! Error types for the paging engine.
//!
//! Two classes of failure exist. Fatal errors ([`ProviderError::NotInitialized`],
//! [`ProviderError::NonSequentialPage`]) mean a caller broke the provider's
//! contract or an internal invariant was violated; they are logged at error level
//! and must never be retried. Everything else is recoverable: the cache is left in
//! its last consistent state and the same call may be issued again.

use std::sync::Arc;

use thiserror::Error;

/// Error returned by a [`PageSource`](crate::listing::source::PageSource).
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Provider should be initialized first")]
    NotInitialized,

    #[error("Loaded page index is illegal: {index}, expected {}", expected_page(.max_loaded))]
    NonSequentialPage {
        index: usize,
        max_loaded: Option<usize>,
    },

    #[error("Fetch of {limit} items at offset {offset} failed: {source}")]
    Fetch {
        offset: usize,
        limit: usize,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    #[error("Position {position} is past the end of the list (size {size})")]
    OutOfRange { position: usize, size: usize },

    #[error("Invalid range: first {first} > last {last}")]
    InvalidRange { first: usize, last: usize },

    #[error("Provider was re-initialized while page {index} was loading")]
    Reset { index: usize },
}

fn expected_page(max_loaded: &Option<usize>) -> usize {
    max_loaded.map_or(0, |max| max + 1)
}

impl ProviderError {
    pub(crate) fn fetch(offset: usize, limit: usize, source: FetchError) -> Self {
        ProviderError::Fetch {
            offset,
            limit,
            source: Arc::from(source),
        }
    }

    /// Whether this error signals a contract violation rather than a transient failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProviderError::NotInitialized | ProviderError::NonSequentialPage { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ProviderError::NotInitialized.is_fatal());
        assert!(ProviderError::NonSequentialPage {
            index: 3,
            max_loaded: Some(0)
        }
        .is_fatal());
        assert!(!ProviderError::fetch(0, 25, "timeout".into()).is_fatal());
        assert!(!ProviderError::Reset { index: 1 }.is_fatal());
    }

    #[test]
    fn test_non_sequential_message() {
        let err = ProviderError::NonSequentialPage {
            index: 4,
            max_loaded: Some(1),
        };
        assert_eq!(err.to_string(), "Loaded page index is illegal: 4, expected 2");

        let err = ProviderError::NonSequentialPage {
            index: 1,
            max_loaded: None,
        };
        assert_eq!(err.to_string(), "Loaded page index is illegal: 1, expected 0");
    }

    #[test]
    fn test_fetch_error_keeps_source() {
        let err = ProviderError::fetch(50, 25, "connection reset".into());
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection reset"));
    }
}
