//! The provider contract and the windowed range loader.

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

use crate::config::DEFAULT_RANGE_WINDOW;
use crate::error::ProviderError;
use crate::listing::change::ChangeStream;

/// Position-addressed access to a list whose items may still need fetching.
#[async_trait]
pub trait ItemsProvider<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Cached item at `position`, if any. Never fetches.
    fn get_item(&self, position: usize) -> Option<T>;

    /// Item at `position`, fetching it if needed.
    async fn load_item(&self, position: usize) -> Result<T, ProviderError>;

    /// Current known size of the list.
    fn size(&self) -> usize;

    /// Stream of change batches from now on.
    fn observe_changes(&self) -> ChangeStream;

    /// How many item loads [`ItemsProvider::load_range`] awaits together.
    fn range_window(&self) -> usize {
        DEFAULT_RANGE_WINDOW
    }

    /// Items in `first..=last`, in position order. See [`load_range`].
    async fn load_range(&self, first: usize, last: usize) -> Result<Vec<T>, ProviderError> {
        load_range(self, first, last, self.range_window()).await
    }
}

/// Load `first..=last` through `provider`, at most `window` items at a time.
///
/// Each window starts one `load_item` per position, waits for all of them and
/// keeps position order. Windows run one after another. The first failure fails
/// the whole call; no partial result is returned.
pub async fn load_range<T, P>(
    provider: &P,
    first: usize,
    last: usize,
    window: usize,
) -> Result<Vec<T>, ProviderError>
where
    T: Send + 'static,
    P: ItemsProvider<T> + ?Sized,
{
    if first > last {
        return Err(ProviderError::InvalidRange { first, last });
    }

    let window = window.max(1);
    let mut items = Vec::with_capacity((last - first).saturating_add(1).min(window));
    let mut start = first;

    loop {
        let end = last.min(start.saturating_add(window - 1));
        debug!(start, end, "Loading range window");

        let loaded = try_join_all((start..=end).map(|position| provider.load_item(position))).await?;
        items.extend(loaded);

        if end == last {
            break;
        }
        start = end + 1;
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::listing::change::ChangeNotifier;

    /// Provider whose item at `i` is `i * 10`, tracking peak concurrency.
    struct CountingProvider {
        size: usize,
        fail_at: Option<usize>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        notifier: ChangeNotifier,
    }

    impl CountingProvider {
        fn new(size: usize, fail_at: Option<usize>) -> Self {
            Self {
                size,
                fail_at,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                notifier: ChangeNotifier::new(),
            }
        }
    }

    #[async_trait]
    impl ItemsProvider<usize> for CountingProvider {
        fn get_item(&self, position: usize) -> Option<usize> {
            (position < self.size).then_some(position * 10)
        }

        async fn load_item(&self, position: usize) -> Result<usize, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if Some(position) == self.fail_at {
                return Err(ProviderError::fetch(position, 1, "boom".into()));
            }
            self.get_item(position).ok_or(ProviderError::OutOfRange {
                position,
                size: self.size,
            })
        }

        fn size(&self) -> usize {
            self.size
        }

        fn observe_changes(&self) -> ChangeStream {
            self.notifier.subscribe()
        }

        fn range_window(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn test_range_preserves_order_for_any_window() {
        let provider = CountingProvider::new(100, None);
        let expected: Vec<usize> = (3..=40).map(|i| i * 10).collect();

        for window in [1, 2, 7, 38, 500] {
            let items = load_range(&provider, 3, 40, window).await.unwrap();
            assert_eq!(items, expected, "window {window}");
        }
    }

    #[tokio::test]
    async fn test_range_window_bounds_concurrency() {
        let provider = CountingProvider::new(100, None);
        let items = provider.load_range(0, 20).await.unwrap();
        assert_eq!(items.len(), 21);
        assert!(provider.peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_range_single_position() {
        let provider = CountingProvider::new(10, None);
        assert_eq!(load_range(&provider, 5, 5, 0).await.unwrap(), vec![50]);
    }

    #[tokio::test]
    async fn test_range_fails_as_a_whole() {
        let provider = CountingProvider::new(100, Some(13));
        let err = load_range(&provider, 0, 30, 8).await.unwrap_err();
        assert!(matches!(err, ProviderError::Fetch { offset: 13, .. }));
    }

    #[tokio::test]
    async fn test_huge_range_fails_at_first_missing_position() {
        let provider = CountingProvider::new(100, None);
        for last in [usize::MAX / 8, usize::MAX] {
            let err = load_range(&provider, 0, last, 4).await.unwrap_err();
            assert!(matches!(err, ProviderError::OutOfRange { position: 100, size: 100 }));
        }
    }

    #[tokio::test]
    async fn test_range_rejects_inverted_bounds() {
        let provider = CountingProvider::new(10, None);
        let err = load_range(&provider, 5, 2, 4).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRange { first: 5, last: 2 }));
    }
}
