//! The fetch collaborator: where pages come from.

use std::future::Future;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::listing::page::Page;

/// A remote, offset/limit addressed list.
///
/// Implementations are expected to be idempotent per `(offset, limit)`: the
/// provider never re-fetches a page once it is committed, so repeated calls must
/// return equivalent data. Timeouts and retries belong here, not in the cache.
#[async_trait]
pub trait PageSource<T>: Send + Sync + 'static {
    /// Fetch up to `limit` items starting at `offset`.
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Page<T>, FetchError>;
}

#[async_trait]
impl<T, F, Fut> PageSource<T> for F
where
    T: Send + 'static,
    F: Fn(usize, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Page<T>, FetchError>> + Send + 'static,
{
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Page<T>, FetchError> {
        (self)(offset, limit).await
    }
}
