//! Paging list provider: a fixed-size page cache over a remote list.
//!
//! The provider:
//! - Bulk-loads the first pages on [`PagingListProvider::initialize`]
//! - Serves cached items synchronously
//! - Extends the cache one page at a time, strictly in page order
//! - Shares one fetch between concurrent loads of the same page
//! - Estimates the list size, reporting one extra row while more may exist
//! - Broadcasts a change batch for every cache mutation
//!
//! All cache mutations happen under one write lock, never across an await, so a
//! reader always sees `pages` and `max_loaded_page` agree.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::listing::change::{ChangeNotifier, ChangeStream, ListChange};
use crate::listing::page::Page;
use crate::listing::provider::ItemsProvider;
use crate::listing::source::PageSource;

/// Lifecycle of a provider's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    Uninitialized,
    Initializing,
    Ready,
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadState::Uninitialized => write!(f, "uninitialized"),
            LoadState::Initializing => write!(f, "initializing"),
            LoadState::Ready => write!(f, "ready"),
        }
    }
}

/// Counters describing how a provider has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStats {
    /// Successful fetches, bulk loads included.
    pub pages_fetched: u64,
    /// Item loads answered from the cache.
    pub cache_hits: u64,
    /// Fetches that returned an error.
    pub fetch_failures: u64,
    /// Page loads that joined a fetch already in flight.
    pub shared_loads: u64,
}

#[derive(Default)]
struct Counters {
    pages_fetched: AtomicU64,
    cache_hits: AtomicU64,
    fetch_failures: AtomicU64,
    shared_loads: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ProviderStats {
        ProviderStats {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            shared_loads: self.shared_loads.load(Ordering::Relaxed),
        }
    }
}

/// Cache bookkeeping. Pure state; locking and fetching live in [`Inner`].
struct PageCache<T> {
    pages: HashMap<usize, Arc<[T]>>,
    max_loaded_page: Option<usize>,
    is_last_page_loaded: bool,
    total_count: Option<usize>,
    state: LoadState,

    /// Bumped by every reset; fetches from an older generation never commit.
    generation: u64,
}

impl<T: Clone> PageCache<T> {
    fn new() -> Self {
        Self {
            pages: HashMap::new(),
            max_loaded_page: None,
            is_last_page_loaded: false,
            total_count: None,
            state: LoadState::Uninitialized,
            generation: 0,
        }
    }

    fn get_item(&self, position: usize, page_size: usize) -> Option<T> {
        self.pages
            .get(&(position / page_size))
            .and_then(|page| page.get(position % page_size))
            .cloned()
    }

    /// Items actually held, ignoring the trailing placeholder row.
    fn loaded_count(&self, page_size: usize) -> usize {
        match self.max_loaded_page {
            Some(max) => max * page_size + self.pages.get(&max).map_or(0, |page| page.len()),
            None => 0,
        }
    }

    fn size(&self, page_size: usize) -> usize {
        if self.state != LoadState::Ready {
            return 0;
        }
        self.loaded_count(page_size) + usize::from(!self.is_last_page_loaded)
    }

    /// Drop everything and enter `Initializing` under a fresh generation.
    fn reset(&mut self) {
        self.pages.clear();
        self.max_loaded_page = None;
        self.is_last_page_loaded = false;
        self.total_count = None;
        self.state = LoadState::Initializing;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Fill the cache from a bulk fetch of `requested` items starting at offset 0.
    ///
    /// As with single pages, a response shorter than requested ends the list.
    fn populate(&mut self, page: Page<T>, requested: usize, page_size: usize) {
        let Page { items, total_count } = page;
        let loaded = items.len();
        self.total_count = Some(total_count);

        let mut items = items.into_iter();
        let mut index = 0;
        loop {
            let chunk: Vec<T> = items.by_ref().take(page_size).collect();
            if chunk.is_empty() {
                break;
            }
            let short = chunk.len() < page_size;
            self.pages.insert(index, chunk.into());
            self.max_loaded_page = Some(index);
            if short {
                break;
            }
            index += 1;
        }

        self.is_last_page_loaded = loaded < requested || loaded >= total_count;
        self.state = LoadState::Ready;
    }

    /// Store the fetched page `index`. Only the page right after the last
    /// loaded one is accepted, and nothing past the final page; anything else
    /// leaves the cache untouched.
    fn commit(&mut self, index: usize, page: Page<T>, page_size: usize) -> Result<Arc<[T]>, ProviderError> {
        if self.is_last_page_loaded {
            return Err(ProviderError::OutOfRange {
                position: index.saturating_mul(page_size),
                size: self.size(page_size),
            });
        }
        let expected = self.max_loaded_page.map_or(0, |max| max + 1);
        if index != expected {
            return Err(ProviderError::NonSequentialPage {
                index,
                max_loaded: self.max_loaded_page,
            });
        }

        let Page { mut items, total_count } = page;
        if items.len() > page_size {
            warn!(
                index,
                received = items.len(),
                page_size,
                "Oversized page truncated"
            );
            items.truncate(page_size);
        }

        // Last write wins, even if the source reports a smaller total than before.
        self.total_count = Some(total_count);

        let items: Arc<[T]> = items.into();
        self.max_loaded_page = Some(index);
        self.pages.insert(index, Arc::clone(&items));

        let loaded = index * page_size + items.len();
        if items.len() < page_size || loaded >= total_count {
            self.is_last_page_loaded = true;
        }

        Ok(items)
    }
}

type PageResult<T> = Result<Arc<[T]>, ProviderError>;

struct InFlight<T> {
    generation: u64,
    future: SharedPage<T>,
}

struct Inner<T> {
    id: Uuid,
    source: Arc<dyn PageSource<T>>,
    page_size: usize,
    range_window: usize,
    cache: RwLock<PageCache<T>>,

    /// Page fetches currently running, keyed by page index.
    in_flight: Mutex<HashMap<usize, InFlight<T>>>,

    /// Serializes bulk loads.
    init_gate: tokio::sync::Mutex<()>,

    notifier: ChangeNotifier,
    counters: Arc<Counters>,
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn read_cache(&self) -> RwLockReadGuard<'_, PageCache<T>> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, PageCache<T>> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<usize, InFlight<T>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the cache and load pages covering `load_to_position` plus one page
    /// of lookahead. Callers must hold `init_gate`.
    async fn bulk_load(&self, load_to_position: usize) -> Result<usize, ProviderError> {
        let generation = {
            let mut cache = self.write_cache();
            let old_size = cache.size(self.page_size);
            cache.reset();
            self.lock_in_flight().clear();
            self.notifier.notify(ListChange::resize(0, old_size, 0));
            cache.generation
        };
        let mut guard = InitGuard {
            inner: self,
            generation,
            armed: true,
        };

        let items_to_load = (load_to_position / self.page_size)
            .saturating_add(2)
            .saturating_mul(self.page_size);
        info!(
            provider = %self.id,
            load_to_position,
            items_to_load,
            "Initializing paging provider"
        );

        let page = match self.source.fetch_page(0, items_to_load).await {
            Ok(page) => page,
            Err(source) => {
                Counters::bump(&self.counters.fetch_failures);
                warn!(provider = %self.id, error = %source, "Initial fetch failed");
                return Err(ProviderError::fetch(0, items_to_load, source));
            }
        };
        Counters::bump(&self.counters.pages_fetched);

        let mut cache = self.write_cache();
        if cache.generation != generation {
            return Err(ProviderError::Reset { index: 0 });
        }
        cache.populate(page, items_to_load, self.page_size);
        guard.armed = false;

        let size = cache.size(self.page_size);
        self.notifier.notify(ListChange::resize(0, 0, size));
        info!(
            provider = %self.id,
            size,
            max_loaded_page = ?cache.max_loaded_page,
            total_count = ?cache.total_count,
            last_page_loaded = cache.is_last_page_loaded,
            "Paging provider ready"
        );

        Ok(cache.loaded_count(self.page_size))
    }

    /// Return page `index`, fetching it if it is not cached yet.
    async fn load_page(self: &Arc<Self>, index: usize) -> PageResult<T> {
        let future = {
            let cache = self.read_cache();
            if let Some(page) = cache.pages.get(&index) {
                return Ok(Arc::clone(page));
            }

            let mut in_flight = self.lock_in_flight();
            match in_flight.get(&index) {
                Some(running) => {
                    Counters::bump(&self.counters.shared_loads);
                    debug!(provider = %self.id, index, "Joining in-flight page fetch");
                    running.future.clone()
                }
                None => {
                    let predecessor = index
                        .checked_sub(1)
                        .and_then(|prev| in_flight.get(&prev))
                        .map(|running| running.future.clone());

                    let expected = cache.max_loaded_page.map_or(0, |max| max + 1);
                    if predecessor.is_none() && index != expected {
                        let err = ProviderError::NonSequentialPage {
                            index,
                            max_loaded: cache.max_loaded_page,
                        };
                        error!(provider = %self.id, %err, "Page requested out of order");
                        return Err(err);
                    }

                    let fetch = PageFetch {
                        provider: Arc::downgrade(self),
                        source: Arc::clone(&self.source),
                        counters: Arc::clone(&self.counters),
                        id: self.id,
                        page_size: self.page_size,
                        index,
                        generation: cache.generation,
                    };
                    let future = fetch.run(predecessor).boxed().shared();
                    in_flight.insert(
                        index,
                        InFlight {
                            generation: cache.generation,
                            future: future.clone(),
                        },
                    );
                    future
                }
            }
        };

        future.await
    }

    /// Store a fetched page unless the cache was reset since the fetch started.
    fn commit_page(&self, index: usize, generation: u64, page: Page<T>) -> PageResult<T> {
        let mut cache = self.write_cache();
        if cache.generation != generation {
            debug!(provider = %self.id, index, "Discarding page from before re-initialization");
            return Err(ProviderError::Reset { index });
        }

        let old_size = cache.size(self.page_size);
        let stable = cache.loaded_count(self.page_size);
        let committed = cache.commit(index, page, self.page_size).map_err(|err| {
            if err.is_fatal() {
                error!(provider = %self.id, %err, "Page commit rejected");
            } else {
                debug!(provider = %self.id, %err, "Page past the end of the list discarded");
            }
            err
        })?;
        let new_size = cache.size(self.page_size);

        // Notify under the lock so batches leave in commit order.
        self.notifier.notify(ListChange::resize(stable, old_size, new_size));
        debug!(
            provider = %self.id,
            index,
            items = committed.len(),
            size = new_size,
            last_page_loaded = cache.is_last_page_loaded,
            "Committed page"
        );

        Ok(committed)
    }

    /// Size of the list once its final page is cached.
    fn final_size(&self) -> Option<usize> {
        let cache = self.read_cache();
        if cache.is_last_page_loaded {
            Some(cache.size(self.page_size))
        } else {
            None
        }
    }

    /// Forget the in-flight entry for `index` if it still belongs to `generation`.
    fn release(&self, index: usize, generation: u64) {
        let mut in_flight = self.lock_in_flight();
        if in_flight
            .get(&index)
            .is_some_and(|running| running.generation == generation)
        {
            in_flight.remove(&index);
        }
    }
}

type SharedPage<T> = Shared<BoxFuture<'static, PageResult<T>>>;

/// One page fetch, shared by every caller waiting on the same page.
///
/// Holds the provider weakly: the fetch lives in the provider's in-flight map,
/// so a strong reference would keep an abandoned provider alive.
struct PageFetch<T> {
    provider: Weak<Inner<T>>,
    source: Arc<dyn PageSource<T>>,
    counters: Arc<Counters>,
    id: Uuid,
    page_size: usize,
    index: usize,
    generation: u64,
}

impl<T> PageFetch<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn run(self, predecessor: Option<SharedPage<T>>) -> PageResult<T> {
        let result = self.fetch_and_commit(predecessor).await;
        if let Some(provider) = self.provider.upgrade() {
            provider.release(self.index, self.generation);
        }
        result
    }

    async fn fetch_and_commit(&self, predecessor: Option<SharedPage<T>>) -> PageResult<T> {
        let offset = self.index * self.page_size;
        if let Some(predecessor) = predecessor {
            predecessor.await?;
            // The page before may have turned out to be the last one.
            if let Some(size) = self.provider.upgrade().and_then(|provider| provider.final_size()) {
                debug!(provider = %self.id, index = self.index, size, "List ended before this page");
                return Err(ProviderError::OutOfRange {
                    position: offset,
                    size,
                });
            }
        }

        debug!(provider = %self.id, index = self.index, offset, "Fetching page");

        let page = match self.source.fetch_page(offset, self.page_size).await {
            Ok(page) => page,
            Err(source) => {
                Counters::bump(&self.counters.fetch_failures);
                warn!(provider = %self.id, index = self.index, error = %source, "Page fetch failed");
                return Err(ProviderError::fetch(offset, self.page_size, source));
            }
        };
        Counters::bump(&self.counters.pages_fetched);

        let provider = self
            .provider
            .upgrade()
            .ok_or(ProviderError::Reset { index: self.index })?;
        provider.commit_page(self.index, self.generation, page)
    }
}

/// Returns a bulk load that did not finish to `Uninitialized`.
struct InitGuard<'a, T: Clone + Send + Sync + 'static> {
    inner: &'a Inner<T>,
    generation: u64,
    armed: bool,
}

impl<T: Clone + Send + Sync + 'static> Drop for InitGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut cache = self.inner.write_cache();
        if cache.generation == self.generation && cache.state == LoadState::Initializing {
            cache.state = LoadState::Uninitialized;
        }
    }
}

/// [`ItemsProvider`] over a remote list fetched in fixed-size pages.
pub struct PagingListProvider<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for PagingListProvider<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PagingListProvider<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a provider with default settings. Must be called within a Tokio runtime.
    pub fn new(source: Arc<dyn PageSource<T>>) -> Self {
        Self::with_config(source, &ProviderConfig::default())
    }

    /// Create a provider. Must be called within a Tokio runtime.
    pub fn with_config(source: Arc<dyn PageSource<T>>, config: &ProviderConfig) -> Self {
        let inner = Inner {
            id: Uuid::new_v4(),
            source,
            page_size: config.page_size.max(1),
            range_window: config.range_window.max(1),
            cache: RwLock::new(PageCache::new()),
            in_flight: Mutex::new(HashMap::new()),
            init_gate: tokio::sync::Mutex::new(()),
            notifier: ChangeNotifier::new(),
            counters: Arc::default(),
        };
        debug!(provider = %inner.id, page_size = inner.page_size, "Created paging provider");
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Load the pages covering `load_to_position`, unless already initialized.
    ///
    /// Returns the number of items held after the load. Once initialized this
    /// returns immediately without fetching.
    pub async fn initialize(&self, load_to_position: usize) -> Result<usize, ProviderError> {
        let _gate = self.inner.init_gate.lock().await;
        {
            let cache = self.inner.read_cache();
            if cache.state == LoadState::Ready {
                return Ok(cache.loaded_count(self.inner.page_size));
            }
        }
        self.inner.bulk_load(load_to_position).await
    }

    /// Drop all cached pages and load again from the start.
    ///
    /// Page fetches still running from before the reset are discarded.
    pub async fn reinitialize(&self, load_to_position: usize) -> Result<usize, ProviderError> {
        let _gate = self.inner.init_gate.lock().await;
        self.inner.bulk_load(load_to_position).await
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    pub fn state(&self) -> LoadState {
        self.inner.read_cache().state
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == LoadState::Ready
    }

    /// Highest page index currently cached.
    pub fn max_loaded_page(&self) -> Option<usize> {
        self.inner.read_cache().max_loaded_page
    }

    pub fn is_last_page_loaded(&self) -> bool {
        self.inner.read_cache().is_last_page_loaded
    }

    /// Last total reported by the source.
    pub fn total_count(&self) -> Option<usize> {
        self.inner.read_cache().total_count
    }

    pub fn stats(&self) -> ProviderStats {
        self.inner.counters.snapshot()
    }
}

#[async_trait]
impl<T> ItemsProvider<T> for PagingListProvider<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get_item(&self, position: usize) -> Option<T> {
        self.inner.read_cache().get_item(position, self.inner.page_size)
    }

    async fn load_item(&self, position: usize) -> Result<T, ProviderError> {
        let page_size = self.inner.page_size;
        let index = {
            let cache = self.inner.read_cache();
            if cache.state != LoadState::Ready {
                error!(provider = %self.inner.id, position, "Provider should be initialized first");
                return Err(ProviderError::NotInitialized);
            }
            if let Some(item) = cache.get_item(position, page_size) {
                Counters::bump(&self.inner.counters.cache_hits);
                return Ok(item);
            }
            if cache.is_last_page_loaded {
                return Err(ProviderError::OutOfRange {
                    position,
                    size: cache.size(page_size),
                });
            }
            position / page_size
        };

        let page = self.inner.load_page(index).await.map_err(|err| match err {
            // A shared page fetch reports its own offset; report the caller's.
            ProviderError::OutOfRange { size, .. } => ProviderError::OutOfRange { position, size },
            other => other,
        })?;
        page.get(position % page_size)
            .cloned()
            .ok_or_else(|| ProviderError::OutOfRange {
                position,
                size: self.size(),
            })
    }

    fn size(&self) -> usize {
        self.inner.read_cache().size(self.inner.page_size)
    }

    fn observe_changes(&self) -> ChangeStream {
        self.inner.notifier.subscribe()
    }

    fn range_window(&self) -> usize {
        self.inner.range_window
    }
}
