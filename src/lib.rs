//! paging-list: on-demand paged access to remote lists.
//!
//! Callers address items by absolute position. A [`PagingListProvider`] fetches
//! fixed-size pages from a [`PageSource`] strictly in order, caches them, infers
//! the list size from what it has seen so far, and broadcasts a change batch to
//! observers whenever the cache grows or is reset.

pub mod config;
pub mod error;
pub mod listing;

pub use error::{FetchError, ProviderError};
pub use listing::change::{ChangeKind, ChangeStream, ListChange};
pub use listing::memory::MemorySource;
pub use listing::page::Page;
pub use listing::paging::{LoadState, PagingListProvider, ProviderStats};
pub use listing::provider::{load_range, ItemsProvider};
pub use listing::source::PageSource;
