//! Paged access to remote lists.
//!
//! - [`page`]: Page, the unit returned by a source
//! - [`source`]: PageSource, the fetch collaborator contract
//! - [`memory`]: MemorySource, an in-memory simulated source
//! - [`change`]: ListChange notifications and their serialized delivery
//! - [`provider`]: ItemsProvider contract and the windowed range loader
//! - [`paging`]: PagingListProvider, the sequential page cache

pub mod change;
pub mod memory;
pub mod page;
pub mod paging;
pub mod provider;
pub mod source;
