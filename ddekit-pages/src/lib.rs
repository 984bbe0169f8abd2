//! Page tracking for Linux drivers running on DDE kit memory.
//!
//! Drivers written against the Linux 2.6 page allocator expect a `struct page`
//! for every allocation and expect to get it back from a bare virtual address.
//! This crate keeps a hash indexed cache of page descriptors over memory taken
//! from a raw provider, and translates between virtual and physical addresses.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

/// Page allocation facade
pub mod alloc;
/// Page descriptor cache
pub mod cache;
pub mod config;
pub mod constants;
/// Page descriptors
pub mod descriptor;
pub mod error;
pub mod global;
/// Boot time hash table sizing
pub mod hash_table;
/// Raw memory providers and address translation
pub mod mem;

#[cfg(test)]
mod mock;

pub use alloc::{DynPageAllocator, PageAllocator, PageStats};
pub use cache::PageCache;
pub use config::{ConfigError, ConfigLoader, PageConfig, ProviderKind, RemovePolicy};
pub use descriptor::{PageDescriptor, PageRef};
pub use error::{PageError, Result};
pub use hash_table::LargeHashTable;
pub use mem::MemoryClass;
