use std::{iter, sync::Arc};

use parking_lot::RwLock;

use crate::{
    constants::{PAGE_CACHE_MASK, PAGE_CACHE_SIZE, PAGE_SIZE_BITS},
    descriptor::PageRef,
    mem::page_align_down,
};

/// Maps a virtual address to its page cache bucket.
#[allow(clippy::as_conversions)] // masked to PAGE_CACHE_SHIFT bits
#[inline]
fn bucket_index(addr: u64) -> usize {
    ((addr >> PAGE_SIZE_BITS) & PAGE_CACHE_MASK) as usize
}

/// Bucket array, chained on collision.
struct Buckets {
    slots: Box<[Vec<PageRef>]>,
    len: usize,
    /// Sum of the allocation sizes of all entries
    bytes: usize,
}

impl Buckets {
    fn slot(&self, addr: u64) -> &[PageRef] {
        match self.slots.get(bucket_index(addr)) {
            Some(slot) => slot,
            None => &[],
        }
    }

    fn slot_mut(&mut self, addr: u64) -> Option<&mut Vec<PageRef>> {
        self.slots.get_mut(bucket_index(addr))
    }
}

/// Directory of live page descriptors, keyed by page aligned virtual address.
///
/// Lookups take a shared lock and may run concurrently; insertions and
/// removals are serialized.
pub struct PageCache {
    buckets: RwLock<Buckets>,
}

impl PageCache {
    /// Creates a page cache with all buckets empty.
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(Buckets {
                slots: iter::repeat_with(Vec::new).take(PAGE_CACHE_SIZE).collect(),
                len: 0,
                bytes: 0,
            }),
        }
    }

    /// Registers `page` under its virtual address.
    ///
    /// # Returns
    ///
    /// The descriptor previously registered at the same address, if any. It is
    /// replaced so that an address never resolves to more than one descriptor.
    pub fn insert(&self, page: PageRef) -> Option<PageRef> {
        let key = page.virt();
        let size = page.size();
        log::trace!("page cache add {key:#x}, bucket {:#x}", bucket_index(key));
        let mut guard = self.buckets.write();
        let slot = guard.slot_mut(key)?;
        if let Some(entry) = slot.iter_mut().find(|entry| entry.virt() == key) {
            log::error!("page cache already holds a descriptor at {key:#x}, replacing it");
            let old = std::mem::replace(entry, page);
            guard.bytes = guard.bytes.saturating_sub(old.size()).saturating_add(size);
            return Some(old);
        }
        slot.push(page);
        guard.len = guard.len.saturating_add(1);
        guard.bytes = guard.bytes.saturating_add(size);
        None
    }

    /// Removes the descriptor registered at the page containing `addr`.
    ///
    /// # Returns
    ///
    /// The removed descriptor, or `None` if nothing was registered there.
    pub fn remove(&self, addr: u64) -> Option<PageRef> {
        let key = page_align_down(addr);
        self.remove_if(key, |entry| entry.virt() == key)
    }

    /// Removes `page` itself, not merely a descriptor at the same address.
    ///
    /// # Returns
    ///
    /// `false` if `page` was not registered.
    pub fn remove_entry(&self, page: &PageRef) -> bool {
        self.remove_if(page.virt(), |entry| Arc::ptr_eq(entry, page))
            .is_some()
    }

    fn remove_if<F>(&self, key: u64, matches: F) -> Option<PageRef>
    where
        F: Fn(&PageRef) -> bool,
    {
        let mut guard = self.buckets.write();
        let slot = guard.slot_mut(key)?;
        let pos = slot.iter().position(matches)?;
        let page = slot.swap_remove(pos);
        guard.len = guard.len.saturating_sub(1);
        guard.bytes = guard.bytes.saturating_sub(page.size());
        log::trace!("page cache remove {key:#x}");
        Some(page)
    }

    /// Looks up the descriptor registered at the page containing `addr`.
    pub fn lookup(&self, addr: u64) -> Option<PageRef> {
        let key = page_align_down(addr);
        self.buckets
            .read()
            .slot(key)
            .iter()
            .find(|entry| entry.virt() == key)
            .map(Arc::clone)
    }

    /// Returns `true` if a descriptor is registered at the page containing `addr`.
    pub fn contains(&self, addr: u64) -> bool {
        self.lookup(addr).is_some()
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.buckets.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total size in bytes of the allocations described by registered descriptors.
    pub fn tracked_bytes(&self) -> usize {
        self.buckets.read().bytes
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}
