use std::{io, ptr};

use log::{debug, trace, warn};

use crate::{
    cache::PageCache,
    config::RemovePolicy,
    constants::{MAX_ORDER, PAGE_MASK, PAGE_SIZE},
    descriptor::{PageDescriptor, PageRef},
    error::{PageError, Result},
    mem::{
        order_to_size, page::RawMemoryProvider, virt_to_phy::AddressTranslator, MemoryClass,
    },
};

/// Page allocator backed by trait objects, as built from a `PageConfig`.
pub type DynPageAllocator = PageAllocator<
    Box<dyn RawMemoryProvider + Send + Sync>,
    Box<dyn AddressTranslator + Send + Sync>,
>;

/// Lifts an adapter I/O error into a `PageError`.
fn adapter_error(err: io::Error, op: &'static str) -> PageError {
    match err.kind() {
        io::ErrorKind::OutOfMemory => PageError::OutOfMemory(err.to_string()),
        io::ErrorKind::Unsupported => PageError::Unimplemented(op),
        _ => PageError::IoError(err),
    }
}

/// Snapshot of the allocator's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStats {
    /// Number of live tracked allocations
    pub live_descriptors: usize,
    /// Bytes covered by live tracked allocations
    pub tracked_bytes: usize,
}

/// Linux style page allocation on top of a raw memory provider.
///
/// Tracked allocations get a descriptor registered in the page cache so the
/// descriptor can be recovered from any address inside its first page.
pub struct PageAllocator<P, T> {
    /// Live descriptors
    cache: PageCache,
    /// Source of raw memory
    provider: P,
    /// Virtual/physical translation of the environment
    translator: T,
    /// Handling of frees whose descriptor is not registered
    remove_policy: RemovePolicy,
}

impl<P, T> PageAllocator<P, T>
where
    P: RawMemoryProvider,
    T: AddressTranslator,
{
    /// Creates a new allocator with an empty page cache.
    pub fn new(provider: P, translator: T, remove_policy: RemovePolicy) -> Self {
        Self {
            cache: PageCache::new(),
            provider,
            translator,
            remove_policy,
        }
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn remove_policy(&self) -> RemovePolicy {
        self.remove_policy
    }

    /// Byte size of an allocation of `order`.
    fn checked_size(order: u32) -> Result<usize> {
        if order > MAX_ORDER {
            return Err(PageError::InvalidOrder {
                order,
                max: MAX_ORDER,
            });
        }
        order_to_size(order).ok_or(PageError::InvalidOrder {
            order,
            max: MAX_ORDER,
        })
    }

    /// Requests raw memory for `order` pages of `class`.
    ///
    /// # Panics
    ///
    /// Panics if the provider cannot serve `class`; handing out other memory
    /// would break the caller's assumptions about it.
    fn reserve(&self, class: MemoryClass, order: u32) -> Result<u64> {
        assert!(
            self.provider.supports(class),
            "memory class {class:?} cannot be served by the page provider"
        );
        let size = Self::checked_size(order)?;
        trace!("class={class:?} order={order} ({size} bytes)");
        self.provider.alloc_pages_raw(size).map_err(|err| {
            debug!("provider denied order {order} request: {err}");
            adapter_error(err, "alloc_pages_raw")
        })
    }

    /// Allocates `2^order` pages and tracks them with a descriptor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOrder` for orders above `MAX_ORDER` and `OutOfMemory`
    /// if the provider denies the request. Nothing is registered on failure.
    pub fn allocate_pages(&self, class: MemoryClass, order: u32) -> Result<PageRef> {
        let virt = self.reserve(class, order)?;
        let page = PageRef::new(PageDescriptor::new(virt, order, class));
        if let Some(stale) = self.cache.insert(PageRef::clone(&page)) {
            warn!(
                "provider returned {virt:#x} while it was still tracked with order {}",
                stale.order()
            );
        }
        Ok(page)
    }

    /// Allocates a single tracked page.
    pub fn alloc_page(&self, class: MemoryClass) -> Result<PageRef> {
        self.allocate_pages(class, 0)
    }

    /// Allocates `2^order` pages without tracking them.
    ///
    /// # Errors
    ///
    /// See `allocate_pages`.
    pub fn allocate_raw(&self, class: MemoryClass, order: u32) -> Result<u64> {
        self.reserve(class, order)
    }

    /// Allocates one untracked page filled with zeros.
    #[allow(unsafe_code, clippy::as_conversions)]
    pub fn allocate_zeroed(&self, class: MemoryClass) -> Result<u64> {
        let addr = self.allocate_raw(class, 0)?;
        // SAFETY: the provider granted PAGE_SIZE writable bytes at `addr` and
        // nobody else has seen the address yet.
        unsafe { ptr::write_bytes(addr as *mut u8, 0, PAGE_SIZE) };
        Ok(addr)
    }

    /// Releases a tracked allocation and unregisters its descriptor.
    ///
    /// # Errors
    ///
    /// - `OrderMismatch` if `order` differs from the allocation order; nothing
    ///   is released.
    /// - `NotFound` if `page` is no longer registered and the remove policy is
    ///   strict. A lenient policy logs and returns `Ok(())` instead. The
    ///   provider is not called in either case.
    /// - Errors of the provider's release.
    pub fn free_pages(&self, page: PageRef, order: u32) -> Result<()> {
        if page.order() != order {
            return Err(PageError::OrderMismatch {
                addr: page.virt(),
                allocated: page.order(),
                requested: order,
            });
        }
        let size = Self::checked_size(order)?;
        if !self.cache.remove_entry(&page) {
            return match self.remove_policy {
                RemovePolicy::Strict => Err(PageError::NotFound(page.virt())),
                RemovePolicy::Lenient => {
                    warn!("ignoring free of untracked page {:#x}", page.virt());
                    Ok(())
                }
            };
        }
        trace!("addr={:#x} order={order}", page.virt());
        self.provider
            .free_pages_raw(page.virt(), size)
            .map_err(|err| adapter_error(err, "free_pages_raw"))
    }

    /// Releases untracked memory obtained from `allocate_raw`.
    pub fn free_raw(&self, addr: u64, order: u32) -> Result<()> {
        let size = Self::checked_size(order)?;
        trace!("addr={addr:#x} order={order}");
        self.provider
            .free_pages_raw(addr, size)
            .map_err(|err| adapter_error(err, "free_pages_raw"))
    }

    /// Releases a single untracked page.
    pub fn free_page(&self, addr: u64) -> Result<()> {
        self.free_raw(addr, 0)
    }

    /// Finds the descriptor whose first page contains `addr`.
    pub fn lookup(&self, addr: u64) -> Option<PageRef> {
        self.cache.lookup(addr)
    }

    /// Linux `virt_to_page`.
    pub fn virt_to_page(&self, addr: u64) -> Option<PageRef> {
        self.lookup(addr)
    }

    /// Linux `page_address`.
    pub fn page_address(page: &PageDescriptor) -> u64 {
        page.virt()
    }

    /// Translates a virtual address to a physical address.
    ///
    /// # Errors
    ///
    /// Returns `NotMapped` if the translator knows no backing for `addr`.
    pub fn virt_to_phys(&self, addr: u64) -> Result<u64> {
        self.translator
            .virt_to_phys(addr)
            .map_err(|err| adapter_error(err, "virt_to_phys"))?
            .ok_or(PageError::NotMapped(addr))
    }

    /// Translates a physical address to the virtual address it is mapped at.
    ///
    /// # Errors
    ///
    /// Returns `NotMapped` if the translator knows no mapping of `phys_addr`,
    /// `Unimplemented` if the translator cannot translate in this direction.
    pub fn phys_to_virt(&self, phys_addr: u64) -> Result<u64> {
        self.translator
            .phys_to_virt(phys_addr)
            .map_err(|err| adapter_error(err, "phys_to_virt"))?
            .ok_or(PageError::NotMapped(phys_addr))
    }

    /// Physical address of the first page of `page`.
    pub fn page_to_phys(&self, page: &PageDescriptor) -> Result<u64> {
        self.virt_to_phys(page.virt()).map(|phys| phys & PAGE_MASK)
    }

    /// Returns a snapshot of the tracked allocations.
    pub fn stats(&self) -> PageStats {
        PageStats {
            live_descriptors: self.cache.len(),
            tracked_bytes: self.cache.tracked_bytes(),
        }
    }

    /// Linux `free_hot_page`.
    pub fn free_hot_page(&self, _page: &PageRef) -> Result<()> {
        Self::unimplemented("free_hot_page")
    }

    /// Linux `__pagevec_free`.
    pub fn pagevec_free(&self, _pages: &[PageRef]) -> Result<()> {
        Self::unimplemented("pagevec_free")
    }

    /// Linux `get_user_pages`.
    pub fn get_user_pages(&self, _start: u64, _num_pages: usize, _write: bool) -> Result<Vec<PageRef>> {
        Self::unimplemented("get_user_pages")
    }

    /// Linux `set_page_dirty_lock`.
    pub fn set_page_dirty_lock(&self, _page: &PageRef) -> Result<()> {
        Self::unimplemented("set_page_dirty_lock")
    }

    fn unimplemented<R>(op: &'static str) -> Result<R> {
        warn!("{op} is not implemented");
        Err(PageError::Unimplemented(op))
    }
}
