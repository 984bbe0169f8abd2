/// Host page provider
mod host;

/// Emulated page provider
mod emulated;

pub use emulated::EmulatedPageProvider;
pub use host::HostPageProvider;

use std::{io, sync::Arc};

use super::MemoryClass;

/// Source of raw, naturally aligned page blocks.
///
/// Blocks are requested in bytes; callers only ask for `PAGE_SIZE << order`
/// sized blocks and every granted block is aligned to its own size.
pub trait RawMemoryProvider {
    /// Reserves `size` bytes and returns the base virtual address.
    ///
    /// # Errors
    ///
    /// Returns an error of kind `OutOfMemory` if the request cannot be satisfied.
    fn alloc_pages_raw(&self, size: usize) -> io::Result<u64>;

    /// Releases a block previously returned by `alloc_pages_raw` with the same `size`.
    ///
    /// # Errors
    ///
    /// Returns an error if the block could not be released.
    fn free_pages_raw(&self, addr: u64, size: usize) -> io::Result<()>;

    /// Returns `true` if the provider can serve memory of `class`.
    fn supports(&self, class: MemoryClass) -> bool;
}

impl<P: RawMemoryProvider + ?Sized> RawMemoryProvider for Box<P> {
    fn alloc_pages_raw(&self, size: usize) -> io::Result<u64> {
        (**self).alloc_pages_raw(size)
    }

    fn free_pages_raw(&self, addr: u64, size: usize) -> io::Result<()> {
        (**self).free_pages_raw(addr, size)
    }

    fn supports(&self, class: MemoryClass) -> bool {
        (**self).supports(class)
    }
}

impl<P: RawMemoryProvider + ?Sized> RawMemoryProvider for Arc<P> {
    fn alloc_pages_raw(&self, size: usize) -> io::Result<u64> {
        (**self).alloc_pages_raw(size)
    }

    fn free_pages_raw(&self, addr: u64, size: usize) -> io::Result<()> {
        (**self).free_pages_raw(addr, size)
    }

    fn supports(&self, class: MemoryClass) -> bool {
        (**self).supports(class)
    }
}
