/// Number of bits for a 4KB page size
#[cfg(not(feature = "page_size_2m"))]
pub const PAGE_SIZE_BITS: u32 = 12;

/// Number of bits for a 2MB huge page size
#[cfg(feature = "page_size_2m")]
pub const PAGE_SIZE_BITS: u32 = 21;

/// Size of a page in bytes
pub const PAGE_SIZE: usize = 1 << PAGE_SIZE_BITS;

/// Clears the page offset bits of an address.
pub const PAGE_MASK: u64 = !((1 << PAGE_SIZE_BITS) - 1);

/// Largest order accepted by the allocator, as in Linux 2.6 (`MAX_ORDER - 1`).
pub const MAX_ORDER: u32 = 10;

/// log2 of the number of page cache buckets.
pub const PAGE_CACHE_SHIFT: u32 = 10;
/// Number of page cache buckets.
pub const PAGE_CACHE_SIZE: usize = 1 << PAGE_CACHE_SHIFT;
/// Mask selecting a bucket from a page frame number.
pub const PAGE_CACHE_MASK: u64 = (1 << PAGE_CACHE_SHIFT) - 1;

/// Entry count used by the large hash table helper when the caller passes zero.
pub const DEFAULT_HASH_ENTRIES: usize = 1024;

/// Order of the buddy allocator backing the emulated provider.
pub(crate) const BUDDY_ORDER: usize = 32;

/// Default size of the emulated arena in bytes.
pub(crate) const DEFAULT_EMULATED_ARENA_SIZE: usize = 64 * 1024 * 1024;

/// Default physical base address of the emulated arena.
pub(crate) const DEFAULT_EMULATED_PHYS_BASE: u64 = 0x8000_0000;
