use std::{alloc::Layout, io, ptr::NonNull};

use buddy_system_allocator::Heap;
use parking_lot::Mutex;

use crate::{
    config::EmulatedConfig,
    constants::{BUDDY_ORDER, PAGE_SIZE},
    mem::{virt_to_phy::LinearTranslator, MemoryClass},
};

use super::RawMemoryProvider;

/// Anonymous mapping backing the emulated physical memory.
#[derive(Debug)]
struct Arena {
    /// Start of the mapping as returned by mmap
    map_addr: u64,
    /// Length of the mapping
    map_len: usize,
    /// First address of the aligned arena inside the mapping
    start: u64,
    /// Arena length in bytes, a power of two
    len: usize,
}

impl Arena {
    /// Maps an arena of `len` bytes aligned to `len`.
    #[allow(unsafe_code, clippy::as_conversions, clippy::arithmetic_side_effects)]
    fn new(len: usize) -> io::Result<Self> {
        let map_len = len
            .checked_mul(2)
            .ok_or(io::Error::from(io::ErrorKind::InvalidInput))?;
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let map_addr = ptr as u64;
        let align = len as u64;
        let start = (map_addr + align - 1) & !(align - 1);

        Ok(Self {
            map_addr,
            map_len,
            start,
            len,
        })
    }
}

impl Drop for Arena {
    #[allow(unsafe_code, clippy::as_conversions)]
    fn drop(&mut self) {
        let _ignore = unsafe { libc::munmap(self.map_addr as *mut libc::c_void, self.map_len) };
    }
}

/// A page provider carving naturally aligned blocks out of a private arena.
///
/// The arena stands in for the physical memory of the environment; its
/// `LinearTranslator` maps it onto `phys_base`.
pub struct EmulatedPageProvider {
    /// Buddy allocator over the arena
    heap: Mutex<Heap<BUDDY_ORDER>>,
    /// Backing memory, unmapped on drop
    arena: Arena,
    /// Physical address of the arena start
    phys_base: u64,
}

impl EmulatedPageProvider {
    /// Creates a new `EmulatedPageProvider` from its configuration.
    ///
    /// The arena size is rounded up to a power of two of at least one page.
    #[allow(unsafe_code, clippy::as_conversions)]
    pub fn new(config: &EmulatedConfig) -> io::Result<Self> {
        let len = config
            .arena_size
            .max(PAGE_SIZE)
            .checked_next_power_of_two()
            .ok_or(io::Error::from(io::ErrorKind::InvalidInput))?;
        let arena = Arena::new(len)?;
        let mut heap = Heap::<BUDDY_ORDER>::new();
        // SAFETY: the arena is mapped read-write, exclusively owned by this
        // provider and outlives the heap.
        unsafe { heap.init(arena.start as usize, arena.len) };
        log::debug!(
            "emulated arena at {:#x}, {} bytes, phys base {:#x}",
            arena.start,
            arena.len,
            config.phys_base
        );

        Ok(Self {
            heap: Mutex::new(heap),
            arena,
            phys_base: config.phys_base,
        })
    }

    /// Returns the translator matching this arena.
    #[allow(clippy::as_conversions)]
    pub fn translator(&self) -> LinearTranslator {
        LinearTranslator::new(self.arena.start, self.phys_base, self.arena.len as u64)
    }

    /// Number of bytes currently handed out.
    pub fn allocated_bytes(&self) -> usize {
        self.heap.lock().stats_alloc_actual()
    }

    fn layout(size: usize) -> io::Result<Layout> {
        let block = size
            .max(PAGE_SIZE)
            .checked_next_power_of_two()
            .ok_or(io::Error::from(io::ErrorKind::OutOfMemory))?;
        Layout::from_size_align(block, block)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
    }
}

impl RawMemoryProvider for EmulatedPageProvider {
    #[allow(clippy::as_conversions)]
    fn alloc_pages_raw(&self, size: usize) -> io::Result<u64> {
        let layout = Self::layout(size)?;
        self.heap
            .lock()
            .alloc(layout)
            .map(|ptr| ptr.as_ptr() as u64)
            .map_err(|()| io::Error::from(io::ErrorKind::OutOfMemory))
    }

    #[allow(clippy::as_conversions)]
    fn free_pages_raw(&self, addr: u64, size: usize) -> io::Result<()> {
        let layout = Self::layout(size)?;
        let end = self.arena.start.saturating_add(self.arena.len as u64);
        if addr < self.arena.start || addr >= end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "address outside of the emulated arena",
            ));
        }
        let ptr = NonNull::new(addr as *mut u8)
            .ok_or(io::Error::from(io::ErrorKind::InvalidInput))?;
        self.heap.lock().dealloc(ptr, layout);
        Ok(())
    }

    fn supports(&self, class: MemoryClass) -> bool {
        class != MemoryClass::Dma
    }
}
