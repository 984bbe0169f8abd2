use std::{io, ptr};

use crate::mem::{pin_pages, unpin_pages, MemoryClass};

use super::RawMemoryProvider;

/// Alignment anonymous mmap guarantees
const MMAP_ALIGN: usize = 4096;

/// A page provider for allocating anonymous host memory
#[derive(Debug, Default, Clone, Copy)]
pub struct HostPageProvider {
    /// Pin granted pages with `mlock`
    lock_pages: bool,
}

impl HostPageProvider {
    /// Creates a new `HostPageProvider`
    pub fn new(lock_pages: bool) -> Self {
        Self { lock_pages }
    }

    /// Maps `len` bytes of anonymous memory.
    #[allow(unsafe_code, clippy::as_conversions)]
    fn map(len: usize) -> io::Result<u64> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(ptr as u64)
    }

    #[allow(unsafe_code, clippy::as_conversions)]
    fn unmap(addr: u64, len: usize) -> io::Result<()> {
        if len == 0 {
            return Ok(());
        }
        if unsafe { libc::munmap(addr as *mut libc::c_void, len) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Maps `size` bytes aligned to `size`.
    ///
    /// mmap only guarantees base page alignment, so larger blocks are carved
    /// out of a mapping twice the requested size and the excess is unmapped.
    fn reserve_aligned(size: usize) -> io::Result<u64> {
        if size <= MMAP_ALIGN {
            return Self::map(size);
        }
        let span = size
            .checked_mul(2)
            .ok_or(io::Error::from(io::ErrorKind::OutOfMemory))?;
        let raw = Self::map(span)?;
        Self::trim(raw, span, size, Self::unmap)
    }

    /// Unmaps the parts of `[raw, raw + span)` around the `size` aligned block.
    ///
    /// Nothing of the span stays mapped if trimming fails.
    #[allow(clippy::as_conversions, clippy::arithmetic_side_effects)]
    fn trim<F>(raw: u64, span: usize, size: usize, unmap: F) -> io::Result<u64>
    where
        F: Fn(u64, usize) -> io::Result<()>,
    {
        let align = size as u64;
        let start = (raw + align - 1) & !(align - 1);
        let head = (start - raw) as usize;
        let tail = span - head - size;
        if let Err(err) = unmap(raw, head) {
            let _ignore = unmap(start, span - head);
            return Err(err);
        }
        if let Err(err) = unmap(start + align, tail) {
            let _ignore = unmap(start, size);
            return Err(err);
        }
        Ok(start)
    }
}

impl RawMemoryProvider for HostPageProvider {
    fn alloc_pages_raw(&self, size: usize) -> io::Result<u64> {
        let addr = Self::reserve_aligned(size).map_err(|err| {
            log::warn!("host mapping of {size} bytes failed: {err}");
            io::Error::new(io::ErrorKind::OutOfMemory, err)
        })?;
        if self.lock_pages {
            if let Err(err) = pin_pages(addr, size) {
                let _ignore = Self::unmap(addr, size);
                return Err(err);
            }
        }
        Ok(addr)
    }

    fn free_pages_raw(&self, addr: u64, size: usize) -> io::Result<()> {
        if self.lock_pages {
            unpin_pages(addr, size)?;
        }
        Self::unmap(addr, size)
    }

    fn supports(&self, class: MemoryClass) -> bool {
        class != MemoryClass::Dma
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;

    use super::*;
    use crate::constants::PAGE_SIZE;

    #[test]
    fn host_alloc_free_single_page() {
        let provider = HostPageProvider::new(false);
        let addr = provider.alloc_pages_raw(PAGE_SIZE).unwrap();
        assert_eq!(addr % PAGE_SIZE as u64, 0);
        provider.free_pages_raw(addr, PAGE_SIZE).unwrap();
    }

    #[test]
    fn host_blocks_are_naturally_aligned() {
        let provider = HostPageProvider::new(false);
        for order in 1..4 {
            let size = PAGE_SIZE << order;
            let addr = provider.alloc_pages_raw(size).unwrap();
            assert_eq!(addr % size as u64, 0, "order {order} block misaligned");
            provider.free_pages_raw(addr, size).unwrap();
        }
    }

    #[test]
    fn host_single_page_is_page_aligned() {
        let provider = HostPageProvider::new(false);
        let addrs: Vec<_> = (0..8)
            .map(|_| provider.alloc_pages_raw(PAGE_SIZE).unwrap())
            .collect();
        for addr in addrs {
            assert_eq!(addr % PAGE_SIZE as u64, 0);
            provider.free_pages_raw(addr, PAGE_SIZE).unwrap();
        }
    }

    #[test]
    fn trim_keeps_aligned_block() {
        let calls = RefCell::new(Vec::new());
        let size = 0x4000;
        let start = HostPageProvider::trim(0x1_1000, size * 2, size, |addr, len| {
            calls.borrow_mut().push((addr, len));
            Ok(())
        })
        .unwrap();
        assert_eq!(start, 0x1_4000);
        assert_eq!(calls.into_inner(), vec![(0x1_1000, 0x3000), (0x1_8000, 0x1000)]);
    }

    #[test]
    fn failed_head_trim_unmaps_everything() {
        let calls = RefCell::new(Vec::new());
        let size = 0x4000;
        let err = HostPageProvider::trim(0x1_1000, size * 2, size, |addr, len| {
            calls.borrow_mut().push((addr, len));
            if addr == 0x1_1000 {
                return Err(io::Error::from_raw_os_error(libc::EINVAL));
            }
            Ok(())
        })
        .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
        assert_eq!(calls.into_inner(), vec![(0x1_1000, 0x3000), (0x1_4000, 0x5000)]);
    }

    #[test]
    fn failed_tail_trim_unmaps_block() {
        let calls = RefCell::new(Vec::new());
        let size = 0x4000;
        let err = HostPageProvider::trim(0x1_1000, size * 2, size, |addr, len| {
            calls.borrow_mut().push((addr, len));
            if addr == 0x1_8000 {
                return Err(io::Error::from_raw_os_error(libc::EINVAL));
            }
            Ok(())
        })
        .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
        assert_eq!(
            calls.into_inner(),
            vec![(0x1_1000, 0x3000), (0x1_8000, 0x1000), (0x1_4000, 0x4000)]
        );
    }

    #[test]
    fn host_rejects_dma() {
        let provider = HostPageProvider::default();
        assert!(provider.supports(MemoryClass::Kernel));
        assert!(provider.supports(MemoryClass::Atomic));
        assert!(!provider.supports(MemoryClass::Dma));
    }
}
