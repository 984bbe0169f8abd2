//! Scripted collaborators for unit tests.

use std::{collections::VecDeque, io};

use parking_lot::Mutex;

use crate::mem::{page::RawMemoryProvider, virt_to_phy::AddressTranslator, MemoryClass};

/// Provider handing out a fixed sequence of addresses without backing memory.
///
/// Requests beyond the script fail with `OutOfMemory`.
#[derive(Debug, Default)]
pub(crate) struct MockProvider {
    addrs: Mutex<VecDeque<u64>>,
    requests: Mutex<Vec<usize>>,
    freed: Mutex<Vec<(u64, usize)>>,
    /// Largest request that can be granted
    max_size: Option<usize>,
}

impl MockProvider {
    pub(crate) fn new(addrs: &[u64]) -> Self {
        Self {
            addrs: Mutex::new(addrs.iter().copied().collect()),
            ..Self::default()
        }
    }

    /// Denies every request larger than `max_size` bytes.
    pub(crate) fn with_max_size(addrs: &[u64], max_size: usize) -> Self {
        Self {
            max_size: Some(max_size),
            ..Self::new(addrs)
        }
    }

    /// Sizes of all requests, granted or not.
    pub(crate) fn requests(&self) -> Vec<usize> {
        self.requests.lock().clone()
    }

    pub(crate) fn freed(&self) -> Vec<(u64, usize)> {
        self.freed.lock().clone()
    }
}

impl RawMemoryProvider for MockProvider {
    fn alloc_pages_raw(&self, size: usize) -> io::Result<u64> {
        self.requests.lock().push(size);
        if self.max_size.is_some_and(|max| size > max) {
            return Err(io::ErrorKind::OutOfMemory.into());
        }
        self.addrs
            .lock()
            .pop_front()
            .ok_or(io::ErrorKind::OutOfMemory.into())
    }

    fn free_pages_raw(&self, addr: u64, size: usize) -> io::Result<()> {
        self.freed.lock().push((addr, size));
        Ok(())
    }

    fn supports(&self, class: MemoryClass) -> bool {
        class != MemoryClass::Dma
    }
}

/// Offset of the mock physical address space
const MOCK_PHYS_OFFSET: u64 = 0x1_0000_0000;

/// Translator mapping every address into a shifted physical space, one way only.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct MockTranslator;

impl AddressTranslator for MockTranslator {
    fn virt_to_phys(&self, virt_addr: u64) -> io::Result<Option<u64>> {
        Ok(virt_addr.checked_add(MOCK_PHYS_OFFSET))
    }

    fn phys_to_virt(&self, _phys_addr: u64) -> io::Result<Option<u64>> {
        Err(io::ErrorKind::Unsupported.into())
    }
}
