use std::sync::Arc;

use crate::{
    constants::{PAGE_SIZE, PAGE_SIZE_BITS},
    mem::MemoryClass,
};

/// Shared handle to a tracked page descriptor.
pub type PageRef = Arc<PageDescriptor>;

/// Stand-in for a Linux `struct page`, covering one whole allocation.
///
/// The virtual address is the first field so C code dereferencing
/// `page->virtual` reads it. An allocation of order > 0 is described by a
/// single descriptor; there is no descriptor for its following pages.
#[repr(C)]
#[derive(Debug, PartialEq, Eq)]
pub struct PageDescriptor {
    /// Page aligned base address of the allocation
    virt: u64,
    /// Order the allocation was requested with
    order: u32,
    /// Memory class the allocation was requested with
    class: MemoryClass,
}

impl PageDescriptor {
    pub(crate) fn new(virt: u64, order: u32, class: MemoryClass) -> Self {
        Self { virt, order, class }
    }

    /// Base virtual address of the allocation.
    pub fn virt(&self) -> u64 {
        self.virt
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn class(&self) -> MemoryClass {
        self.class
    }

    /// Number of pages covered by the allocation.
    pub fn num_pages(&self) -> usize {
        1 << self.order
    }

    /// Allocation size in bytes.
    #[allow(clippy::arithmetic_side_effects)]
    pub fn size(&self) -> usize {
        PAGE_SIZE << self.order
    }

    /// Returns `true` if `addr` lies inside the allocation.
    #[allow(clippy::as_conversions)]
    pub fn contains(&self, addr: u64) -> bool {
        addr.checked_sub(self.virt)
            .is_some_and(|offset| offset >> PAGE_SIZE_BITS < self.num_pages() as u64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn descriptor_geometry() {
        let page = PAGE_SIZE as u64;
        let desc = PageDescriptor::new(page * 8, 3, MemoryClass::Kernel);
        assert_eq!(desc.num_pages(), 8);
        assert_eq!(desc.size(), PAGE_SIZE * 8);
        assert!(desc.contains(page * 8));
        assert!(desc.contains(page * 16 - 1));
        assert!(!desc.contains(page * 16));
        assert!(!desc.contains(page * 8 - 1));
    }

    #[test]
    fn virtual_address_is_first_field() {
        let desc = PageDescriptor::new(0x1000, 0, MemoryClass::Kernel);
        let first = std::ptr::addr_of!(desc).cast::<u64>();
        #[allow(unsafe_code)]
        let virt = unsafe { *first };
        assert_eq!(virt, 0x1000);
    }
}
