/// Tools for converting between virtual and physical addresses
pub mod virt_to_phy;

/// Raw page providers
pub mod page;

mod utils;

pub use utils::{get_order, order_to_size, page_align_down, page_align_up};
pub(crate) use utils::{pin_pages, unpin_pages};

/// GFP flag selecting DMA-capable memory
pub const GFP_DMA: u32 = 0x01;
/// GFP flag allowing the allocator to sleep
pub const GFP_WAIT: u32 = 0x10;
/// GFP flag allowing I/O during reclaim
pub const GFP_IO: u32 = 0x40;
/// GFP flag allowing filesystem calls during reclaim
pub const GFP_FS: u32 = 0x80;
/// GFP flag granting access to emergency pools
pub const GFP_HIGH: u32 = 0x20;
/// Linux `GFP_ATOMIC`
pub const GFP_ATOMIC: u32 = GFP_HIGH;
/// Linux `GFP_KERNEL`
pub const GFP_KERNEL: u32 = GFP_WAIT | GFP_IO | GFP_FS;

/// Memory class requested by a page allocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryClass {
    /// General purpose memory, the allocator may sleep
    #[default]
    Kernel,
    /// General purpose memory, the allocator must not sleep
    Atomic,
    /// Memory reachable by legacy DMA engines
    Dma,
}

impl MemoryClass {
    /// Decodes the class from a Linux 2.6 GFP mask.
    pub fn from_gfp(gfp_mask: u32) -> Self {
        if gfp_mask & GFP_DMA != 0 {
            Self::Dma
        } else if gfp_mask & GFP_WAIT == 0 {
            Self::Atomic
        } else {
            Self::Kernel
        }
    }
}
