use std::{
    fs::File,
    io::{self, Read, Seek},
};

use parking_lot::Mutex;

/// Size of the PFN (Page Frame Number) mask in bytes
const PFN_MASK_SIZE: usize = 8;
/// PFN are bits 0-54 (see pagemap.txt in Linux Documentation)
const PFN_MASK: u64 = 0x007f_ffff_ffff_ffff;
/// Bit indicating if a page is present in memory
const PAGE_PRESENT_BIT: u8 = 63;
/// pagemap has one entry per base page, whatever size the allocator uses
const PAGEMAP_PAGE_BITS: u32 = 12;

/// Translates between virtual and physical addresses of the environment.
pub trait AddressTranslator {
    /// Converts a virtual address to a physical address.
    ///
    /// Returns `Ok(None)` if the address has no physical backing.
    fn virt_to_phys(&self, virt_addr: u64) -> io::Result<Option<u64>>;

    /// Converts a physical address back to the virtual address it is mapped at.
    ///
    /// Returns `Ok(None)` if no mapping of the address is known.
    fn phys_to_virt(&self, phys_addr: u64) -> io::Result<Option<u64>>;
}

impl<T: AddressTranslator + ?Sized> AddressTranslator for Box<T> {
    fn virt_to_phys(&self, virt_addr: u64) -> io::Result<Option<u64>> {
        (**self).virt_to_phys(virt_addr)
    }

    fn phys_to_virt(&self, phys_addr: u64) -> io::Result<Option<u64>> {
        (**self).phys_to_virt(phys_addr)
    }
}

/// Resolves host physical addresses through `/proc/self/pagemap`.
#[derive(Debug, Default)]
pub struct PagemapTranslator {
    /// Lazily opened pagemap handle
    pagemap: Mutex<Option<File>>,
}

impl PagemapTranslator {
    /// Creates a new `PagemapTranslator`
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(
        clippy::as_conversions,
        clippy::arithmetic_side_effects,
        clippy::host_endian_bytes
    )]
    fn read_entry(&self, virt_pfn: u64) -> io::Result<u64> {
        let mut guard = self.pagemap.lock();
        let file = match guard.take() {
            Some(file) => file,
            None => File::open("/proc/self/pagemap")?,
        };
        let file = guard.insert(file);
        let offset = PFN_MASK_SIZE as u64 * virt_pfn;
        let _pos = file.seek(io::SeekFrom::Start(offset))?;
        let mut buf = [0u8; PFN_MASK_SIZE];
        file.read_exact(&mut buf)?;
        Ok(u64::from_ne_bytes(buf))
    }
}

impl AddressTranslator for PagemapTranslator {
    #[allow(clippy::as_conversions, clippy::arithmetic_side_effects)]
    fn virt_to_phys(&self, virt_addr: u64) -> io::Result<Option<u64>> {
        let entry = self.read_entry(virt_addr >> PAGEMAP_PAGE_BITS)?;
        if entry >> PAGE_PRESENT_BIT & 1 == 0 {
            return Ok(None);
        }
        let phy_pfn = entry & PFN_MASK;
        Ok(Some(
            (phy_pfn << PAGEMAP_PAGE_BITS) + (virt_addr & ((1 << PAGEMAP_PAGE_BITS) - 1)),
        ))
    }

    fn phys_to_virt(&self, _phys_addr: u64) -> io::Result<Option<u64>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "pagemap cannot resolve physical to virtual addresses",
        ))
    }
}

/// Translates a window of virtual memory with a fixed offset, both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearTranslator {
    /// First virtual address of the window
    virt_base: u64,
    /// Physical address `virt_base` maps to
    phys_base: u64,
    /// Window length in bytes
    len: u64,
}

impl LinearTranslator {
    /// Creates a new `LinearTranslator`
    pub fn new(virt_base: u64, phys_base: u64, len: u64) -> Self {
        Self {
            virt_base,
            phys_base,
            len,
        }
    }
}

impl AddressTranslator for LinearTranslator {
    fn virt_to_phys(&self, virt_addr: u64) -> io::Result<Option<u64>> {
        Ok(virt_addr
            .checked_sub(self.virt_base)
            .filter(|offset| *offset < self.len)
            .and_then(|offset| self.phys_base.checked_add(offset)))
    }

    fn phys_to_virt(&self, phys_addr: u64) -> io::Result<Option<u64>> {
        Ok(phys_addr
            .checked_sub(self.phys_base)
            .filter(|offset| *offset < self.len)
            .and_then(|offset| self.virt_base.checked_add(offset)))
    }
}
