use std::io;

use crate::constants::{PAGE_MASK, PAGE_SIZE, PAGE_SIZE_BITS};

/// Pins pages in memory to prevent swapping
///
/// # Errors
///
/// Returns an error if the pages could not be locked in memory
#[allow(unsafe_code, clippy::as_conversions)]
pub(crate) fn pin_pages(addr: u64, length: usize) -> io::Result<()> {
    let result = unsafe { libc::mlock(addr as *const libc::c_void, length) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Unpins pages
///
/// # Errors
///
/// Returns an error if the pages could not be unlocked
#[allow(unsafe_code, clippy::as_conversions)]
pub(crate) fn unpin_pages(addr: u64, length: usize) -> io::Result<()> {
    let result = unsafe { libc::munlock(addr as *const libc::c_void, length) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Size in bytes of an allocation of the given order.
///
/// Returns `None` if the size does not fit in `usize`.
#[inline]
pub fn order_to_size(order: u32) -> Option<usize> {
    PAGE_SIZE.checked_shl(order).filter(|size| size >> order == PAGE_SIZE)
}

/// Smallest order whose allocation covers `size` bytes.
#[inline]
pub fn get_order(size: usize) -> u32 {
    let pages = size.saturating_sub(1) >> PAGE_SIZE_BITS;
    usize::BITS - pages.leading_zeros()
}

/// Clears the page offset bits of `addr`.
#[inline]
pub fn page_align_down(addr: u64) -> u64 {
    addr & PAGE_MASK
}

/// Rounds `addr` up to the next page boundary.
#[inline]
pub fn page_align_up(addr: u64) -> u64 {
    page_align_down(addr.saturating_add(!PAGE_MASK))
}
