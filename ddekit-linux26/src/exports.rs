//! Linux 2.6 page allocator entry points

use core::ffi::{c_char, c_int, c_uint, c_ulong, c_void};
use std::{borrow::Cow, ffi::CStr, ptr};

use ddekit_pages::{MemoryClass, PageDescriptor, PageError, RemovePolicy};
use log::{debug, error, trace, warn};

use crate::dde::imp::{allocator, hand_out, handle, release};

#[allow(clippy::as_conversions)]
fn to_ulong(addr: u64) -> c_ulong {
    addr as c_ulong
}

/// Allocate `2^order` pages and return their descriptor.
///
/// Returns NULL on failure. The zonelist is ignored.
#[unsafe(export_name = "__alloc_pages")]
pub extern "C" fn __alloc_pages(gfp_mask: c_uint, order: c_uint, _zonelist: *mut c_void) -> *mut PageDescriptor {
    let Some(allocator) = allocator() else {
        return ptr::null_mut();
    };
    match allocator.allocate_pages(MemoryClass::from_gfp(gfp_mask), order) {
        Ok(page) => hand_out(page),
        Err(err) => {
            debug!("__alloc_pages(gfp={gfp_mask:#x}, order={order}) failed: {err}");
            ptr::null_mut()
        }
    }
}

/// Allocate `2^order` untracked pages and return their address, 0 on failure.
#[unsafe(export_name = "__get_free_pages")]
pub extern "C" fn __get_free_pages(gfp_mask: c_uint, order: c_uint) -> c_ulong {
    let Some(allocator) = allocator() else {
        return 0;
    };
    match allocator.allocate_raw(MemoryClass::from_gfp(gfp_mask), order) {
        Ok(addr) => to_ulong(addr),
        Err(err) => {
            debug!("__get_free_pages(gfp={gfp_mask:#x}, order={order}) failed: {err}");
            0
        }
    }
}

/// Allocate one untracked page filled with zeros, 0 on failure.
#[unsafe(export_name = "get_zeroed_page")]
pub extern "C" fn get_zeroed_page(gfp_mask: c_uint) -> c_ulong {
    let Some(allocator) = allocator() else {
        return 0;
    };
    match allocator.allocate_zeroed(MemoryClass::from_gfp(gfp_mask)) {
        Ok(addr) => to_ulong(addr),
        Err(err) => {
            debug!("get_zeroed_page(gfp={gfp_mask:#x}) failed: {err}");
            0
        }
    }
}

/// Release pages obtained from `__alloc_pages`.
///
/// Pointers that were already released or never handed out are reported
/// according to the remove policy and left alone.
#[unsafe(export_name = "__free_pages")]
pub extern "C" fn __free_pages(page: *mut PageDescriptor, order: c_uint) {
    let Some(allocator) = allocator() else {
        return;
    };
    if page.is_null() {
        return;
    }
    let Some(descriptor) = handle(page) else {
        match allocator.remove_policy() {
            RemovePolicy::Strict => error!("__free_pages({page:p}): page is not live"),
            RemovePolicy::Lenient => warn!("ignoring free of unknown page {page:p}"),
        }
        return;
    };
    match allocator.free_pages(descriptor, order) {
        Ok(()) => release(page),
        Err(err) => error!("__free_pages({page:p}, order={order}) failed: {err}"),
    }
}

/// Release untracked pages obtained from `__get_free_pages` or `get_zeroed_page`.
#[unsafe(export_name = "free_pages")]
pub extern "C" fn free_pages(addr: c_ulong, order: c_uint) {
    let Some(allocator) = allocator() else {
        return;
    };
    if addr == 0 {
        return;
    }
    if let Err(err) = allocator.free_raw(u64::from(addr), order) {
        error!("free_pages({addr:#x}, order={order}) failed: {err}");
    }
}

/// Not implemented, logs and leaves the page alone.
#[unsafe(export_name = "free_hot_page")]
pub extern "C" fn free_hot_page(page: *mut PageDescriptor) {
    let Some(allocator) = allocator() else {
        return;
    };
    if let Some(page) = handle(page) {
        let _ = allocator.free_hot_page(&page);
    }
}

/// Not implemented, logs and leaves the vector alone.
#[unsafe(export_name = "__pagevec_free")]
pub extern "C" fn __pagevec_free(_pvec: *mut c_void) {
    if let Some(allocator) = allocator() {
        let _ = allocator.pagevec_free(&[]);
    }
}

/// Not implemented, returns `-ENOSYS`.
#[unsafe(export_name = "get_user_pages")]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn get_user_pages(
    _tsk: *mut c_void,
    _mm: *mut c_void,
    start: c_ulong,
    len: c_int,
    write: c_int,
    _force: c_int,
    _pages: *mut *mut PageDescriptor,
    _vmas: *mut *mut c_void,
) -> c_int {
    let Some(allocator) = allocator() else {
        return PageError::NotInitialized.to_errno();
    };
    let num_pages = usize::try_from(len).unwrap_or(0);
    match allocator.get_user_pages(u64::from(start), num_pages, write != 0) {
        Ok(pages) => c_int::try_from(pages.len()).unwrap_or(c_int::MAX),
        Err(err) => err.to_errno(),
    }
}

/// Not implemented, returns `-ENOSYS`, or `-ENOENT` for a page that is not live.
#[unsafe(export_name = "set_page_dirty_lock")]
pub extern "C" fn set_page_dirty_lock(page: *mut PageDescriptor) -> c_int {
    let Some(allocator) = allocator() else {
        return PageError::NotInitialized.to_errno();
    };
    let Some(descriptor) = handle(page) else {
        return PageError::NotFound(page.addr() as u64).to_errno();
    };
    match allocator.set_page_dirty_lock(&descriptor) {
        Ok(()) => 0,
        Err(err) => err.to_errno(),
    }
}

/// Physical address of the first page of `page`, 0 if it cannot be resolved.
#[unsafe(export_name = "page_to_phys")]
pub extern "C" fn page_to_phys(page: *const PageDescriptor) -> c_ulong {
    let Some(allocator) = allocator() else {
        return 0;
    };
    let Some(descriptor) = handle(page) else {
        return 0;
    };
    match allocator.page_to_phys(&descriptor) {
        Ok(phys) => to_ulong(phys),
        Err(err) => {
            warn!("page_to_phys({:#x}) failed: {err}", descriptor.virt());
            0
        }
    }
}

/// Linux `__pa`, 0 if `virt` is not backed.
#[unsafe(export_name = "__physical_address")]
pub extern "C" fn __physical_address(virt: *const c_void) -> c_ulong {
    let Some(allocator) = allocator() else {
        return 0;
    };
    match allocator.virt_to_phys(virt.addr() as u64) {
        Ok(phys) => to_ulong(phys),
        Err(err) => {
            warn!("__pa({virt:p}) failed: {err}");
            0
        }
    }
}

/// Linux `__va`, NULL if `phys` is not mapped.
#[unsafe(export_name = "__virtual_address")]
pub extern "C" fn __virtual_address(phys: c_ulong) -> *mut c_void {
    let Some(allocator) = allocator() else {
        return ptr::null_mut();
    };
    match allocator.phys_to_virt(u64::from(phys)) {
        Ok(virt) => ptr::with_exposed_provenance_mut(virt as usize),
        Err(err) => {
            warn!("__va({phys:#x}) failed: {err}");
            ptr::null_mut()
        }
    }
}

/// Allocate memory for a boot time hash table.
///
/// `scale`, `flags` and `limit` are ignored. Aborts if not even one page
/// can be obtained.
///
/// # Safety
///
/// `tablename` must be NULL or a NUL terminated string. `hash_shift` and
/// `hash_mask` must be NULL or valid for writes.
#[unsafe(export_name = "alloc_large_system_hash")]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn alloc_large_system_hash(
    tablename: *const c_char,
    bucketsize: c_ulong,
    numentries: c_ulong,
    _scale: c_int,
    _flags: c_int,
    hash_shift: *mut c_uint,
    hash_mask: *mut c_uint,
    _limit: c_ulong,
) -> *mut c_void {
    let Some(allocator) = allocator() else {
        return ptr::null_mut();
    };
    let name = if tablename.is_null() {
        Cow::Borrowed("unnamed")
    } else {
        unsafe { CStr::from_ptr(tablename) }.to_string_lossy()
    };
    let bucket_size = usize::try_from(bucketsize).unwrap_or(usize::MAX);
    let num_entries = usize::try_from(numentries).unwrap_or(usize::MAX);
    let table = allocator.alloc_large_system_hash(&name, bucket_size, num_entries);
    trace!("{name} hash table at {:#x}", table.addr);

    if let Some(shift) = unsafe { hash_shift.as_mut() } {
        *shift = table.hash_shift;
    }
    if let Some(mask) = unsafe { hash_mask.as_mut() } {
        *mask = c_uint::try_from(table.hash_mask).unwrap_or(c_uint::MAX);
    }
    ptr::with_exposed_provenance_mut(table.addr as usize)
}

#[cfg(test)]
mod test {
    use ddekit_pages::{
        constants::PAGE_SIZE,
        mem::{GFP_ATOMIC, GFP_KERNEL},
    };

    use super::*;
    use crate::dde::cache_ops::{init, page_lookup};

    #[test]
    fn alloc_and_free_tracked_pages() {
        assert_eq!(init(), 0);
        let page = __alloc_pages(GFP_KERNEL, 1, ptr::null_mut());
        assert!(!page.is_null());
        let descriptor = unsafe { &*page };
        assert_eq!(descriptor.order(), 1);
        assert_eq!(descriptor.virt() % (PAGE_SIZE as u64 * 2), 0);
        assert_eq!(page_lookup(to_ulong(descriptor.virt() + PAGE_SIZE as u64 - 1)), page);
        assert_eq!(page_to_phys(ptr::null()), 0);
        let phys: c_ulong = page_to_phys(page);
        assert_eq!(phys % PAGE_SIZE as c_ulong, 0);
        __free_pages(page, 1);
    }

    #[test]
    fn double_free_is_detected_without_touching_the_descriptor() {
        assert_eq!(init(), 0);
        let page = __alloc_pages(GFP_KERNEL, 0, ptr::null_mut());
        assert!(!page.is_null());
        assert!(handle(page).is_some());
        __free_pages(page, 0);
        assert!(handle(page).is_none());

        __free_pages(page, 0);
        assert_eq!(set_page_dirty_lock(page), -libc::ENOENT);
        assert_eq!(page_to_phys(page), 0);
        free_hot_page(page);
    }

    #[test]
    fn order_mismatch_keeps_page_live() {
        assert_eq!(init(), 0);
        let page = __alloc_pages(GFP_KERNEL, 2, ptr::null_mut());
        assert!(!page.is_null());
        __free_pages(page, 1);
        assert!(handle(page).is_some());
        assert_eq!(page_lookup(to_ulong(unsafe { (*page).virt() })), page);
        __free_pages(page, 2);
        assert!(handle(page).is_none());
    }

    #[test]
    fn invalid_order_fails_cleanly() {
        assert_eq!(init(), 0);
        assert!(__alloc_pages(GFP_KERNEL, 11, ptr::null_mut()).is_null());
        assert_eq!(__get_free_pages(GFP_ATOMIC, 11), 0);
    }

    #[test]
    fn zeroed_page_is_zero() {
        assert_eq!(init(), 0);
        let addr = get_zeroed_page(GFP_KERNEL);
        assert_ne!(addr, 0);
        let bytes = unsafe { std::slice::from_raw_parts(addr as *const u8, PAGE_SIZE) };
        assert!(bytes.iter().all(|byte| *byte == 0));
        assert!(page_lookup(addr).is_null());
        free_pages(addr, 0);
    }

    #[test]
    fn stubs_report_enosys() {
        assert_eq!(init(), 0);
        let page = __alloc_pages(GFP_KERNEL, 0, ptr::null_mut());
        assert!(!page.is_null());
        assert_eq!(set_page_dirty_lock(page), -libc::ENOSYS);
        let ret = get_user_pages(
            ptr::null_mut(),
            ptr::null_mut(),
            0x1000,
            1,
            1,
            0,
            ptr::null_mut(),
            ptr::null_mut(),
        );
        assert_eq!(ret, -libc::ENOSYS);
        free_hot_page(page);
        __pagevec_free(ptr::null_mut());
        assert!(handle(page).is_some());
        __free_pages(page, 0);
    }

    #[test]
    fn large_hash_reports_geometry() {
        assert_eq!(init(), 0);
        let mut shift = 0;
        let mut mask = 0;
        let table = unsafe {
            alloc_large_system_hash(c"Dentry cache".as_ptr(), 8, 512, 0, 0, &mut shift, &mut mask, 0)
        };
        assert!(!table.is_null());
        assert_eq!(shift, 9);
        assert_eq!(mask, 511);
        free_pages(table.addr() as c_ulong, 0);
    }
}
