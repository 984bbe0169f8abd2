use core::ffi::{c_int, c_ulong};
use ddekit_pages::{global, ConfigLoader, PageDescriptor, PageError};
use log::{debug, error, trace, warn};

use super::imp::{allocator, handle, is_cached, page_ptr};

#[ctor::ctor]
unsafe fn load() {
    let _ = env_logger::try_init();
    if let Err(err) = init_from_config() {
        error!("page cache initialization failed: {err}");
    }
}

fn init_from_config() -> Result<(), PageError> {
    let config = ConfigLoader::load_or_default()?;
    match global::init(&config) {
        Err(PageError::AlreadyInitialized) => {
            debug!("page cache already initialized");
            Ok(())
        }
        result => result,
    }
}

/// Initializes the page cache. Safe to call after the load-time constructor ran.
///
/// Returns 0 on success or a negative errno.
#[unsafe(export_name = "ddekit_pages_init")]
pub extern "C" fn init() -> c_int {
    let _ = env_logger::try_init();
    match init_from_config() {
        Ok(()) => 0,
        Err(err) => {
            error!("page cache initialization failed: {err}");
            err.to_errno()
        }
    }
}

/// Registers `page` in the page cache again after `dde_linux26_page_cache_remove`.
///
/// Registering an already registered descriptor does nothing; pointers this
/// library did not hand out are ignored.
#[unsafe(export_name = "dde_linux26_page_cache_add")]
pub extern "C" fn cache_add(page: *mut PageDescriptor) {
    let Some(allocator) = allocator() else {
        return;
    };
    let Some(page) = handle(page) else {
        warn!("refusing to cache unknown page {page:p}");
        return;
    };
    if is_cached(allocator, &page) {
        trace!("page {:#x} already cached", page.virt());
        return;
    }
    trace!("caching page {:#x}", page.virt());
    if let Some(replaced) = allocator.cache().insert(page) {
        warn!("page {:p} displaced from the cache", page_ptr(&replaced));
    }
}

/// Unregisters `page` from the page cache. The descriptor stays valid for the caller.
///
/// Removing a descriptor that is not registered does nothing.
#[unsafe(export_name = "dde_linux26_page_cache_remove")]
pub extern "C" fn cache_remove(page: *mut PageDescriptor) {
    let Some(allocator) = allocator() else {
        return;
    };
    let Some(page) = handle(page) else {
        trace!("page {page:p} not handed out");
        return;
    };
    if allocator.cache().remove_entry(&page) {
        trace!("uncached page {:#x}", page.virt());
    }
}

/// Looks up the descriptor whose first page contains `va`.
///
/// Returns NULL if no allocation starts in that page.
#[unsafe(export_name = "dde_linux26_page_lookup")]
pub extern "C" fn page_lookup(va: c_ulong) -> *mut PageDescriptor {
    let Some(allocator) = allocator() else {
        return std::ptr::null_mut();
    };
    match allocator.lookup(u64::from(va)) {
        Some(page) => page_ptr(&page),
        None => {
            trace!("no page cached for {va:#x}");
            std::ptr::null_mut()
        }
    }
}
