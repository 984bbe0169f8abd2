use std::{collections::BTreeMap, sync::Arc};

use ddekit_pages::{global, DynPageAllocator, PageDescriptor, PageRef};
use log::error;
use parking_lot::Mutex;

/// Descriptors C currently holds a `struct page *` to, keyed by pointer value.
///
/// An entry lives from `__alloc_pages` until the matching successful
/// `__free_pages`, so a pointer is only dereferenced while its entry exists.
static HANDLES: Mutex<BTreeMap<usize, PageRef>> = Mutex::new(BTreeMap::new());

/// Returns the process-wide allocator, logging if it is missing.
pub(crate) fn allocator() -> Option<&'static DynPageAllocator> {
    match global::get() {
        Ok(allocator) => Some(allocator),
        Err(err) => {
            error!("page allocator unavailable: {err}");
            None
        }
    }
}

/// Pointer handed to C as `struct page *`.
pub(crate) fn page_ptr(page: &PageRef) -> *mut PageDescriptor {
    Arc::as_ptr(page).cast_mut()
}

/// Records that C holds `page` and returns the pointer to give it.
pub(crate) fn hand_out(page: PageRef) -> *mut PageDescriptor {
    let ptr = page_ptr(&page);
    let _replaced = HANDLES.lock().insert(ptr.addr(), page);
    ptr
}

/// Finds the descriptor behind a pointer C holds, without dereferencing it.
///
/// Returns `None` for NULL, for pointers this library never handed out and
/// for pointers already released.
pub(crate) fn handle(page: *const PageDescriptor) -> Option<PageRef> {
    HANDLES.lock().get(&page.addr()).map(Arc::clone)
}

/// Forgets the pointer once its allocation is released.
pub(crate) fn release(page: *const PageDescriptor) {
    let _released = HANDLES.lock().remove(&page.addr());
}

/// Returns `true` if `page` itself is the cache entry of its address.
pub(crate) fn is_cached(allocator: &DynPageAllocator, page: &PageRef) -> bool {
    allocator
        .lookup(page.virt())
        .is_some_and(|found| Arc::ptr_eq(&found, page))
}
