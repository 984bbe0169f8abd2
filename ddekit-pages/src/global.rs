//! Process-wide page allocator instance.

use std::sync::OnceLock;

use log::info;

use crate::{
    alloc::{DynPageAllocator, PageAllocator},
    config::{PageConfig, ProviderKind},
    error::{PageError, Result},
    mem::{
        page::{EmulatedPageProvider, HostPageProvider, RawMemoryProvider},
        virt_to_phy::{AddressTranslator, PagemapTranslator},
    },
};

static PAGE_ALLOCATOR: OnceLock<DynPageAllocator> = OnceLock::new();

/// Builds the provider and translator selected by `config`.
pub fn build(config: &PageConfig) -> Result<DynPageAllocator> {
    let (provider, translator): (
        Box<dyn RawMemoryProvider + Send + Sync>,
        Box<dyn AddressTranslator + Send + Sync>,
    ) = match config.provider {
        ProviderKind::Host => (
            Box::new(HostPageProvider::new(config.lock_pages)),
            Box::new(PagemapTranslator::new()),
        ),
        ProviderKind::Emulated => {
            let provider = EmulatedPageProvider::new(&config.emulated)?;
            let translator = provider.translator();
            (Box::new(provider), Box::new(translator))
        }
    };

    Ok(PageAllocator::new(provider, translator, config.remove_policy))
}

/// Initializes the process-wide allocator with an empty page cache.
///
/// # Errors
///
/// Returns `AlreadyInitialized` on every call after the first successful one.
pub fn init(config: &PageConfig) -> Result<()> {
    let _ignore = env_logger::try_init();
    if PAGE_ALLOCATOR.get().is_some() {
        return Err(PageError::AlreadyInitialized);
    }
    let allocator = build(config)?;
    PAGE_ALLOCATOR
        .set(allocator)
        .map_err(|_| PageError::AlreadyInitialized)?;
    info!("Initializing DDE Linux 2.6 page cache ({:?} provider)", config.provider);
    Ok(())
}

/// Returns the process-wide allocator.
///
/// # Errors
///
/// Returns `NotInitialized` if `init` has not completed.
pub fn get() -> Result<&'static DynPageAllocator> {
    PAGE_ALLOCATOR.get().ok_or(PageError::NotInitialized)
}
