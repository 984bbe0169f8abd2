use log::{debug, error, info};

use crate::{
    alloc::PageAllocator,
    constants::{DEFAULT_HASH_ENTRIES, PAGE_SIZE},
    mem::{get_order, page::RawMemoryProvider, virt_to_phy::AddressTranslator, MemoryClass},
};

/// Memory backing a boot time hash table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LargeHashTable {
    /// Base address of the untracked allocation
    pub addr: u64,
    /// Order of the allocation, release it with `free_raw(addr, order)`
    pub order: u32,
    /// Bytes needed by the granted number of entries
    pub size: usize,
    /// log2 of the granted number of entries
    pub hash_shift: u32,
    /// Granted number of entries minus one
    pub hash_mask: usize,
}

impl LargeHashTable {
    /// Number of entries the table was sized for.
    pub fn entries(&self) -> usize {
        1 << self.hash_shift
    }
}

impl<P, T> PageAllocator<P, T>
where
    P: RawMemoryProvider,
    T: AddressTranslator,
{
    /// Linux `alloc_large_system_hash`.
    ///
    /// Sizes a table for `num_entries` buckets of `bucket_size` bytes, rounded
    /// down to a power of two (1024 if zero), and halves the entry count until
    /// the provider grants the memory or the table fits a single page.
    ///
    /// # Panics
    ///
    /// Panics if not even a single page can be obtained; the environment
    /// cannot continue without the table.
    #[allow(clippy::arithmetic_side_effects)]
    pub fn alloc_large_system_hash(
        &self,
        table_name: &str,
        bucket_size: usize,
        num_entries: usize,
    ) -> LargeHashTable {
        let num_entries = if num_entries == 0 {
            DEFAULT_HASH_ENTRIES
        } else {
            num_entries
        };
        let mut log2qty = num_entries.ilog2();

        loop {
            let size = bucket_size.checked_mul(1 << log2qty).unwrap_or(usize::MAX);
            let order = get_order(size);
            match self.allocate_raw(MemoryClass::Atomic, order) {
                Ok(addr) => {
                    info!(
                        "{table_name} hash table entries: {} (order: {order}, {size} bytes)",
                        1usize << log2qty
                    );
                    return LargeHashTable {
                        addr,
                        order,
                        size,
                        hash_shift: log2qty,
                        hash_mask: (1 << log2qty) - 1,
                    };
                }
                Err(err) => {
                    debug!("{table_name} hash table of {size} bytes denied: {err}");
                    if size <= PAGE_SIZE {
                        break;
                    }
                    match log2qty.checked_sub(1) {
                        Some(next) if next > 0 => log2qty = next,
                        _ => break,
                    }
                }
            }
        }

        error!("Failed to allocate {table_name} hash table");
        panic!("Failed to allocate {table_name} hash table");
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::RemovePolicy,
        mock::{MockProvider, MockTranslator},
    };

    fn allocator(provider: &Arc<MockProvider>) -> PageAllocator<Arc<MockProvider>, MockTranslator> {
        PageAllocator::new(Arc::clone(provider), MockTranslator, RemovePolicy::Strict)
    }

    #[test]
    fn table_sized_for_requested_entries() {
        let provider = Arc::new(MockProvider::new(&[0x40_0000]));
        let table = allocator(&provider).alloc_large_system_hash("Dentry cache", 8, 1024);
        assert_eq!(table.addr, 0x40_0000);
        assert_eq!(table.hash_shift, 10);
        assert_eq!(table.hash_mask, 0x3ff);
        assert_eq!(table.size, 8192);
        assert_eq!(table.order, get_order(8192));
        assert_eq!(provider.requests(), vec![PAGE_SIZE << table.order]);
    }

    #[test]
    fn zero_entries_means_default() {
        let provider = Arc::new(MockProvider::new(&[0x40_0000]));
        let table = allocator(&provider).alloc_large_system_hash("Inode cache", 16, 0);
        assert_eq!(table.entries(), DEFAULT_HASH_ENTRIES);
    }

    #[test]
    fn entry_count_rounds_down_to_power_of_two() {
        let provider = Arc::new(MockProvider::new(&[0x40_0000]));
        let table = allocator(&provider).alloc_large_system_hash("PID", 8, 1500);
        assert_eq!(table.entries(), 1024);
    }

    #[test]
    fn shrinks_until_provider_grants() {
        let provider = Arc::new(MockProvider::with_max_size(&[0x40_0000], PAGE_SIZE));
        let table = allocator(&provider).alloc_large_system_hash("Mount", 8, PAGE_SIZE);
        assert_eq!(table.order, 0);
        assert_eq!(table.size, PAGE_SIZE);
        assert_eq!(table.entries(), PAGE_SIZE / 8);
        assert_eq!(table.hash_mask, PAGE_SIZE / 8 - 1);
        assert!(provider.requests().len() > 1);
    }

    #[test]
    #[should_panic(expected = "Failed to allocate TCP established hash table")]
    fn exhaustion_is_fatal() {
        let provider = Arc::new(MockProvider::new(&[]));
        let _table = allocator(&provider).alloc_large_system_hash("TCP established", 64, 4096);
    }

    #[test]
    #[should_panic(expected = "Failed to allocate Huge bucket hash table")]
    fn single_oversized_entry_denied_is_fatal() {
        let provider = Arc::new(MockProvider::with_max_size(&[0x40_0000], PAGE_SIZE));
        let _table = allocator(&provider).alloc_large_system_hash("Huge bucket", PAGE_SIZE * 4, 1);
    }
}
