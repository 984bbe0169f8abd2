use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ddekit_pages::{
    config::EmulatedConfig,
    constants::PAGE_SIZE,
    mem::{page::EmulatedPageProvider, virt_to_phy::LinearTranslator},
    MemoryClass, PageAllocator, RemovePolicy,
};

fn emulated_allocator() -> PageAllocator<EmulatedPageProvider, LinearTranslator> {
    let config = EmulatedConfig {
        arena_size: PAGE_SIZE * 2048,
        phys_base: 0x8000_0000,
    };
    let provider = EmulatedPageProvider::new(&config).expect("failed to map arena");
    let translator = provider.translator();
    PageAllocator::new(provider, translator, RemovePolicy::Strict)
}

fn benchmark_lookup(c: &mut Criterion) {
    let allocator = emulated_allocator();
    let pages: Vec<_> = (0..1024)
        .map(|_| allocator.alloc_page(MemoryClass::Kernel).expect("allocation failed"))
        .collect();
    let addrs: Vec<u64> = pages.iter().map(|page| page.virt() + 0x10).collect();

    c.bench_function("page cache lookup 1024 addresses", |b| {
        b.iter(|| {
            for addr in &addrs {
                black_box(allocator.lookup(black_box(*addr)));
            }
        })
    });
}

fn benchmark_alloc_free(c: &mut Criterion) {
    let allocator = emulated_allocator();

    c.bench_function("allocate and free one page", |b| {
        b.iter(|| {
            let page = allocator
                .allocate_pages(MemoryClass::Kernel, black_box(0))
                .expect("allocation failed");
            allocator.free_pages(Arc::clone(&page), 0).expect("free failed");
        })
    });
}

criterion_group!(benches, benchmark_lookup, benchmark_alloc_free);
criterion_main!(benches);
