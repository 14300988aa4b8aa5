//! Demonstrates configuring a memory pool, routing requests to size classes and reading
//! the pool statistics.
//!
//! Run with `cargo run --example bucket_pool_basic` to see the diagnostics the pool logs
//! when it grows, when it is misconfigured and when it is released.

use std::alloc::Layout;

use bucket_pool::{ExclusivePool, MemoryPool, PoolBox, SizeClassTable, Validation};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== bucket_pool basic example ===");
    println!();

    let table = SizeClassTable::builder()
        .bucket(16, 8, 4, true)
        .bucket(64, 8, 4, true)
        .bucket(256, 4, 2, false)
        // Rejected: a class of this size already exists. Logged and skipped.
        .bucket(64, 100, 100, false)
        .build();

    println!("Size classes:");
    for definition in &table {
        println!(
            "  {:>4} bytes: first page {} items, extra pages {} items, pre-warm {}",
            definition.item_size(),
            definition.first_page_item_count(),
            definition.extra_page_item_count(),
            definition.pre_warm_first_page()
        );
    }
    println!();

    let pool = ExclusivePool::builder()
        .size_classes(table)
        .validation(Validation::Enabled)
        .build();

    // 40 bytes rounds up to the 64-byte class. Ten of them outgrow its first page.
    let layout = Layout::from_size_align(40, 8).expect("valid layout");
    let blocks: Vec<_> = (0..10).map(|_| pool.allocate(layout)).collect();

    // 1 KiB exceeds every class and goes to the system allocator.
    let large = Layout::from_size_align(1024, 8).expect("valid layout");
    let large_block = pool.allocate(large);

    {
        let message = PoolBox::new_in(String::from("stored in pool memory"), &pool);
        println!("PoolBox value: {}", *message);
    }

    println!();
    println!("{}", pool.statistics());

    for block in blocks {
        // SAFETY: Allocated above with the same layout.
        unsafe { pool.deallocate(block, layout) };
    }

    // SAFETY: Allocated above with the same layout.
    unsafe { pool.deallocate(large_block, large) };

    pool.release();
}
