//! Basic benchmarks for the `intrusive_rc` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::rc::Rc;
use std::time::Instant;

use alloc_tracker::Allocator;
use bucket_pool::{ExclusivePool, MemoryPool, Validation};
use criterion::{Criterion, criterion_group, criterion_main};
use intrusive_rc::{RefCounted, Strong};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

struct Payload {
    _data: [u64; 4],
}

impl RefCounted for Payload {}

fn payload() -> Payload {
    Payload { _data: [0; 4] }
}

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("intrusive_rc_basic");

    let allocs_op = allocs.operation("new_drop_global");
    group.bench_function("new_drop_global", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(Strong::new(payload())));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("new_drop_pooled");
    group.bench_function("new_drop_pooled", |b| {
        b.iter_custom(|iters| {
            let pool: Rc<dyn MemoryPool> = Rc::new(
                ExclusivePool::builder()
                    .validation(Validation::Disabled)
                    .track_requests(false)
                    .build(),
            );

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(Strong::new_in(payload(), Rc::clone(&pool))));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("clone_drop");
    group.bench_function("clone_drop", |b| {
        b.iter_custom(|iters| {
            let strong = Strong::new(payload());

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(strong.clone()));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("downgrade_lock");
    group.bench_function("downgrade_lock", |b| {
        b.iter_custom(|iters| {
            let strong = Strong::new(payload());

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let weak = black_box(strong.downgrade());
                drop(black_box(weak.lock()));
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
