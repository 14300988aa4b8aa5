use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::Mutex;

use crate::{BucketStatistics, MemoryPool, PoolBuilder, PoolCore, PoolStatistics};

const ERR_POISONED_LOCK: &str = "encountered poisoned lock - program validity cannot be guaranteed";

/// A memory pool that can be used from any number of threads.
///
/// Every operation takes a single lock around the whole pool, so contention grows with the
/// total call rate across all size classes. Prefer [`ExclusivePool`][crate::ExclusivePool]
/// for pools used from one thread.
///
/// Dropping the pool (or calling [`release()`][Self::release]) logs its statistics and tears
/// down every bucket. A bucket that still has items in use leaks its pages rather than
/// releasing them.
///
/// # Examples
///
/// ```
/// use std::alloc::Layout;
/// use std::sync::Arc;
/// use std::thread;
///
/// use bucket_pool::{MemoryPool, SharedPool};
///
/// let pool = Arc::new(SharedPool::new());
///
/// let worker = thread::spawn({
///     let pool = Arc::clone(&pool);
///     move || {
///         let layout = Layout::new::<u128>();
///         let block = pool.allocate(layout);
///
///         // SAFETY: The block came from this pool with the same layout.
///         unsafe { pool.deallocate(block, layout) };
///     }
/// });
///
/// worker.join().unwrap();
/// ```
#[derive(Debug)]
pub struct SharedPool {
    core: Mutex<PoolCore>,
}

impl SharedPool {
    /// Creates a pool with the [default shared size classes][crate::SizeClassTable::default_shared].
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring a pool.
    pub fn builder() -> PoolBuilder<Self> {
        PoolBuilder::new()
    }

    pub(crate) fn from_core(core: PoolCore) -> Self {
        Self {
            core: Mutex::new(core),
        }
    }

    /// Tears down the pool. Equivalent to dropping it.
    #[cfg_attr(test, mutants::skip)] // Equivalent to drop.
    pub fn release(self) {
        drop(self);
    }

    /// Number of size classes, each served by one bucket.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.core.lock().expect(ERR_POISONED_LOCK).bucket_count()
    }

    /// Counters of the bucket at `index` in ascending item size order, if the index is in
    /// bounds.
    #[must_use]
    pub fn bucket_statistics(&self, index: usize) -> Option<BucketStatistics> {
        self.core
            .lock()
            .expect(ERR_POISONED_LOCK)
            .bucket_statistics(index)
    }
}

impl Default for SharedPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool for SharedPool {
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        self.core.lock().expect(ERR_POISONED_LOCK).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let mut core = self.core.lock().expect(ERR_POISONED_LOCK);

        // SAFETY: Forwarding the caller's guarantee.
        unsafe {
            core.deallocate(ptr, layout);
        }
    }

    fn statistics(&self) -> PoolStatistics {
        self.core.lock().expect(ERR_POISONED_LOCK).statistics()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::{SizeClassTable, Validation};

    assert_impl_all!(SharedPool: Send, Sync, std::fmt::Debug, Default);

    #[test]
    fn size_64_falls_back_when_classes_end_at_32() {
        let pool = SharedPool::builder()
            .size_classes(
                SizeClassTable::builder()
                    .bucket(8, 4, 2, false)
                    .bucket(16, 4, 2, false)
                    .bucket(32, 4, 2, false)
                    .build(),
            )
            .build();

        let layout = Layout::from_size_align(64, 8).unwrap();
        let ptr = pool.allocate(layout);

        // SAFETY: Allocated above with the same layout.
        unsafe { pool.deallocate(ptr, layout) };

        let statistics = pool.statistics();
        assert_eq!(statistics.fallback_allocations(), 1);
        assert!(statistics.buckets().iter().all(|b| b.page_count() == 0));
    }

    #[test]
    fn concurrent_use_keeps_counts_consistent() {
        let pool = Arc::new(
            SharedPool::builder()
                .size_classes(SizeClassTable::builder().bucket(32, 16, 16, false).build())
                .validation(Validation::Enabled)
                .build(),
        );

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let layout = Layout::from_size_align(24, 8).unwrap();
                    let blocks: Vec<_> = (0..50).map(|_| pool.allocate(layout)).collect();

                    for block in blocks {
                        // SAFETY: Allocated above with the same layout.
                        unsafe { pool.deallocate(block, layout) };
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        let bucket = pool.bucket_statistics(0).unwrap();
        assert_eq!(bucket.used_items(), 0);
        assert_eq!(bucket.free_items(), bucket.total_items());

        let request = *pool.statistics().requests().first().unwrap();
        assert_eq!(request.total(), 200);
        assert_eq!(request.current(), 0);
    }
}
