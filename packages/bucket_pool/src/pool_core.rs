use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::ptr::NonNull;

use tracing::Level;

use crate::{
    Bucket, BucketStatistics, PoolStatistics, RequestTracker, SizeClassTable, Validation,
};

/// The logic shared by both pool variants. Each variant wraps this in its own form of interior
/// mutability.
#[derive(Debug)]
pub(crate) struct PoolCore {
    /// One bucket per size class, in ascending item size order.
    buckets: Vec<Bucket>,

    /// `None` if the pool was built without request tracking.
    requests: Option<RequestTracker>,

    fallback_allocations: u64,
}

impl PoolCore {
    pub(crate) fn new(table: &SizeClassTable, validation: Validation, track_requests: bool) -> Self {
        let buckets = table
            .iter()
            .map(|definition| Bucket::new(definition, validation))
            .collect();

        Self {
            buckets,
            requests: track_requests.then(RequestTracker::new),
            fallback_allocations: 0,
        }
    }

    /// Selects the smallest size class that covers the size of `layout` and whose items are
    /// aligned at least as strictly as `layout` requires.
    fn bucket_index(&self, layout: Layout) -> Option<usize> {
        let first_covering = self
            .buckets
            .partition_point(|bucket| bucket.item_size() < layout.size());

        let offset = self
            .buckets
            .get(first_covering..)?
            .iter()
            .position(|bucket| bucket.item_align() >= layout.align())?;

        // Cannot overflow because the result is an index into `buckets`.
        Some(first_covering.wrapping_add(offset))
    }

    pub(crate) fn allocate(&mut self, layout: Layout) -> NonNull<u8> {
        assert!(
            layout.size() > 0,
            "memory pool cannot serve zero-sized allocation requests"
        );

        if let Some(requests) = &mut self.requests {
            requests.record_allocation(layout.size());
        }

        if let Some(bucket) = self
            .bucket_index(layout)
            .and_then(|index| self.buckets.get_mut(index))
        {
            return bucket.allocate();
        }

        self.fallback_allocations = self.fallback_allocations.saturating_add(1);

        // SAFETY: The layout has a non-zero size, asserted above.
        let ptr = unsafe { alloc(layout) };

        NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout))
    }

    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate()` on this core with the same `layout` and
    /// must not have been deallocated since.
    pub(crate) unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        assert!(
            layout.size() > 0,
            "memory pool cannot serve zero-sized allocation requests"
        );

        if let Some(requests) = &mut self.requests {
            requests.record_deallocation(layout.size());
        }

        if let Some(bucket) = self
            .bucket_index(layout)
            .and_then(|index| self.buckets.get_mut(index))
        {
            // SAFETY: The same layout selects the same bucket as at allocation time, so the
            // caller's guarantee carries over to the bucket.
            unsafe {
                bucket.deallocate(ptr);
            }

            return;
        }

        // SAFETY: No bucket covers this layout, so `allocate()` obtained the memory from the
        // system allocator with this same layout.
        unsafe {
            dealloc(ptr.as_ptr(), layout);
        }
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn bucket_statistics(&self, index: usize) -> Option<BucketStatistics> {
        self.buckets.get(index).map(Bucket::statistics)
    }

    pub(crate) fn statistics(&self) -> PoolStatistics {
        PoolStatistics::new(
            self.buckets.iter().map(Bucket::statistics).collect(),
            self.requests
                .as_ref()
                .map(RequestTracker::snapshot)
                .unwrap_or_default(),
            self.fallback_allocations,
        )
    }
}

impl Drop for PoolCore {
    #[cfg_attr(test, mutants::skip)] // Only logs.
    fn drop(&mut self) {
        // The buckets themselves are torn down after this, each applying its own leak rule.
        if tracing::enabled!(Level::INFO) {
            let statistics = self.statistics();

            tracing::info!(
                bucket_count = self.buckets.len(),
                total_memory = statistics.total_memory(),
                fallback_allocations = self.fallback_allocations,
                "memory pool released\n{statistics}"
            );
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn core_with_classes(sizes: &[usize]) -> PoolCore {
        let table = sizes
            .iter()
            .fold(SizeClassTable::builder(), |builder, &size| {
                builder.bucket(size, 4, 4, false)
            })
            .build();

        PoolCore::new(&table, Validation::Enabled, true)
    }

    #[test]
    fn routes_to_smallest_covering_class() {
        let core = core_with_classes(&[8, 16, 32]);

        let index = |size| core.bucket_index(Layout::from_size_align(size, 1).unwrap());

        assert_eq!(index(1), Some(0));
        assert_eq!(index(8), Some(0));
        assert_eq!(index(9), Some(1));
        assert_eq!(index(10), Some(1));
        assert_eq!(index(32), Some(2));
        assert_eq!(index(33), None);
    }

    #[test]
    fn alignment_skips_to_an_aligned_class() {
        let core = core_with_classes(&[12, 16, 24]);

        // 12 bytes only guarantees 4-byte alignment.
        let layout = Layout::from_size_align(10, 8).unwrap();
        assert_eq!(core.bucket_index(layout), Some(1));

        let layout = Layout::from_size_align(10, 32).unwrap();
        assert_eq!(core.bucket_index(layout), None);
    }

    #[test]
    fn fallback_is_counted_and_bypasses_buckets() {
        let mut core = core_with_classes(&[8, 16, 32]);
        let layout = Layout::from_size_align(64, 8).unwrap();

        let ptr = core.allocate(layout);
        assert_eq!(core.statistics().fallback_allocations(), 1);
        assert!(core.statistics().buckets().iter().all(|b| b.page_count() == 0));

        // SAFETY: Allocated above with the same layout.
        unsafe { core.deallocate(ptr, layout) };
        assert!(core.statistics().buckets().iter().all(|b| b.page_count() == 0));
    }

    #[test]
    fn requests_are_tracked_by_requested_size() {
        let mut core = core_with_classes(&[16]);
        let layout = Layout::from_size_align(10, 1).unwrap();

        let a = core.allocate(layout);
        let b = core.allocate(layout);

        // SAFETY: Allocated above with the same layout.
        unsafe { core.deallocate(a, layout) };

        let statistics = core.statistics();
        let request = statistics.requests().first().unwrap();
        assert_eq!(request.size(), 10);
        assert_eq!(request.total(), 2);
        assert_eq!(request.current(), 1);
        assert_eq!(request.max(), 2);

        // SAFETY: Allocated above with the same layout.
        unsafe { core.deallocate(b, layout) };
    }

    #[test]
    fn untracked_core_reports_no_requests() {
        let table = SizeClassTable::builder().bucket(16, 1, 1, false).build();
        let mut core = PoolCore::new(&table, Validation::Enabled, false);
        let layout = Layout::new::<u64>();

        let ptr = core.allocate(layout);
        assert!(core.statistics().requests().is_empty());

        // SAFETY: Allocated above with the same layout.
        unsafe { core.deallocate(ptr, layout) };
    }

    #[test]
    #[should_panic]
    fn zero_sized_request_panics() {
        let mut core = core_with_classes(&[8]);
        _ = core.allocate(Layout::new::<()>());
    }
}
