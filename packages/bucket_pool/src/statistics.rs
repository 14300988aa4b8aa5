use std::fmt;

use foldhash::{HashMap, HashMapExt};

/// A snapshot of the counters of one bucket.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BucketStatistics {
    item_size: usize,
    page_count: usize,
    total_items: usize,
    free_items: usize,
}

impl BucketStatistics {
    pub(crate) const fn new(
        item_size: usize,
        page_count: usize,
        total_items: usize,
        free_items: usize,
    ) -> Self {
        Self {
            item_size,
            page_count,
            total_items,
            free_items,
        }
    }

    /// Size in bytes of every item in the bucket.
    #[must_use]
    pub const fn item_size(&self) -> usize {
        self.item_size
    }

    /// Number of pages the bucket has allocated.
    #[must_use]
    pub const fn page_count(&self) -> usize {
        self.page_count
    }

    /// Number of items across all pages.
    #[must_use]
    pub const fn total_items(&self) -> usize {
        self.total_items
    }

    /// Number of items available for allocation.
    #[must_use]
    pub const fn free_items(&self) -> usize {
        self.free_items
    }

    /// Number of items handed out and not yet returned.
    #[must_use]
    pub const fn used_items(&self) -> usize {
        self.total_items.saturating_sub(self.free_items)
    }

    /// Bytes of item storage across all pages.
    #[must_use]
    pub const fn total_memory(&self) -> usize {
        self.total_items.saturating_mul(self.item_size)
    }
}

/// Counters for all requests of one requested size, regardless of which bucket served them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RequestStatistics {
    size: usize,
    total: u64,
    current: u64,
    max: u64,
}

impl RequestStatistics {
    /// The requested size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of allocations of this size over the lifetime of the pool.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Number of allocations of this size not yet deallocated.
    #[must_use]
    pub const fn current(&self) -> u64 {
        self.current
    }

    /// Highest value `current` has reached.
    #[must_use]
    pub const fn max(&self) -> u64 {
        self.max
    }
}

/// A snapshot of the counters of a whole memory pool.
///
/// The [`Display`][fmt::Display] form is a multi-line summary suitable for logs.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolStatistics {
    buckets: Vec<BucketStatistics>,
    requests: Vec<RequestStatistics>,
    fallback_allocations: u64,
}

impl PoolStatistics {
    pub(crate) const fn new(
        buckets: Vec<BucketStatistics>,
        requests: Vec<RequestStatistics>,
        fallback_allocations: u64,
    ) -> Self {
        Self {
            buckets,
            requests,
            fallback_allocations,
        }
    }

    /// Per-bucket counters, in ascending item size order.
    #[must_use]
    pub fn buckets(&self) -> &[BucketStatistics] {
        &self.buckets
    }

    /// Per-size request counters, in ascending size order.
    ///
    /// Empty if the pool does not track requests.
    #[must_use]
    pub fn requests(&self) -> &[RequestStatistics] {
        &self.requests
    }

    /// Number of allocations that no bucket could serve and that went to the system allocator.
    #[must_use]
    pub const fn fallback_allocations(&self) -> u64 {
        self.fallback_allocations
    }

    /// Bytes of item storage across all buckets.
    #[must_use]
    pub fn total_memory(&self) -> usize {
        self.buckets
            .iter()
            .map(BucketStatistics::total_memory)
            .fold(0, usize::saturating_add)
    }
}

impl fmt::Display for PoolStatistics {
    #[cfg_attr(test, mutants::skip)] // Cosmetic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "memory pool: {} bytes in {} buckets, {} fallback allocations",
            self.total_memory(),
            self.buckets.len(),
            self.fallback_allocations
        )?;

        for bucket in &self.buckets {
            writeln!(
                f,
                "  bucket {:>6} B: {:>4} pages, {:>8} items, {:>8} used",
                bucket.item_size,
                bucket.page_count,
                bucket.total_items,
                bucket.used_items()
            )?;
        }

        for request in &self.requests {
            writeln!(
                f,
                "  request {:>6} B: total {}, current {}, max {}",
                request.size, request.total, request.current, request.max
            )?;
        }

        Ok(())
    }
}

/// Counts allocation requests by requested size.
#[derive(Debug, Default)]
pub(crate) struct RequestTracker {
    by_size: HashMap<usize, RequestStatistics>,
}

impl RequestTracker {
    pub(crate) fn new() -> Self {
        Self {
            by_size: HashMap::new(),
        }
    }

    pub(crate) fn record_allocation(&mut self, size: usize) {
        let entry = self.by_size.entry(size).or_insert(RequestStatistics {
            size,
            total: 0,
            current: 0,
            max: 0,
        });

        entry.total = entry.total.saturating_add(1);
        entry.current = entry.current.saturating_add(1);
        entry.max = entry.max.max(entry.current);
    }

    pub(crate) fn record_deallocation(&mut self, size: usize) {
        let Some(entry) = self.by_size.get_mut(&size).filter(|entry| entry.current > 0) else {
            tracing::warn!(
                size,
                "deallocation of a size with no outstanding allocation, statistics unchanged"
            );
            return;
        };

        // Cannot underflow, checked above.
        entry.current = entry.current.wrapping_sub(1);
    }

    /// Snapshot of all counters in ascending size order.
    pub(crate) fn snapshot(&self) -> Vec<RequestStatistics> {
        let mut requests: Vec<_> = self.by_size.values().copied().collect();
        requests.sort_unstable_by_key(RequestStatistics::size);
        requests
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(PoolStatistics: Send, Sync, Clone, std::fmt::Debug, fmt::Display);
    assert_impl_all!(BucketStatistics: Send, Sync, Copy);
    assert_impl_all!(RequestStatistics: Send, Sync, Copy);

    #[test]
    fn tracker_counts_total_current_and_max() {
        let mut tracker = RequestTracker::new();

        tracker.record_allocation(10);
        tracker.record_allocation(10);
        tracker.record_deallocation(10);
        tracker.record_allocation(10);
        tracker.record_allocation(3);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 2);

        let small = snapshot.first().unwrap();
        assert_eq!(small.size(), 3);
        assert_eq!(small.total(), 1);

        let ten = snapshot.get(1).unwrap();
        assert_eq!(ten.size(), 10);
        assert_eq!(ten.total(), 3);
        assert_eq!(ten.current(), 2);
        assert_eq!(ten.max(), 2);
    }

    #[test]
    fn unmatched_deallocation_leaves_counters_unchanged() {
        let mut tracker = RequestTracker::new();

        tracker.record_deallocation(8);
        assert!(tracker.snapshot().is_empty());

        tracker.record_allocation(8);
        tracker.record_deallocation(8);
        tracker.record_deallocation(8);

        let entry = *tracker.snapshot().first().unwrap();
        assert_eq!(entry.current(), 0);
        assert_eq!(entry.total(), 1);
        assert_eq!(entry.max(), 1);
    }

    #[test]
    fn bucket_statistics_derived_values() {
        let stats = BucketStatistics::new(32, 2, 12, 5);

        assert_eq!(stats.used_items(), 7);
        assert_eq!(stats.total_memory(), 384);
    }

    #[test]
    fn pool_statistics_display_mentions_every_bucket() {
        let stats = PoolStatistics::new(
            vec![
                BucketStatistics::new(8, 1, 4, 4),
                BucketStatistics::new(16, 1, 4, 3),
            ],
            Vec::new(),
            2,
        );

        assert_eq!(stats.total_memory(), 96);

        let text = stats.to_string();
        assert!(text.contains("2 buckets"));
        assert!(text.contains("2 fallback allocations"));
        assert_eq!(text.lines().count(), 3);
    }
}
