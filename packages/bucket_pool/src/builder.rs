use std::cell::Cell;
use std::marker::PhantomData;

use crate::{ExclusivePool, PoolCore, SharedPool, SizeClassTable, Validation};

/// Configures and creates a memory pool.
///
/// Created via [`ExclusivePool::builder()`] or [`SharedPool::builder()`]. Every setting is
/// optional.
///
/// # Examples
///
/// ```
/// use bucket_pool::{MemoryPool, SharedPool, SizeClassTable, Validation};
///
/// let pool = SharedPool::builder()
///     .size_classes(
///         SizeClassTable::builder()
///             .bucket(16, 64, 16, true)
///             .bucket(64, 32, 8, false)
///             .build(),
///     )
///     .validation(Validation::Disabled)
///     .track_requests(false)
///     .build();
///
/// assert_eq!(pool.bucket_count(), 2);
/// ```
#[derive(Debug)]
#[must_use]
pub struct PoolBuilder<P> {
    size_classes: Option<SizeClassTable>,
    validation: Validation,
    track_requests: bool,

    _pool: PhantomData<fn() -> P>,

    // Prevents Sync while allowing Send - builders are thread-mobile but not thread-safe.
    _not_sync: PhantomData<Cell<()>>,
}

impl<P> PoolBuilder<P> {
    pub(crate) fn new() -> Self {
        Self {
            size_classes: None,
            validation: Validation::default(),
            track_requests: true,
            _pool: PhantomData,
            _not_sync: PhantomData,
        }
    }

    /// Replaces the default size classes of the pool.
    ///
    /// An empty table is valid and sends every request to the system allocator.
    pub fn size_classes(mut self, table: SizeClassTable) -> Self {
        self.size_classes = Some(table);
        self
    }

    /// Sets whether the buckets of the pool check the addresses returned to them.
    ///
    /// Defaults to [`Validation::default()`].
    pub fn validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    /// Sets whether the pool counts requests by requested size.
    ///
    /// Enabled by default.
    pub fn track_requests(mut self, track_requests: bool) -> Self {
        self.track_requests = track_requests;
        self
    }

    fn into_core(self, default_table: fn() -> SizeClassTable) -> PoolCore {
        let table = self.size_classes.unwrap_or_else(default_table);
        PoolCore::new(&table, self.validation, self.track_requests)
    }
}

impl PoolBuilder<ExclusivePool> {
    /// Creates the pool, setting up one bucket per size class.
    ///
    /// Without explicit size classes, [`SizeClassTable::default_exclusive()`] is used.
    #[must_use]
    pub fn build(self) -> ExclusivePool {
        ExclusivePool::from_core(self.into_core(SizeClassTable::default_exclusive))
    }
}

impl PoolBuilder<SharedPool> {
    /// Creates the pool, setting up one bucket per size class.
    ///
    /// Without explicit size classes, [`SizeClassTable::default_shared()`] is used.
    #[must_use]
    pub fn build(self) -> SharedPool {
        SharedPool::from_core(self.into_core(SizeClassTable::default_shared))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(PoolBuilder<ExclusivePool>: Send, std::fmt::Debug);
    assert_impl_all!(PoolBuilder<SharedPool>: Send, std::fmt::Debug);
    assert_not_impl_any!(PoolBuilder<SharedPool>: Sync);

    #[test]
    fn builder_new_creates_default_state() {
        let builder = PoolBuilder::<SharedPool>::new();

        assert!(builder.size_classes.is_none());
        assert_eq!(builder.validation, Validation::default());
        assert!(builder.track_requests);
    }

    #[test]
    fn settings_are_recorded() {
        let table = SizeClassTable::builder().bucket(8, 1, 1, false).build();

        let builder = PoolBuilder::<ExclusivePool>::new()
            .size_classes(table.clone())
            .validation(Validation::Disabled)
            .track_requests(false);

        assert_eq!(builder.size_classes, Some(table));
        assert_eq!(builder.validation, Validation::Disabled);
        assert!(!builder.track_requests);
    }

    #[test]
    fn default_tables_are_used_when_unset() {
        let exclusive = PoolBuilder::<ExclusivePool>::new().build();
        assert_eq!(
            exclusive.bucket_count(),
            SizeClassTable::default_exclusive().len()
        );

        let shared = PoolBuilder::<SharedPool>::new().build();
        assert_eq!(shared.bucket_count(), SizeClassTable::default_shared().len());
    }
}
