use std::alloc::Layout;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::{BucketStatistics, MemoryPool, PoolBuilder, PoolCore, PoolStatistics};

/// A memory pool for use from a single thread, without any locking.
///
/// The pool can neither be sent to nor shared with another thread, so every call is made from
/// the thread that created it. Use [`SharedPool`][crate::SharedPool] if blocks must be
/// allocated from several threads.
///
/// Dropping the pool (or calling [`release()`][Self::release]) logs its statistics and tears
/// down every bucket. A bucket that still has items in use leaks its pages rather than
/// releasing them.
///
/// # Examples
///
/// ```
/// use std::alloc::Layout;
///
/// use bucket_pool::{ExclusivePool, MemoryPool};
///
/// let pool = ExclusivePool::new();
///
/// let layout = Layout::new::<[u64; 4]>();
/// let block = pool.allocate(layout);
///
/// // SAFETY: The block came from this pool with the same layout.
/// unsafe { pool.deallocate(block, layout) };
///
/// pool.release();
/// ```
#[derive(Debug)]
pub struct ExclusivePool {
    core: RefCell<PoolCore>,

    // Pins the pool to the thread that created it.
    _single_threaded: PhantomData<*const ()>,
}

impl ExclusivePool {
    /// Creates a pool with the [default exclusive size classes][crate::SizeClassTable::default_exclusive].
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
            core: RefCell::new(core),
            _single_threaded: PhantomData,
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
        self.core.borrow().bucket_count()
    }

    /// Counters of the bucket at `index` in ascending item size order, if the index is in
    /// bounds.
    #[must_use]
    pub fn bucket_statistics(&self, index: usize) -> Option<BucketStatistics> {
        self.core.borrow().bucket_statistics(index)
    }
}

impl Default for ExclusivePool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool for ExclusivePool {
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        self.core.borrow_mut().allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding the caller's guarantee.
        unsafe {
            self.core.borrow_mut().deallocate(ptr, layout);
        }
    }

    fn statistics(&self) -> PoolStatistics {
        self.core.borrow().statistics()
    }
}
