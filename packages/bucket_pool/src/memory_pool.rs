use std::alloc::Layout;
use std::ptr::NonNull;

use crate::PoolStatistics;

/// An allocator of fixed-size blocks routed by size class.
///
/// A request is served by the smallest size class whose item size covers the requested size
/// and whose items are sufficiently aligned. Requests no size class can serve go to the system
/// allocator. No metadata is stored alongside a block, so the caller must supply the same
/// layout when deallocating as when allocating.
///
/// This trait is implemented by [`ExclusivePool`][crate::ExclusivePool] for single-threaded use
/// and by [`SharedPool`][crate::SharedPool] for use from many threads. Both behave identically
/// apart from their thread safety. The trait is object-safe, so code that only needs
/// allocation can hold a `&dyn MemoryPool` or `Rc<dyn MemoryPool>`.
pub trait MemoryPool {
    /// Allocates a block that satisfies `layout`.
    ///
    /// The block is uninitialized. Allocation never fails: buckets grow on demand and a failure
    /// of the system allocator is reported via [`std::alloc::handle_alloc_error`].
    ///
    /// # Panics
    ///
    /// Panics if `layout` has a size of zero.
    #[must_use]
    fn allocate(&self, layout: Layout) -> NonNull<u8>;

    /// Returns a block to the pool.
    ///
    /// # Panics
    ///
    /// Panics if `layout` has a size of zero. If the pool validates deallocations, also panics
    /// if the block is foreign to the size class or already free.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate()`][Self::allocate] on this same pool with
    /// the same `layout` and must not have been deallocated since. The block must not be
    /// accessed afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// A snapshot of the pool's counters.
    #[must_use]
    fn statistics(&self) -> PoolStatistics;

    /// Allocates an uninitialized block suitable for a `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    #[must_use]
    fn allocate_for<T>(&self) -> NonNull<T>
    where
        Self: Sized,
    {
        self.allocate(Layout::new::<T>()).cast()
    }

    /// Returns a block obtained from [`allocate_for()`][Self::allocate_for].
    ///
    /// Any value in the block is not dropped.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate_for::<T>()` on this same pool and must not
    /// have been deallocated since.
    unsafe fn deallocate_for<T>(&self, ptr: NonNull<T>)
    where
        Self: Sized,
    {
        // SAFETY: Forwarding the caller's guarantee, with the layout used by `allocate_for()`.
        unsafe {
            self.deallocate(ptr.cast(), Layout::new::<T>());
        }
    }
}
