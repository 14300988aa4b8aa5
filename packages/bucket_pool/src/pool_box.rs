use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

use crate::MemoryPool;

/// An owned value whose storage comes from a [`MemoryPool`] instead of the global allocator.
///
/// This is the pool counterpart of [`Box`]: the value lives at a stable address until the
/// `PoolBox` is dropped, at which point the value is dropped and its block is returned to the
/// pool it came from. The borrow of the pool guarantees the pool outlives the value.
///
/// # Examples
///
/// ```
/// use bucket_pool::{ExclusivePool, PoolBox};
///
/// let pool = ExclusivePool::new();
///
/// let mut greeting = PoolBox::new_in(String::from("Hello"), &pool);
/// greeting.push_str(", world");
/// assert_eq!(*greeting, "Hello, world");
///
/// let inner = PoolBox::into_inner(greeting);
/// assert_eq!(inner, "Hello, world");
/// ```
pub struct PoolBox<'p, T, P: MemoryPool + ?Sized> {
    ptr: NonNull<T>,
    pool: &'p P,

    // Drop check: we own a T.
    _owns: PhantomData<T>,
}

impl<'p, T, P: MemoryPool + ?Sized> PoolBox<'p, T, P> {
    /// Moves `value` into a block allocated from `pool`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    pub fn new_in(value: T, pool: &'p P) -> Self {
        let ptr = pool.allocate(Layout::new::<T>()).cast::<T>();

        // SAFETY: The block was allocated for the layout of `T`, so it is valid for writes
        // and suitably aligned.
        unsafe {
            ptr.write(value);
        }

        Self {
            ptr,
            pool,
            _owns: PhantomData,
        }
    }

    /// Moves the value out and returns its block to the pool.
    #[must_use]
    pub fn into_inner(this: Self) -> T {
        let this = mem::ManuallyDrop::new(this);

        // SAFETY: The value is initialized and, as `this` is never dropped, read only once.
        let value = unsafe { this.ptr.read() };

        // SAFETY: The block came from this pool with this layout and the value was moved out.
        unsafe {
            this.pool.deallocate(this.ptr.cast(), Layout::new::<T>());
        }

        value
    }

    /// The pool the value was allocated from.
    #[must_use]
    pub fn pool(this: &Self) -> &'p P {
        this.pool
    }

    /// A pointer to the value. The pointer is valid for as long as the `PoolBox` is alive.
    #[must_use]
    pub fn as_ptr(this: &Self) -> NonNull<T> {
        this.ptr
    }
}

impl<T, P: MemoryPool + ?Sized> Deref for PoolBox<'_, T, P> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The value is initialized for the lifetime of `self` and only mutated
        // through `&mut self`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T, P: MemoryPool + ?Sized> DerefMut for PoolBox<'_, T, P> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The value is initialized and `&mut self` guarantees exclusive access.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T, P: MemoryPool + ?Sized> Drop for PoolBox<'_, T, P> {
    fn drop(&mut self) {
        // SAFETY: The value is initialized and is never accessed again.
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
        }

        // SAFETY: The block came from this pool with this layout and the value was dropped.
        unsafe {
            self.pool.deallocate(self.ptr.cast(), Layout::new::<T>());
        }
    }
}

impl<T: fmt::Debug, P: MemoryPool + ?Sized> fmt::Debug for PoolBox<'_, T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBox")
            .field("value", &**self)
            .finish_non_exhaustive()
    }
}

// SAFETY: The box owns its `T`, so sending the box sends the `T`. The pool is only accessed
// through a shared reference, which is safe to send if the pool is `Sync`.
unsafe impl<T: Send, P: MemoryPool + Sync + ?Sized> Send for PoolBox<'_, T, P> {}

// SAFETY: Shared access to the box only gives shared access to the `T` and the pool.
unsafe impl<T: Sync, P: MemoryPool + Sync + ?Sized> Sync for PoolBox<'_, T, P> {}
