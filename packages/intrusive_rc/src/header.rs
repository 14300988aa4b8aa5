use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::any::{TypeId, type_name};
use std::cell::Cell;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use bucket_pool::MemoryPool;

use crate::RefCounted;

/// Type-specific operations on an allocation, so handles to a re-viewed (e.g. trait object)
/// value can still tear down the original type.
#[derive(Debug)]
pub(crate) struct BoxOps {
    type_id: fn() -> TypeId,
    type_name: fn() -> &'static str,
    layout: Layout,
    on_last_strong_released: unsafe fn(NonNull<Header>),
    drop_value: unsafe fn(NonNull<Header>),
}

/// The counters that precede every reference-counted value in memory.
///
/// The strong count starts at 1 for the handle that creates the value. When it drops to zero,
/// the value is torn down but the memory stays allocated until the weak count also reaches
/// zero, so weak handles can still observe that the value is gone.
pub(crate) struct Header {
    strong: Cell<i32>,
    weak: Cell<i32>,
    ops: &'static BoxOps,

    /// `None` if the allocation came from the global allocator.
    pool: Option<Rc<dyn MemoryPool>>,
}

#[repr(C)]
struct RcBox<T> {
    // Must be the first field, so a pointer to the box is also a pointer to the header.
    header: Header,
    value: T,
}

impl<T: RefCounted + 'static> RcBox<T> {
    const OPS: &'static BoxOps = &BoxOps {
        type_id: TypeId::of::<T>,
        type_name: type_name::<T>,
        layout: Layout::new::<Self>(),
        on_last_strong_released: Self::on_last_strong_released,
        drop_value: Self::drop_value,
    };

    /// # Safety
    ///
    /// `header` must point to the header of a live `RcBox<T>` with no outstanding references
    /// to its value.
    unsafe fn on_last_strong_released(header: NonNull<Header>) {
        let this = header.cast::<Self>().as_ptr();

        // SAFETY: The caller guarantees the value is live and not otherwise referenced.
        let value = unsafe { &mut *(&raw mut (*this).value) };

        value.on_last_strong_released();
    }

    /// # Safety
    ///
    /// `header` must point to the header of a live `RcBox<T>` whose value is never accessed
    /// again.
    unsafe fn drop_value(header: NonNull<Header>) {
        let this = header.cast::<Self>().as_ptr();

        // SAFETY: The caller guarantees the value is live and never accessed again.
        unsafe {
            ptr::drop_in_place(&raw mut (*this).value);
        }
    }
}

/// The pointers held by every non-empty handle: one to the header, for the counters, and one
/// to the value, possibly re-viewed as another (unsized) type.
pub(crate) struct RawRef<T: ?Sized> {
    pub(crate) header: NonNull<Header>,
    pub(crate) value: NonNull<T>,
}

impl<T: ?Sized> Clone for RawRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for RawRef<T> {}

impl<T: RefCounted + 'static> RawRef<T> {
    /// Moves `value` into a new allocation with a strong count of 1 and a weak count of 0.
    ///
    /// The memory comes from `pool` if one is given, otherwise from the global allocator.
    pub(crate) fn allocate(value: T, pool: Option<Rc<dyn MemoryPool>>) -> Self {
        let layout = Layout::new::<RcBox<T>>();

        let ptr = match &pool {
            Some(pool) => pool.allocate(layout),
            None => {
                // SAFETY: The layout is not zero-sized because it contains the header.
                let ptr = unsafe { alloc(layout) };
                NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout))
            }
        };

        let ptr = ptr.cast::<RcBox<T>>();

        // SAFETY: The memory was allocated for the layout of `RcBox<T>`, so it is valid for
        // writes and suitably aligned.
        unsafe {
            ptr.write(RcBox {
                header: Header {
                    strong: Cell::new(1),
                    weak: Cell::new(0),
                    ops: RcBox::<T>::OPS,
                    pool,
                },
                value,
            });
        }

        // SAFETY: We just allocated and initialized the box.
        unsafe { Self::from_header(ptr.cast()) }
    }

    /// # Safety
    ///
    /// `header` must point to the header of an `RcBox<T>` whose memory is still allocated.
    #[must_use]
    pub(crate) unsafe fn from_header(header: NonNull<Header>) -> Self {
        let this = header.cast::<RcBox<T>>().as_ptr();

        // SAFETY: Only computes the address of a field within the allocation, which the caller
        // guarantees is still allocated. The result is non-null as it is derived from `header`.
        let value = unsafe { NonNull::new_unchecked(&raw mut (*this).value) };

        Self { header, value }
    }
}

impl<T: ?Sized> RawRef<T> {
    /// Re-views the value as another type without touching the counters.
    pub(crate) fn with_value<U: ?Sized>(self, value: NonNull<U>) -> RawRef<U> {
        RawRef {
            header: self.header,
            value,
        }
    }

    fn header(&self) -> &Header {
        // SAFETY: A handle only holds a `RawRef` while it holds a strong or weak count, which
        // keeps the header allocated.
        unsafe { self.header.as_ref() }
    }

    pub(crate) fn strong_count(&self) -> i32 {
        self.header().strong.get()
    }

    pub(crate) fn weak_count(&self) -> i32 {
        self.header().weak.get()
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.strong_count() == 0
    }

    /// Whether the original value is of type `U`.
    pub(crate) fn is<U: 'static>(&self) -> bool {
        (self.header().ops.type_id)() == TypeId::of::<U>()
    }

    pub(crate) fn type_name(&self) -> &'static str {
        (self.header().ops.type_name)()
    }

    /// Adds a strong holder.
    ///
    /// # Panics
    ///
    /// Panics if the value has already been torn down. A value cannot be brought back once its
    /// last strong holder is gone.
    pub(crate) fn increase_strong(&self) {
        let header = self.header();
        let strong = header.strong.get();

        assert!(
            strong > 0,
            "cannot add a strong holder to a {} whose last strong holder was already released",
            (header.ops.type_name)()
        );

        header.strong.set(
            strong
                .checked_add(1)
                .expect("strong count overflow - more than i32::MAX strong holders"),
        );
    }

    /// Adds a weak holder.
    pub(crate) fn increase_weak(&self) {
        let header = self.header();

        header.weak.set(
            header
                .weak
                .get()
                .checked_add(1)
                .expect("weak count overflow - more than i32::MAX weak holders"),
        );
    }

    /// Removes a strong holder. Removing the last one runs the teardown hook of the value and
    /// drops it, then frees the memory unless weak holders remain.
    ///
    /// # Safety
    ///
    /// The caller must own one strong count, which it gives up. If this was the last strong
    /// holder, no reference to the value may exist.
    pub(crate) unsafe fn release_strong(self) {
        let header = self.header();

        let strong = header.strong.get();
        debug_assert!(strong > 0, "strong count released more times than acquired");

        // Cannot underflow because the caller owns a strong count.
        let strong = strong.wrapping_sub(1);
        header.strong.set(strong);

        if strong > 0 {
            return;
        }

        // Shields the memory while the value is torn down: the hook or the value's drop logic
        // may release weak handles to this very value.
        self.increase_weak();

        let ops = header.ops;

        // SAFETY: The strong count is zero, so no handle can reach the value anymore.
        unsafe {
            (ops.on_last_strong_released)(self.header);
        }

        // SAFETY: The value is live and, with the strong count at zero, never accessed again.
        unsafe {
            (ops.drop_value)(self.header);
        }

        tracing::trace!(
            type_name = (ops.type_name)(),
            weak_count = self.weak_count().wrapping_sub(1),
            "reference-counted value torn down"
        );

        // SAFETY: Releases the shield taken above.
        unsafe {
            self.release_weak();
        }
    }

    /// Removes a weak holder, freeing the memory if it was the last holder of any kind.
    ///
    /// # Safety
    ///
    /// The caller must own one weak count, which it gives up.
    pub(crate) unsafe fn release_weak(self) {
        let header = self.header();

        let weak = header.weak.get();
        debug_assert!(weak > 0, "weak count released more times than acquired");

        // Cannot underflow because the caller owns a weak count.
        let weak = weak.wrapping_sub(1);
        header.weak.set(weak);

        if weak == 0 && header.strong.get() == 0 {
            // SAFETY: No strong or weak holder remains, so nothing can reach the memory.
            unsafe {
                free(self.header);
            }
        }
    }
}

/// Returns the memory of a torn-down value to where it came from.
///
/// # Safety
///
/// The value must already have been dropped and no handle may refer to the memory.
unsafe fn free(header: NonNull<Header>) {
    let header_ptr = header.as_ptr();

    // SAFETY: The header is still initialized. Its pool is moved out and the rest of the
    // header has no drop logic, so reading it out leaves nothing to clean up.
    let (layout, pool) = unsafe {
        (
            (*header_ptr).ops.layout,
            ptr::read(&raw const (*header_ptr).pool),
        )
    };

    match pool {
        Some(pool) => {
            // SAFETY: The memory was allocated from this pool with this layout.
            unsafe {
                pool.deallocate(header.cast(), layout);
            }
        }
        None => {
            // SAFETY: The memory was allocated from the global allocator with this layout.
            unsafe {
                dealloc(header_ptr.cast(), layout);
            }
        }
    }
}
