use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::num::NonZero;
use std::ptr::NonNull;

/// Alignment of every page, matching the strictest fundamental alignment of the platforms
/// we care about. Items inside a page are aligned to the largest power of two dividing the
/// item size, up to this value.
pub(crate) const MAX_ALIGN: usize = 16;

/// One contiguous block of memory sliced into `item_count` items of `item_size` bytes.
///
/// A page does not release its memory when dropped. The owning bucket decides whether the
/// memory is released (via [`release()`][Self::release]) or leaked because items are still
/// in use.
#[derive(Debug)]
pub(crate) struct Page {
    ptr: NonNull<u8>,
    layout: Layout,
    item_size: NonZero<usize>,
    item_count: NonZero<usize>,
}

impl Page {
    /// Allocates a page from the system allocator.
    ///
    /// # Panics
    ///
    /// Panics if the page size overflows `isize`. Allocation failure is reported through
    /// [`handle_alloc_error`].
    #[must_use]
    pub(crate) fn allocate(item_size: NonZero<usize>, item_count: NonZero<usize>) -> Self {
        let size = item_size
            .checked_mul(item_count)
            .expect("page size overflows usize - item size and count are unreasonable");

        let layout = Layout::from_size_align(size.get(), MAX_ALIGN)
            .expect("page size overflows isize - item size and count are unreasonable");

        // SAFETY: The layout has a non-zero size because both factors are non-zero.
        let ptr = unsafe { alloc(layout) };

        let Some(ptr) = NonNull::new(ptr) else {
            handle_alloc_error(layout);
        };

        Self {
            ptr,
            layout,
            item_size,
            item_count,
        }
    }

    /// Pointers to every item in the page, in ascending address order.
    pub(crate) fn items(&self) -> impl DoubleEndedIterator<Item = NonNull<u8>> {
        (0..self.item_count.get()).map(|index| {
            // Cannot overflow because the page layout was computed from the same product.
            let offset = index.wrapping_mul(self.item_size.get());

            // SAFETY: `index < item_count` so the offset stays within the page allocation.
            unsafe { self.ptr.add(offset) }
        })
    }

    /// Whether `ptr` points anywhere inside this page.
    #[must_use]
    pub(crate) fn contains(&self, ptr: NonNull<u8>) -> bool {
        let start = self.ptr.as_ptr().addr();
        let address = ptr.as_ptr().addr();

        address >= start && address.wrapping_sub(start) < self.layout.size()
    }

    /// Whether `ptr` points to the first byte of an item in this page.
    #[must_use]
    pub(crate) fn is_item_boundary(&self, ptr: NonNull<u8>) -> bool {
        let offset = ptr.as_ptr().addr().wrapping_sub(self.ptr.as_ptr().addr());

        self.contains(ptr) && offset.checked_rem(self.item_size.get()) == Some(0)
    }

    /// Returns the page memory to the system allocator.
    ///
    /// # Safety
    ///
    /// No item of the page may be accessed after this call.
    pub(crate) unsafe fn release(self) {
        // SAFETY: The memory was allocated in `allocate()` with this same layout and the caller
        // guarantees nothing references it anymore.
        unsafe {
            dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn items_are_contiguous_and_contained() {
        let page = Page::allocate(nz!(24), nz!(5));

        let items: Vec<_> = page.items().collect();
        assert_eq!(items.len(), 5);

        for pair in items.windows(2) {
            let [a, b] = pair else { unreachable!() };
            assert_eq!(b.as_ptr().addr() - a.as_ptr().addr(), 24);
        }

        for item in &items {
            assert!(page.contains(*item));
            assert!(page.is_item_boundary(*item));
        }

        // SAFETY: No items are in use.
        unsafe { page.release() };
    }

    #[test]
    fn page_is_max_aligned() {
        let page = Page::allocate(nz!(3), nz!(7));

        assert_eq!(page.items().next().unwrap().as_ptr().addr() % MAX_ALIGN, 0);

        // SAFETY: No items are in use.
        unsafe { page.release() };
    }

    #[test]
    fn interior_pointer_is_contained_but_not_boundary() {
        let page = Page::allocate(nz!(16), nz!(2));
        let first = page.items().next().unwrap();

        // SAFETY: Still inside the first item.
        let interior = unsafe { first.add(4) };

        assert!(page.contains(interior));
        assert!(!page.is_item_boundary(interior));

        // SAFETY: One past the end of the page.
        let end = unsafe { first.add(32) };
        assert!(!page.contains(end));
        assert!(!page.is_item_boundary(end));

        // SAFETY: No items are in use.
        unsafe { page.release() };
    }
}
