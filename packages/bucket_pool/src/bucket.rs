use std::mem;
use std::num::NonZero;
use std::ptr::NonNull;

use crate::{BucketDefinition, BucketStatistics, MAX_ALIGN, Page, Validation};

/// Serves fixed-size items of one size class from a LIFO free list backed by pages.
///
/// The bucket grows by one page whenever an allocation finds the free list empty. The first
/// page holds [`first_page_item_count`][BucketDefinition::first_page_item_count] items and
/// every later page holds [`extra_page_item_count`][BucketDefinition::extra_page_item_count]
/// items. There is no cap on the number of pages.
///
/// Items are returned in the order they were made available: the most recently freed item is
/// handed out first, and a fresh page hands out its items in ascending address order.
///
/// # Dropping with items in use
///
/// If any item is still in use when the bucket is dropped, the bucket logs an error and leaks
/// its pages instead of releasing them, so dangling pointers held by the caller do not point
/// into memory returned to the system.
///
/// # Examples
///
/// ```
/// use bucket_pool::{Bucket, BucketDefinition, Validation};
///
/// let definition = BucketDefinition::new(32, 4, 2, false).unwrap();
/// let mut bucket = Bucket::new(&definition, Validation::Enabled);
/// assert_eq!(bucket.page_count(), 0);
///
/// let item = bucket.allocate();
/// assert_eq!(bucket.total_items_count(), 4);
/// assert_eq!(bucket.free_items_count(), 3);
///
/// // SAFETY: The item came from this bucket and is not used after this call.
/// unsafe { bucket.deallocate(item) };
/// assert_eq!(bucket.free_items_count(), 4);
/// ```
///
/// # Thread safety
///
/// The bucket is thread-mobile ([`Send`]) but requires exclusive access for every operation,
/// so it is not [`Sync`].
#[derive(Debug)]
pub struct Bucket {
    item_size: NonZero<usize>,
    first_page_item_count: NonZero<usize>,
    extra_page_item_count: NonZero<usize>,

    pages: Vec<Page>,

    /// Addresses of items available for reuse, consumed from the end.
    free_list: Vec<NonNull<u8>>,

    /// Sum of the item counts of all pages.
    total_items: usize,

    validation: Validation,
}

// SAFETY: The bucket exclusively owns its pages and the free list only contains pointers into
// those pages. Nothing in the bucket is tied to the thread that created it.
unsafe impl Send for Bucket {}

impl Bucket {
    /// Sets up a bucket for the size class described by `definition`.
    ///
    /// If the definition asks for it, the first page is allocated immediately. Item sizes below
    /// the maximum fundamental alignment (other than 2, 4 and 8 bytes) are accepted but logged
    /// as a warning, because items of such sizes are poorly aligned for most uses.
    #[must_use]
    pub fn new(definition: &BucketDefinition, validation: Validation) -> Self {
        let item_size = definition.item_size_nz();

        if is_inefficient_item_size(item_size.get()) {
            tracing::warn!(
                item_size = item_size.get(),
                max_align = MAX_ALIGN,
                "inefficient bucket item size, items will be poorly aligned"
            );
        }

        let mut bucket = Self {
            item_size,
            first_page_item_count: definition.first_page_item_count_nz(),
            extra_page_item_count: definition.extra_page_item_count_nz(),
            pages: Vec::new(),
            free_list: Vec::new(),
            total_items: 0,
            validation,
        };

        if definition.pre_warm_first_page() {
            bucket.add_page();
        }

        bucket
    }

    /// Hands out one item, growing the bucket by a page if no item is free.
    ///
    /// The returned pointer is valid for reads and writes of [`item_size()`][Self::item_size]
    /// bytes and aligned to [`item_align()`][Self::item_align] until it is returned via
    /// [`deallocate()`][Self::deallocate] or the bucket is dropped.
    #[must_use]
    pub fn allocate(&mut self) -> NonNull<u8> {
        if self.free_list.is_empty() {
            self.add_page();
        }

        self.free_list
            .pop()
            .expect("a freshly added page always contributes at least one free item")
    }

    /// Returns an item to the free list.
    ///
    /// # Panics
    ///
    /// With [`Validation::Enabled`], panics if `ptr` is not the start of an item in one of
    /// this bucket's pages or if the item is already free.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate()`][Self::allocate] on this bucket and must
    /// not have been deallocated since. The caller must not access the item afterwards.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        if self.validation.is_enabled() {
            self.validate_returned(ptr);
        }

        debug_assert!(
            self.free_list.len() < self.total_items,
            "more items returned to the bucket than it ever handed out"
        );

        self.free_list.push(ptr);
    }

    #[cfg_attr(test, mutants::skip)] // Mutations only disable the checks, which tests cannot observe without UB.
    fn validate_returned(&self, ptr: NonNull<u8>) {
        let page = self.pages.iter().find(|page| page.contains(ptr));

        let Some(page) = page else {
            panic!(
                "pointer {ptr:p} returned to the {} byte bucket does not belong to any of its pages",
                self.item_size
            );
        };

        assert!(
            page.is_item_boundary(ptr),
            "pointer {ptr:p} returned to the {} byte bucket is not the start of an item",
            self.item_size
        );

        assert!(
            !self.free_list.contains(&ptr),
            "pointer {ptr:p} returned to the {} byte bucket is already free (double free)",
            self.item_size
        );
    }

    /// Grows the bucket by one page and makes all of its items available.
    ///
    /// The first page is sized by the first page item count, every later page by the extra
    /// page item count. Growth beyond the first page is logged, as it indicates the first page
    /// was sized too small for the load.
    pub fn add_page(&mut self) {
        let item_count = if self.pages.is_empty() {
            self.first_page_item_count
        } else {
            self.extra_page_item_count
        };

        let page = Page::allocate(self.item_size, item_count);

        self.free_list.reserve(item_count.get());

        // Reversed so that the lowest address is handed out first.
        self.free_list.extend(page.items().rev());

        self.total_items = self
            .total_items
            .checked_add(item_count.get())
            .expect("item count overflows usize - the bucket cannot have grown this large");

        self.pages.push(page);

        if self.pages.len() > 1 {
            tracing::info!(
                item_size = self.item_size.get(),
                page_count = self.pages.len(),
                total_items = self.total_items,
                "bucket grew by an extra page"
            );
        }
    }

    /// Size in bytes of every item in this bucket.
    #[must_use]
    pub fn item_size(&self) -> usize {
        self.item_size.get()
    }

    /// Alignment guaranteed for every item: the largest power of two that divides the item
    /// size, capped at the page alignment.
    #[must_use]
    pub fn item_align(&self) -> usize {
        let size = self.item_size.get();

        // Isolates the lowest set bit.
        (size & size.wrapping_neg()).min(MAX_ALIGN)
    }

    /// Number of pages allocated so far.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of items across all pages, whether free or in use.
    #[must_use]
    pub fn total_items_count(&self) -> usize {
        self.total_items
    }

    /// Number of items available for allocation without growing.
    #[must_use]
    pub fn free_items_count(&self) -> usize {
        self.free_list.len()
    }

    /// Number of items currently handed out.
    #[must_use]
    pub fn used_items_count(&self) -> usize {
        self.total_items.saturating_sub(self.free_list.len())
    }

    /// Bytes of item storage across all pages.
    #[must_use]
    pub fn total_memory_used(&self) -> usize {
        self.total_items.saturating_mul(self.item_size.get())
    }

    /// Whether `ptr` points into one of this bucket's pages.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.pages.iter().any(|page| page.contains(ptr))
    }

    /// A snapshot of the bucket's counters.
    #[must_use]
    pub fn statistics(&self) -> BucketStatistics {
        BucketStatistics::new(
            self.item_size.get(),
            self.pages.len(),
            self.total_items,
            self.free_list.len(),
        )
    }
}

impl Drop for Bucket {
    fn drop(&mut self) {
        let pages = mem::take(&mut self.pages);

        if self.free_list.len() != self.total_items {
            tracing::error!(
                item_size = self.item_size.get(),
                unreleased_items = self.used_items_count(),
                page_count = pages.len(),
                "bucket dropped with unreleased items, leaking its pages"
            );

            // Never released: callers may still hold pointers into these pages.
            mem::forget(pages);
            return;
        }

        for page in pages {
            // SAFETY: Every item is on the free list, so nothing references the page.
            unsafe {
                page.release();
            }
        }
    }
}

/// Sizes below the maximum alignment yield items that straddle alignment boundaries, except
/// for the naturally aligned primitive sizes.
fn is_inefficient_item_size(item_size: usize) -> bool {
    item_size < MAX_ALIGN && !matches!(item_size, 2 | 4 | 8)
}
