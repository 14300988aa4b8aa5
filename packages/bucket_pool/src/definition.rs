use std::alloc::Layout;
use std::num::NonZero;

use crate::{Error, MAX_ALIGN, Result};

pub(crate) const PAGE_SIZE_OVERFLOW: &str = "page size overflows isize";

/// Describes one size class of a memory pool: the size of the items its bucket serves and
/// how the bucket grows.
///
/// The first page of a bucket is typically sized generously to absorb steady-state load,
/// while extra pages are added only when that load is exceeded and are therefore sized
/// more conservatively.
///
/// # Examples
///
/// ```
/// use bucket_pool::BucketDefinition;
///
/// let definition = BucketDefinition::new(64, 1024, 128, true).unwrap();
///
/// assert_eq!(definition.item_size(), 64);
/// assert_eq!(definition.first_page_item_count(), 1024);
/// assert_eq!(definition.extra_page_item_count(), 128);
/// assert!(definition.pre_warm_first_page());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BucketDefinition {
    item_size: NonZero<usize>,
    first_page_item_count: NonZero<usize>,
    extra_page_item_count: NonZero<usize>,
    pre_warm_first_page: bool,
}

impl BucketDefinition {
    /// Creates a bucket definition, validating that every count is non-zero and that the
    /// larger of the two pages fits in a single allocation.
    ///
    /// A rejected definition is logged as an error and reported via the returned `Err`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bucket_pool::{BucketDefinition, Error};
    ///
    /// let result = BucketDefinition::new(0, 16, 16, false);
    /// assert!(matches!(result, Err(Error::InvalidDefinition { .. })));
    /// ```
    pub fn new(
        item_size: usize,
        first_page_item_count: usize,
        extra_page_item_count: usize,
        pre_warm_first_page: bool,
    ) -> Result<Self> {
        let reject = |problem: &'static str| {
            tracing::error!(
                item_size,
                first_page_item_count,
                extra_page_item_count,
                problem,
                "rejected bucket definition"
            );

            Error::InvalidDefinition { problem }
        };

        let item_size =
            NonZero::new(item_size).ok_or_else(|| reject("item size must be non-zero"))?;
        let first_page_item_count = NonZero::new(first_page_item_count)
            .ok_or_else(|| reject("first page item count must be non-zero"))?;
        let extra_page_item_count = NonZero::new(extra_page_item_count)
            .ok_or_else(|| reject("extra page item count must be non-zero"))?;

        let definition = Self::from_parts(
            item_size,
            first_page_item_count,
            extra_page_item_count,
            pre_warm_first_page,
        );

        if !definition.pages_fit() {
            return Err(reject(PAGE_SIZE_OVERFLOW));
        }

        Ok(definition)
    }

    /// Creates a bucket definition from values that are already known to be non-zero.
    ///
    /// The page size is not checked here. A definition whose pages cannot be allocated is
    /// rejected when it is added to a [`SizeClassTable`][crate::SizeClassTable].
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZero;
    ///
    /// use bucket_pool::BucketDefinition;
    ///
    /// let definition = BucketDefinition::from_parts(
    ///     NonZero::new(32).unwrap(),
    ///     NonZero::new(256).unwrap(),
    ///     NonZero::new(64).unwrap(),
    ///     false,
    /// );
    ///
    /// assert_eq!(definition.item_size(), 32);
    /// ```
    #[must_use]
    pub const fn from_parts(
        item_size: NonZero<usize>,
        first_page_item_count: NonZero<usize>,
        extra_page_item_count: NonZero<usize>,
        pre_warm_first_page: bool,
    ) -> Self {
        Self {
            item_size,
            first_page_item_count,
            extra_page_item_count,
            pre_warm_first_page,
        }
    }

    /// Size in bytes of every item served by the bucket.
    #[must_use]
    pub const fn item_size(&self) -> usize {
        self.item_size.get()
    }

    /// Number of items in the first page of the bucket.
    #[must_use]
    pub const fn first_page_item_count(&self) -> usize {
        self.first_page_item_count.get()
    }

    /// Number of items in every page after the first.
    #[must_use]
    pub const fn extra_page_item_count(&self) -> usize {
        self.extra_page_item_count.get()
    }

    /// Whether the first page is allocated when the bucket is set up, instead of on the
    /// first allocation request.
    #[must_use]
    pub const fn pre_warm_first_page(&self) -> bool {
        self.pre_warm_first_page
    }

    pub(crate) const fn item_size_nz(&self) -> NonZero<usize> {
        self.item_size
    }

    pub(crate) const fn first_page_item_count_nz(&self) -> NonZero<usize> {
        self.first_page_item_count
    }

    pub(crate) const fn extra_page_item_count_nz(&self) -> NonZero<usize> {
        self.extra_page_item_count
    }

    /// Whether a page of either size can be described by a [`Layout`], which is what the
    /// bucket needs to allocate it.
    pub(crate) fn pages_fit(&self) -> bool {
        let largest = self.first_page_item_count.max(self.extra_page_item_count);

        self.item_size
            .checked_mul(largest)
            .is_some_and(|size| Layout::from_size_align(size.get(), MAX_ALIGN).is_ok())
    }

    /// Returns a copy of this definition with a different pre-warm setting.
    #[must_use]
    pub const fn with_pre_warm_first_page(mut self, pre_warm_first_page: bool) -> Self {
        self.pre_warm_first_page = pre_warm_first_page;
        self
    }
}
