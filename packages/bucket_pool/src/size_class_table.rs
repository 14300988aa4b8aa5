use std::num::NonZero;
use std::slice;

use new_zealand::nz;

use crate::{BucketDefinition, Error, PAGE_SIZE_OVERFLOW, Result};

/// The maximum number of size classes a [`SizeClassTable`] can hold.
pub const MAX_SIZE_CLASSES: usize = 256;

/// An ordered collection of [`BucketDefinition`]s that parameterizes a memory pool.
///
/// The table keeps its definitions sorted by ascending item size, with no two definitions
/// sharing an item size and at most [`MAX_SIZE_CLASSES`] definitions in total. A pool creates
/// one bucket per definition, in table order.
///
/// # Examples
///
/// ```
/// use bucket_pool::SizeClassTable;
///
/// let table = SizeClassTable::builder()
///     .bucket(32, 128, 32, false)
///     .bucket(8, 512, 64, true)
///     .bucket(16, 256, 64, true)
///     .build();
///
/// let sizes: Vec<usize> = table.iter().map(|d| d.item_size()).collect();
/// assert_eq!(sizes, [8, 16, 32]);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SizeClassTable {
    definitions: Vec<BucketDefinition>,
}

/// Whether a default size class pre-warms its first page.
#[derive(Clone, Copy)]
enum PreWarm {
    Always,
    ExclusiveOnly,
    Never,
}

/// One row of the default tables: item size, first page item count, extra page item count.
struct DefaultClass(NonZero<usize>, NonZero<usize>, NonZero<usize>, PreWarm);

// Small and hot classes pre-warm everywhere. Mid-sized classes pre-warm only for the exclusive
// pool, whose memory is not shared by every thread. Large classes grow lazily.
const DEFAULT_CLASSES: [DefaultClass; 18] = [
    DefaultClass(nz!(4), nz!(8192), nz!(1024), PreWarm::Always),
    DefaultClass(nz!(8), nz!(8192), nz!(1024), PreWarm::Always),
    DefaultClass(nz!(16), nz!(8192), nz!(1024), PreWarm::Always),
    DefaultClass(nz!(32), nz!(8192), nz!(1024), PreWarm::Always),
    DefaultClass(nz!(64), nz!(8192), nz!(1024), PreWarm::Always),
    DefaultClass(nz!(128), nz!(8192), nz!(1024), PreWarm::Always),
    DefaultClass(nz!(192), nz!(4096), nz!(1024), PreWarm::Always),
    DefaultClass(nz!(256), nz!(4096), nz!(1024), PreWarm::Always),
    DefaultClass(nz!(384), nz!(4096), nz!(1024), PreWarm::Always),
    DefaultClass(nz!(512), nz!(1024), nz!(512), PreWarm::ExclusiveOnly),
    DefaultClass(nz!(768), nz!(1024), nz!(256), PreWarm::ExclusiveOnly),
    DefaultClass(nz!(1024), nz!(128), nz!(64), PreWarm::ExclusiveOnly),
    DefaultClass(nz!(2048), nz!(64), nz!(32), PreWarm::ExclusiveOnly),
    DefaultClass(nz!(4096), nz!(32), nz!(16), PreWarm::ExclusiveOnly),
    DefaultClass(nz!(6144), nz!(16), nz!(8), PreWarm::ExclusiveOnly),
    DefaultClass(nz!(8192), nz!(16), nz!(8), PreWarm::Never),
    DefaultClass(nz!(12288), nz!(16), nz!(8), PreWarm::Never),
    DefaultClass(nz!(16384), nz!(8), nz!(4), PreWarm::Never),
];

impl SizeClassTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            definitions: Vec::new(),
        }
    }

    /// Starts building a table from individual definitions.
    ///
    /// Definitions may be supplied in any order. Rejected definitions are logged and skipped.
    #[must_use]
    pub fn builder() -> SizeClassTableBuilder {
        SizeClassTableBuilder {
            table: Self::new(),
        }
    }

    /// The default table for a pool used from a single thread.
    ///
    /// Covers item sizes from 4 bytes to 16 KiB. Classes up to 6 KiB pre-warm their first page.
    #[must_use]
    pub fn default_exclusive() -> Self {
        Self::from_defaults(true)
    }

    /// The default table for a pool shared between threads.
    ///
    /// Covers the same item sizes as [`default_exclusive()`][Self::default_exclusive] but only
    /// classes up to 384 bytes pre-warm their first page.
    #[must_use]
    pub fn default_shared() -> Self {
        Self::from_defaults(false)
    }

    fn from_defaults(exclusive: bool) -> Self {
        let definitions = DEFAULT_CLASSES
            .iter()
            .map(|&DefaultClass(item_size, first, extra, pre_warm)| {
                let pre_warm = match pre_warm {
                    PreWarm::Always => true,
                    PreWarm::ExclusiveOnly => exclusive,
                    PreWarm::Never => false,
                };

                BucketDefinition::from_parts(item_size, first, extra, pre_warm)
            })
            .collect();

        Self { definitions }
    }

    /// Inserts a definition at its sorted position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDefinition`] if the pages of the definition are too large to
    /// allocate, [`Error::TooManySizeClasses`] if the table already holds [`MAX_SIZE_CLASSES`]
    /// definitions and [`Error::DuplicateItemSize`] if a definition with the same item size
    /// already exists. In every case the error is logged and the table is left unchanged.
    pub fn add(&mut self, definition: BucketDefinition) -> Result<()> {
        let item_size = definition.item_size();

        if !definition.pages_fit() {
            tracing::error!(
                item_size,
                first_page_item_count = definition.first_page_item_count(),
                extra_page_item_count = definition.extra_page_item_count(),
                "size class pages are too large to allocate, ignoring definition"
            );

            return Err(Error::InvalidDefinition {
                problem: PAGE_SIZE_OVERFLOW,
            });
        }

        if self.definitions.len() >= MAX_SIZE_CLASSES {
            tracing::error!(
                item_size,
                max = MAX_SIZE_CLASSES,
                "size class table is full, ignoring definition"
            );

            return Err(Error::TooManySizeClasses {
                item_size,
                max: MAX_SIZE_CLASSES,
            });
        }

        let index = self
            .definitions
            .partition_point(|existing| existing.item_size() < item_size);

        if self
            .definitions
            .get(index)
            .is_some_and(|existing| existing.item_size() == item_size)
        {
            tracing::error!(
                item_size,
                "size class table already has a class of this size, ignoring definition"
            );

            return Err(Error::DuplicateItemSize { item_size });
        }

        self.definitions.insert(index, definition);
        Ok(())
    }

    /// Number of size classes in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the table has no size classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// The definition at `index` in ascending item size order, if the index is in bounds.
    #[must_use]
    pub fn definition_at(&self, index: usize) -> Option<&BucketDefinition> {
        self.definitions.get(index)
    }

    /// Iterates over the definitions in ascending item size order.
    pub fn iter(&self) -> slice::Iter<'_, BucketDefinition> {
        self.definitions.iter()
    }
}

impl<'a> IntoIterator for &'a SizeClassTable {
    type Item = &'a BucketDefinition;
    type IntoIter = slice::Iter<'a, BucketDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Builds a [`SizeClassTable`] from individual definitions.
///
/// Created via [`SizeClassTable::builder()`].
#[derive(Debug)]
#[must_use]
pub struct SizeClassTableBuilder {
    table: SizeClassTable,
}

impl SizeClassTableBuilder {
    /// Adds a size class described by its parts.
    ///
    /// A malformed, duplicate or excess definition is logged and skipped.
    pub fn bucket(
        self,
        item_size: usize,
        first_page_item_count: usize,
        extra_page_item_count: usize,
        pre_warm_first_page: bool,
    ) -> Self {
        match BucketDefinition::new(
            item_size,
            first_page_item_count,
            extra_page_item_count,
            pre_warm_first_page,
        ) {
            Ok(definition) => self.definition(definition),
            Err(_) => self,
        }
    }

    /// Adds a size class from an existing definition.
    ///
    /// An oversized, duplicate or excess definition is logged and skipped.
    pub fn definition(mut self, definition: BucketDefinition) -> Self {
        // Rejections are already logged by the table.
        _ = self.table.add(definition);
        self
    }

    /// Completes the table.
    #[must_use]
    pub fn build(self) -> SizeClassTable {
        self.table
    }
}
