/// Determines whether a bucket verifies the addresses returned to it.
///
/// With validation enabled, every deallocation is checked to be an item boundary inside one of
/// the bucket's own pages and not already on the free list, catching foreign pointers and
/// double frees with a panic. The checks scan the free list, so they are costly for large
/// buckets.
///
/// The default is [`Validation::Enabled`] in builds with debug assertions and
/// [`Validation::Disabled`] otherwise.
///
/// # Examples
///
/// ```
/// use bucket_pool::{ExclusivePool, Validation};
///
/// let pool = ExclusivePool::builder()
///     .validation(Validation::Enabled)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Validation {
    /// Deallocated addresses are checked for ownership and double frees.
    Enabled,

    /// Deallocated addresses are trusted without checks.
    Disabled,
}

impl Validation {
    /// Whether the checks are performed.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl Default for Validation {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }
}
