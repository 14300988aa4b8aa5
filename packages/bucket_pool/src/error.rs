use thiserror::Error;

/// Errors that can occur when describing the size classes of a memory pool.
///
/// These are configuration errors: the operation that reports them leaves the target
/// unchanged, so the caller may ignore the error and continue with the prior state.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A bucket definition had a zero item size, a zero page item count, or pages too large
    /// to allocate.
    #[error("invalid bucket definition: {problem}")]
    InvalidDefinition {
        /// A human-readable description of the problem.
        problem: &'static str,
    },

    /// The size class table is already at its maximum capacity.
    #[error(
        "cannot add size class of {item_size} bytes: the table already holds the maximum of {max} size classes"
    )]
    TooManySizeClasses {
        /// Item size of the size class that was rejected.
        item_size: usize,

        /// The maximum number of size classes a table can hold.
        max: usize,
    },

    /// The size class table already contains a size class with the same item size.
    #[error("cannot add size class of {item_size} bytes: a size class of that size already exists")]
    DuplicateItemSize {
        /// Item size of the size class that was rejected.
        item_size: usize,
    },
}

/// A specialized `Result` type for memory pool configuration, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug, Clone);

    #[test]
    fn messages_name_the_rejected_size() {
        let error = Error::DuplicateItemSize { item_size: 48 };
        assert!(error.to_string().contains("48 bytes"));

        let error = Error::TooManySizeClasses {
            item_size: 64,
            max: 256,
        };
        let message = error.to_string();
        assert!(message.contains("64 bytes"));
        assert!(message.contains("256"));
    }

    #[test]
    fn invalid_definition_carries_problem() {
        let error = Error::InvalidDefinition {
            problem: "item size must be non-zero",
        };

        assert_eq!(
            error.to_string(),
            "invalid bucket definition: item size must be non-zero"
        );
    }
}
