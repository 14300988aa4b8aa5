#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A segregated free-list memory pool that serves fixed-size blocks from size-class buckets.
//!
//! A pool is described by a [`SizeClassTable`]: an ascending list of [`BucketDefinition`]s,
//! each naming an item size and how many items the pages of its bucket hold. Every allocation
//! request is routed to the smallest size class that covers it, where a [`Bucket`] hands out a
//! recycled item from a LIFO free list, or grows by another page when none is free. Requests
//! larger than the largest size class go to the system allocator.
//!
//! # Key Features
//!
//! - **Two deployment variants**: [`ExclusivePool`] for single-threaded use without locking
//!   and [`SharedPool`] for use from many threads behind one lock. Both implement the
//!   [`MemoryPool`] trait, so consumers can be written once against either.
//! - **Two-tier page sizing**: the first page of a bucket is sized for the steady-state load
//!   and can be allocated up front, while later pages are sized for unexpected spikes.
//! - **Tuned default tables**: [`SizeClassTable::default_exclusive()`] and
//!   [`SizeClassTable::default_shared()`] cover item sizes from 4 bytes to 16 KiB.
//! - **Optional validation**: buckets can verify every returned address, catching double frees
//!   and foreign pointers, see [`Validation`].
//! - **Diagnostics**: per-bucket and per-request-size counters via [`PoolStatistics`], with
//!   growth, teardown and configuration problems reported through [`tracing`].
//! - **Typed storage**: [`PoolBox`] owns a value placed in pool memory.
//!
//! # No per-block metadata
//!
//! The pool stores nothing alongside a block, so the caller must supply the same
//! [`Layout`][std::alloc::Layout] when deallocating a block as when allocating it. The layout
//! selects the bucket to return the block to.
//!
//! # Example
//!
//! ```
//! use std::alloc::Layout;
//!
//! use bucket_pool::{ExclusivePool, MemoryPool, SizeClassTable};
//!
//! let pool = ExclusivePool::builder()
//!     .size_classes(
//!         SizeClassTable::builder()
//!             .bucket(8, 1024, 256, true)
//!             .bucket(16, 1024, 256, true)
//!             .bucket(32, 512, 128, false)
//!             .build(),
//!     )
//!     .build();
//!
//! // A 10-byte request is served by the 16-byte size class.
//! let layout = Layout::from_size_align(10, 1).unwrap();
//! let block = pool.allocate(layout);
//! assert_eq!(pool.bucket_statistics(1).unwrap().used_items(), 1);
//!
//! // SAFETY: The block came from this pool with the same layout.
//! unsafe { pool.deallocate(block, layout) };
//! ```

mod bucket;
mod builder;
mod definition;
mod error;
mod exclusive;
mod memory_pool;
mod page;
mod pool_box;
mod pool_core;
mod shared;
mod size_class_table;
mod statistics;
mod validation;

pub use bucket::*;
pub use builder::*;
pub use definition::*;
pub use error::*;
pub use exclusive::*;
pub use memory_pool::*;
pub(crate) use page::*;
pub use pool_box::*;
pub(crate) use pool_core::*;
pub use shared::*;
pub use size_class_table::*;
pub use statistics::*;
pub use validation::*;
