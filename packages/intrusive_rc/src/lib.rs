#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Single-threaded strong and weak reference-counted handles with a teardown hook.
//!
//! A type opts into reference counting by implementing [`RefCounted`]. Its values are then
//! owned by [`Strong`] handles and observed by [`Weak`] handles, with both counters stored in a
//! header allocated together with the value.
//!
//! # Key Features
//!
//! - **Two-phase teardown**: when the last [`Strong`] goes away, the value's
//!   [teardown hook][RefCounted::on_last_strong_released] runs and the value is dropped, while
//!   the memory is kept until the last [`Weak`] is gone. The hook may release weak handles to
//!   the value itself, which is how self-references are broken.
//! - **No resurrection**: once torn down, a value can never gain a strong holder again.
//!   [`Weak::lock()`] yields an empty handle from then on.
//! - **Lazy expiry**: a [`Weak`] discovers that its value is gone when queried, and lets go of
//!   the memory when [refreshed][Weak::refresh], reset or dropped.
//! - **Re-viewing**: handles convert to trait object views of the same value via
//!   [`Strong::cast_with()`] and back to the concrete type via [`Strong::downcast()`].
//! - **Identity comparison**: handles compare and hash by the value they refer to, across
//!   strong and weak handles and across views.
//! - **Scoped borrows**: [`ScopedBorrow`] keeps a value alive for the duration of a call
//!   without handing out ownership.
//! - **Pool-backed storage**: [`Strong::new_in()`] places the value and its counters in a
//!   [`bucket_pool::MemoryPool`].
//!
//! # Example
//!
//! ```
//! use intrusive_rc::{RefCounted, Strong};
//!
//! struct Document {
//!     title: String,
//! }
//!
//! impl RefCounted for Document {}
//!
//! let document = Strong::new(Document {
//!     title: "notes".to_string(),
//! });
//! let observer = document.downgrade();
//!
//! assert_eq!(observer.lock().title, "notes");
//!
//! drop(document);
//! assert!(observer.is_expired());
//! ```
//!
//! # Thread safety
//!
//! The counters are not atomic. Every handle type is neither [`Send`] nor [`Sync`], so all
//! holders of a value live on the thread that created it.

mod header;
mod ref_counted;
mod scoped_borrow;
mod strong;
mod weak;

pub(crate) use header::*;
pub use ref_counted::*;
pub use scoped_borrow::*;
pub use strong::Strong;
pub use weak::*;
