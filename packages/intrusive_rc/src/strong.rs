use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use bucket_pool::MemoryPool;

use crate::{RawRef, RefCounted, ScopedBorrow, Weak};

/// A strong holder of a reference-counted value.
///
/// The value stays alive for as long as at least one `Strong` (or [`ScopedBorrow`]) refers to
/// it. Cloning a `Strong` adds a holder, dropping or [resetting][Self::reset] one removes it.
/// When the last strong holder goes away, the value's
/// [teardown hook][RefCounted::on_last_strong_released] runs and the value is dropped. The
/// memory itself is kept until the last [`Weak`] holder is gone too.
///
/// A `Strong` may be empty, like a null pointer. Dereferencing an empty `Strong` panics; use
/// [`get()`][Self::get] to check.
///
/// # Re-viewing as another type
///
/// A `Strong<T>` can be converted into a handle to a trait object (or any other view of the
/// same value) via [`cast_with()`][Self::cast_with]. The original concrete type is recovered
/// via [`downcast()`][Self::downcast] or borrowed via [`get_as()`][Self::get_as].
///
/// # Examples
///
/// ```
/// use std::fmt::Display;
///
/// use intrusive_rc::{RefCounted, Strong};
///
/// struct Label(String);
///
/// impl RefCounted for Label {}
///
/// impl Display for Label {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         f.write_str(&self.0)
///     }
/// }
///
/// let label = Strong::new(Label("hello".to_string()));
/// let copy = label.clone();
/// assert_eq!(label.strong_count(), 2);
///
/// let display: Strong<dyn Display> = copy.cast_with(|label| label as &dyn Display);
/// assert_eq!(display.to_string(), "hello");
/// assert!(label == display);
///
/// let label_again = display.downcast::<Label>().ok().unwrap();
/// assert_eq!(label_again.0, "hello");
/// ```
///
/// # Thread safety
///
/// The counters are not atomic, so handles are neither [`Send`] nor [`Sync`]: every holder of
/// a value lives on the thread that created it.
pub struct Strong<T: ?Sized> {
    raw: Option<RawRef<T>>,

    // Drop check: we may drop a T.
    _owns: PhantomData<T>,
}

impl<T: RefCounted + 'static> Strong<T> {
    /// Moves `value` into a new reference-counted allocation from the global allocator and
    /// returns its first strong holder.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_raw(RawRef::allocate(value, None))
    }

    /// Moves `value` into a new reference-counted allocation from `pool` and returns its first
    /// strong holder.
    ///
    /// The allocation keeps the pool alive until the memory is freed.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::rc::Rc;
    ///
    /// use bucket_pool::{ExclusivePool, MemoryPool};
    /// use intrusive_rc::{RefCounted, Strong};
    ///
    /// struct Particle {
    ///     position: [f32; 3],
    /// }
    ///
    /// impl RefCounted for Particle {}
    ///
    /// let pool: Rc<dyn MemoryPool> = Rc::new(ExclusivePool::new());
    ///
    /// let particle = Strong::new_in(
    ///     Particle {
    ///         position: [0.0; 3],
    ///     },
    ///     Rc::clone(&pool),
    /// );
    ///
    /// assert_eq!(particle.position, [0.0; 3]);
    /// ```
    #[must_use]
    pub fn new_in(value: T, pool: Rc<dyn MemoryPool>) -> Self {
        Self::from_raw(RawRef::allocate(value, Some(pool)))
    }
}

impl<T: ?Sized> Strong<T> {
    /// Adopts a strong count already owned by the caller.
    pub(crate) fn from_raw(raw: RawRef<T>) -> Self {
        Self {
            raw: Some(raw),
            _owns: PhantomData,
        }
    }

    /// Creates an empty handle.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            raw: None,
            _owns: PhantomData,
        }
    }

    pub(crate) fn raw(&self) -> Option<RawRef<T>> {
        self.raw
    }

    /// Whether the handle refers to no value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }

    /// The value, or `None` if the handle is empty.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        let raw = self.raw?;

        // SAFETY: Our strong count keeps the value alive for as long as we are borrowed.
        Some(unsafe { raw.value.as_ref() })
    }

    /// Exclusive access to the value, if this is its only holder of any kind.
    ///
    /// Returns `None` if the handle is empty or if another strong or weak holder exists.
    #[must_use]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let mut raw = self.raw?;

        if raw.strong_count() != 1 || raw.weak_count() != 0 {
            return None;
        }

        // SAFETY: We are the only holder and `&mut self` guarantees nobody borrows through us.
        Some(unsafe { raw.value.as_mut() })
    }

    /// Number of strong holders of the value, or 0 if the handle is empty.
    #[must_use]
    pub fn strong_count(&self) -> i32 {
        self.raw.map_or(0, |raw| raw.strong_count())
    }

    /// Number of weak holders of the value, or 0 if the handle is empty.
    #[must_use]
    pub fn weak_count(&self) -> i32 {
        self.raw.map_or(0, |raw| raw.weak_count())
    }

    /// Releases the value, leaving the handle empty.
    pub fn reset(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: We owned a strong count and no longer refer to the value. Any borrow of
            // the value through us ended because `reset()` takes `&mut self`.
            unsafe {
                raw.release_strong();
            }
        }
    }

    /// Exchanges the values of two handles without touching any counters.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.raw, &mut other.raw);
    }

    /// Creates a weak holder of the same value. Empty if this handle is empty.
    #[must_use]
    pub fn downgrade(&self) -> Weak<T> {
        Weak::from(self)
    }

    /// Lends out the value for the duration of a call, holding an extra strong count so the
    /// value survives even if every other holder lets go in the meantime.
    ///
    /// Returns `None` if the handle is empty.
    #[must_use]
    pub fn borrow_scoped(&self) -> Option<ScopedBorrow<T>> {
        self.raw.map(ScopedBorrow::new)
    }

    /// A pointer to the value, or `None` if the handle is empty.
    #[must_use]
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.raw.map(|raw| raw.value)
    }

    /// Converts the handle into a handle to another view of the same value, typically a trait
    /// object, without touching any counters.
    ///
    /// An empty handle converts into an empty handle without calling `cast`.
    ///
    /// # Panics
    ///
    /// Panics if `cast` returns a reference to anything other than the value it was given.
    pub fn cast_with<U: ?Sized>(self, cast: impl FnOnce(&T) -> &U) -> Strong<U> {
        let Some(raw) = self.raw else {
            return Strong::empty();
        };

        // SAFETY: Our strong count keeps the value alive during the call.
        let target = NonNull::from(cast(unsafe { raw.value.as_ref() }));

        assert_same_value(raw.value, target);

        // Ownership of our strong count moves to the new handle.
        mem::forget(self);

        Strong::from_raw(raw.with_value(target))
    }

    /// Converts the handle back into a handle to the original concrete type of the value.
    ///
    /// # Errors
    ///
    /// Returns the handle unchanged if it is empty or if the value is not a `U`.
    pub fn downcast<U: RefCounted + 'static>(self) -> Result<Strong<U>, Self> {
        match self.raw {
            Some(raw) if raw.is::<U>() => {
                // Ownership of our strong count moves to the new handle.
                mem::forget(self);

                // SAFETY: The value is a `U` and our strong count keeps the memory allocated.
                Ok(Strong::from_raw(unsafe { RawRef::<U>::from_header(raw.header) }))
            }
            _ => Err(self),
        }
    }

    /// Borrows the value as its original concrete type.
    ///
    /// Returns `None` if the handle is empty or if the value is not a `U`.
    #[must_use]
    pub fn get_as<U: RefCounted + 'static>(&self) -> Option<&U> {
        let raw = self.raw.filter(|raw| raw.is::<U>())?;

        // SAFETY: The value is a `U`, kept alive by our strong count for as long as we are
        // borrowed.
        Some(unsafe { RawRef::<U>::from_header(raw.header).value.as_ref() })
    }
}

/// Asserts that a cast produced a view of the value it was given, not of something else.
pub(crate) fn assert_same_value<T: ?Sized, U: ?Sized>(source: NonNull<T>, target: NonNull<U>) {
    assert!(
        ptr::addr_eq(source.as_ptr(), target.as_ptr()),
        "a cast must return a reference to the value it was given"
    );
}

impl<T: ?Sized> Default for Strong<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> Clone for Strong<T> {
    fn clone(&self) -> Self {
        if let Some(raw) = self.raw {
            raw.increase_strong();
        }

        Self {
            raw: self.raw,
            _owns: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for Strong<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized> Deref for Strong<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
            .expect("dereferenced an empty Strong - check with get() or is_empty() first")
    }
}

impl<T: ?Sized> From<&Weak<T>> for Strong<T> {
    fn from(weak: &Weak<T>) -> Self {
        weak.lock()
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Strong<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f
                .debug_struct("Strong")
                .field("value", &value)
                .field("strong_count", &self.strong_count())
                .field("weak_count", &self.weak_count())
                .finish(),
            None => f.write_str("Strong(empty)"),
        }
    }
}

/// Identity of the value a handle refers to, independent of its static type.
pub(crate) fn identity<T: ?Sized>(raw: Option<RawRef<T>>) -> Option<NonNull<()>> {
    raw.map(|raw| raw.header.cast())
}

impl<T: ?Sized, U: ?Sized> PartialEq<Strong<U>> for Strong<T> {
    fn eq(&self, other: &Strong<U>) -> bool {
        identity(self.raw) == identity(other.raw)
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Weak<U>> for Strong<T> {
    fn eq(&self, other: &Weak<U>) -> bool {
        identity(self.raw) == identity(other.raw())
    }
}

impl<T: ?Sized> Eq for Strong<T> {}

impl<T: ?Sized> Hash for Strong<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        identity(self.raw).hash(state);
    }
}
