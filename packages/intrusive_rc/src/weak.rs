use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::ptr::NonNull;

use crate::strong::{assert_same_value, identity};
use crate::{RawRef, RefCounted, ScopedBorrow, Strong};

/// A weak observer of a reference-counted value.
///
/// A `Weak` does not keep the value alive, only the memory that holds its counters, so it can
/// tell whether the value still exists and, if it does, [lock][Self::lock] it into a new
/// [`Strong`] holder. Once the last strong holder is gone the `Weak` is expired: locking it
/// yields an empty handle, while the counters stay readable until the `Weak` is dropped,
/// [reset][Self::reset] or [refreshed][Self::refresh].
///
/// An empty `Weak` (the [`Default`]) counts as expired.
///
/// # Examples
///
/// ```
/// use intrusive_rc::{RefCounted, Strong};
///
/// struct Texture {
///     id: u32,
/// }
///
/// impl RefCounted for Texture {}
///
/// let texture = Strong::new(Texture { id: 4 });
/// let mut weak = texture.downgrade();
///
/// assert_eq!(weak.lock().id, 4);
///
/// drop(texture);
/// assert!(weak.is_expired());
/// assert!(weak.lock().is_empty());
///
/// // Lets go of the memory held for the expired value.
/// assert!(!weak.refresh());
/// assert_eq!(weak.weak_count(), 0);
/// ```
pub struct Weak<T: ?Sized> {
    raw: Option<RawRef<T>>,
}

impl<T: ?Sized> Weak<T> {
    /// Creates an empty handle.
    #[must_use]
    pub const fn empty() -> Self {
        Self { raw: None }
    }

    pub(crate) fn raw(&self) -> Option<RawRef<T>> {
        self.raw
    }

    /// Whether the value is gone, either because its last strong holder was released or
    /// because the handle is empty.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.raw.is_none_or(|raw| raw.is_expired())
    }

    /// Whether the value is still alive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired()
    }

    /// Number of strong holders of the value, or 0 if the handle is empty.
    #[must_use]
    pub fn strong_count(&self) -> i32 {
        self.raw.map_or(0, |raw| raw.strong_count())
    }

    /// Number of weak holders of the value (this one included), or 0 if the handle is empty.
    ///
    /// Remains readable after the value has expired.
    #[must_use]
    pub fn weak_count(&self) -> i32 {
        self.raw.map_or(0, |raw| raw.weak_count())
    }

    /// Obtains a new strong holder of the value, or an empty handle if the value is gone.
    #[must_use]
    pub fn lock(&self) -> Strong<T> {
        match self.raw {
            Some(raw) if !raw.is_expired() => {
                raw.increase_strong();
                Strong::from_raw(raw)
            }
            _ => Strong::empty(),
        }
    }

    /// Lets go of an expired value, leaving the handle empty.
    ///
    /// Returns whether the value is still alive. The handle is left untouched if it is.
    pub fn refresh(&mut self) -> bool {
        if self.is_valid() {
            return true;
        }

        self.reset();
        false
    }

    /// Stops observing the value, leaving the handle empty.
    pub fn reset(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: We owned a weak count and no longer refer to the value.
            unsafe {
                raw.release_weak();
            }
        }
    }

    /// Exchanges the values of two handles.
    ///
    /// Both handles are [refreshed][Self::refresh] first, so neither ends up holding on to
    /// the memory of an expired value.
    pub fn swap(&mut self, other: &mut Self) {
        self.refresh();
        other.refresh();

        mem::swap(&mut self.raw, &mut other.raw);
    }

    /// Lends out the value for the duration of a call, holding a strong count so the value
    /// survives even if every strong holder lets go in the meantime.
    ///
    /// Returns `None` if the value is gone.
    #[must_use]
    pub fn borrow_scoped(&self) -> Option<ScopedBorrow<T>> {
        self.raw
            .filter(|raw| !raw.is_expired())
            .map(ScopedBorrow::new)
    }

    /// Converts the handle into a handle to another view of the same value, typically a trait
    /// object.
    ///
    /// An expired or empty handle converts into an empty handle without calling `cast`.
    ///
    /// # Panics
    ///
    /// Panics if `cast` returns a reference to anything other than the value it was given.
    pub fn cast_with<U: ?Sized>(mut self, cast: impl FnOnce(&T) -> &U) -> Weak<U> {
        if !self.refresh() {
            return Weak::empty();
        }

        let Some(raw) = self.raw else {
            return Weak::empty();
        };

        // The value must survive the call even if `cast` releases its last strong holder.
        let borrow = ScopedBorrow::new(raw);
        let target = NonNull::from(cast(&*borrow));
        assert_same_value(raw.value, target);
        drop(borrow);

        // Ownership of our weak count moves to the new handle.
        self.raw = None;

        Weak {
            raw: Some(raw.with_value(target)),
        }
    }

    /// Converts the handle back into a handle to the original concrete type of the value.
    ///
    /// # Errors
    ///
    /// Returns the handle unchanged if it is empty or if the value is not a `U`. Type
    /// information outlives the value, so an expired handle can still be converted.
    pub fn downcast<U: RefCounted + 'static>(mut self) -> Result<Weak<U>, Self> {
        match self.raw {
            Some(raw) if raw.is::<U>() => {
                self.raw = None;

                // SAFETY: The value is a `U` and our weak count keeps the memory allocated.
                Ok(Weak {
                    raw: Some(unsafe { RawRef::<U>::from_header(raw.header) }),
                })
            }
            _ => Err(self),
        }
    }
}

impl<T: ?Sized> Default for Weak<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> From<&Strong<T>> for Weak<T> {
    fn from(strong: &Strong<T>) -> Self {
        let raw = strong.raw();

        if let Some(raw) = raw {
            raw.increase_weak();
        }

        Self { raw }
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    /// Cloning an expired handle yields an empty handle, so the copy does not hold on to the
    /// memory of a value that is already gone.
    fn clone(&self) -> Self {
        match self.raw {
            Some(raw) if !raw.is_expired() => {
                raw.increase_weak();
                Self { raw: Some(raw) }
            }
            _ => Self::empty(),
        }
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw {
            Some(raw) => f
                .debug_struct("Weak")
                .field("type_name", &raw.type_name())
                .field("strong_count", &raw.strong_count())
                .field("weak_count", &raw.weak_count())
                .finish(),
            None => f.write_str("Weak(empty)"),
        }
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Weak<U>> for Weak<T> {
    fn eq(&self, other: &Weak<U>) -> bool {
        identity(self.raw) == identity(other.raw)
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Strong<U>> for Weak<T> {
    fn eq(&self, other: &Strong<U>) -> bool {
        identity(self.raw) == identity(other.raw())
    }
}

impl<T: ?Sized> Eq for Weak<T> {}

impl<T: ?Sized> Hash for Weak<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        identity(self.raw).hash(state);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::fmt::Display;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(Weak<Node>: Clone, Default, fmt::Debug, Eq, Hash);
    assert_not_impl_any!(Weak<Node>: Send, Sync);

    #[derive(Debug)]
    struct Node {
        value: u32,
        this: RefCell<Weak<Node>>,
        drops: Rc<Cell<u32>>,
    }

    impl Node {
        fn new(value: u32, drops: &Rc<Cell<u32>>) -> Self {
            Self {
                value,
                this: RefCell::new(Weak::empty()),
                drops: Rc::clone(drops),
            }
        }
    }

    impl RefCounted for Node {
        fn on_last_strong_released(&mut self) {
            // Nothing can be locked any more from inside the hook.
            assert!(self.this.get_mut().lock().is_empty());
            self.this.get_mut().reset();
        }
    }

    impl Drop for Node {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    impl Display for Node {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "node {}", self.value)
        }
    }

    fn drops() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn downgrade_counts_weak_holders() {
        let drops = drops();
        let strong = Strong::new(Node::new(1, &drops));

        let weak = strong.downgrade();
        assert_eq!(strong.strong_count(), 1);
        assert_eq!(strong.weak_count(), 1);
        assert!(weak.is_valid());
        assert_eq!(weak, strong);

        let lock = weak.lock();
        assert_eq!(lock.value, 1);
        assert_eq!(weak.strong_count(), 2);
    }

    #[test]
    fn weak_does_not_keep_value_alive() {
        let drops = drops();
        let strong = Strong::new(Node::new(1, &drops));
        let weak = strong.downgrade();

        drop(strong);

        assert_eq!(drops.get(), 1);
        assert!(weak.is_expired());
        assert!(!weak.is_valid());
        assert!(weak.lock().is_empty());
        assert!(weak.borrow_scoped().is_none());

        // Counters remain readable after expiry.
        assert_eq!(weak.strong_count(), 0);
        assert_eq!(weak.weak_count(), 1);
    }

    #[test]
    fn refresh_lets_go_of_expired_memory() {
        let drops = drops();
        let strong = Strong::new(Node::new(1, &drops));
        let mut w1 = strong.downgrade();
        let mut w2 = strong.downgrade();
        assert_eq!(w1.weak_count(), 2);

        drop(strong);
        assert_eq!(w1.weak_count(), 2);

        assert!(!w1.refresh());
        assert!(w1.raw().is_none());
        assert_eq!(w2.weak_count(), 1);

        assert!(!w2.refresh());
        assert_eq!(w2.weak_count(), 0);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn refresh_of_live_value_keeps_handle() {
        let drops = drops();
        let strong = Strong::new(Node::new(1, &drops));
        let mut weak = strong.downgrade();

        assert!(weak.refresh());
        assert_eq!(weak, strong);
    }

    #[test]
    fn empty_weak_is_expired() {
        let mut weak = Weak::<Node>::default();

        assert!(weak.is_expired());
        assert!(weak.lock().is_empty());
        assert_eq!(weak.strong_count(), 0);
        assert_eq!(weak.weak_count(), 0);
        assert!(!weak.refresh());
        assert_eq!(format!("{weak:?}"), "Weak(empty)");
    }

    #[test]
    fn clone_of_expired_is_empty() {
        let drops = drops();
        let strong = Strong::new(Node::new(1, &drops));
        let weak = strong.downgrade();

        let live_copy = weak.clone();
        assert_eq!(weak.weak_count(), 2);

        drop(strong);

        let expired_copy = weak.clone();
        assert!(expired_copy.raw().is_none());
        assert_eq!(weak.weak_count(), 2);

        drop(live_copy);
        assert_eq!(weak.weak_count(), 1);
    }

    #[test]
    fn swap_refreshes_both_sides() {
        let drops = drops();
        let alive = Strong::new(Node::new(1, &drops));
        let doomed = Strong::new(Node::new(2, &drops));

        let mut a = alive.downgrade();
        let mut b = doomed.downgrade();
        drop(doomed);

        a.swap(&mut b);

        assert!(a.raw().is_none());
        assert_eq!(b, alive);
        assert_eq!(alive.weak_count(), 1);
    }

    #[test]
    fn hook_may_release_own_weak_handle() {
        let drops = drops();
        let strong = Strong::new(Node::new(1, &drops));
        *strong.this.borrow_mut() = strong.downgrade();
        assert_eq!(strong.weak_count(), 1);

        // The only weak holder is the value itself, released from within the hook.
        drop(strong);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn strong_from_weak_locks() {
        let drops = drops();
        let strong = Strong::new(Node::new(1, &drops));
        let weak = strong.downgrade();

        let locked = Strong::from(&weak);
        assert_eq!(locked, strong);
        assert_eq!(strong.strong_count(), 2);
    }

    #[test]
    fn cast_with_preserves_weak_count() {
        let drops = drops();
        let strong = Strong::new(Node::new(5, &drops));
        let weak = strong.downgrade();

        let display: Weak<dyn Display> = weak.cast_with(|node| node as &dyn Display);

        assert_eq!(strong.weak_count(), 1);
        assert_eq!(strong.strong_count(), 1);
        assert_eq!(display.lock().to_string(), "node 5");
        assert_eq!(display, strong);

        let node = display.downcast::<Node>().ok().unwrap();
        assert_eq!(node.lock().value, 5);
    }

    #[test]
    fn cast_of_expired_is_empty() {
        let drops = drops();
        let strong = Strong::new(Node::new(5, &drops));
        let weak = strong.downgrade();
        drop(strong);

        let display: Weak<dyn Display> = weak.cast_with(|_| unreachable!());
        assert!(display.raw().is_none());
    }

    #[test]
    fn downcast_of_expired_keeps_counts_readable() {
        let drops = drops();
        let strong = Strong::new(Node::new(5, &drops));
        let weak: Weak<dyn Display> = strong.downgrade().cast_with(|node| node as &dyn Display);
        drop(strong);

        let node = weak.downcast::<Node>().ok().unwrap();
        assert!(node.is_expired());
        assert_eq!(node.weak_count(), 1);
    }

    #[test]
    fn debug_shows_counts_and_type() {
        let drops = drops();
        let strong = Strong::new(Node::new(5, &drops));
        let weak = strong.downgrade();

        let text = format!("{weak:?}");
        assert!(text.contains("Node"));
        assert!(text.contains("strong_count: 1"));
        assert!(text.contains("weak_count: 1"));
    }
}
