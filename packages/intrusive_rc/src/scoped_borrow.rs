use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

use crate::{RawRef, Strong};

/// Temporary access to a reference-counted value, holding one strong count for as long as the
/// borrow lives.
///
/// Obtained from [`Strong::borrow_scoped()`] or
/// [`Weak::borrow_scoped()`][crate::Weak::borrow_scoped]. The
/// extra count keeps the value alive even if the handle it was borrowed from, or every other
/// holder, lets go of the value while the borrow is in use, for example from a callback that
/// clears the container the handle lives in.
///
/// Unlike a [`Strong`], a borrow is never empty and cannot be cloned.
///
/// # Examples
///
/// ```
/// use std::cell::RefCell;
///
/// use intrusive_rc::{RefCounted, Strong};
///
/// struct Listener {
///     name: &'static str,
/// }
///
/// impl RefCounted for Listener {}
///
/// let listeners = RefCell::new(vec![Strong::new(Listener { name: "first" })]);
///
/// let borrowed = listeners.borrow()[0].borrow_scoped().unwrap();
/// listeners.borrow_mut().clear();
///
/// // Still alive: the borrow holds its own strong count.
/// assert_eq!(borrowed.name, "first");
/// ```
pub struct ScopedBorrow<T: ?Sized> {
    raw: RawRef<T>,

    // Drop check: we may drop a T.
    _owns: PhantomData<T>,
}

impl<T: ?Sized> ScopedBorrow<T> {
    /// Takes a new strong count on a live value.
    pub(crate) fn new(raw: RawRef<T>) -> Self {
        raw.increase_strong();

        Self {
            raw,
            _owns: PhantomData,
        }
    }

    /// Creates a full strong holder of the borrowed value.
    #[must_use]
    pub fn to_strong(&self) -> Strong<T> {
        self.raw.increase_strong();
        Strong::from_raw(self.raw)
    }
}

impl<T: ?Sized> Deref for ScopedBorrow<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: Our strong count keeps the value alive for as long as we are borrowed.
        unsafe { self.raw.value.as_ref() }
    }
}

impl<T: ?Sized> Drop for ScopedBorrow<T> {
    fn drop(&mut self) {
        // SAFETY: We own a strong count. Any reference handed out through `Deref` borrowed
        // from us and has therefore ended.
        unsafe {
            self.raw.release_strong();
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ScopedBorrow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedBorrow")
            .field("value", &&**self)
            .field("strong_count", &self.raw.strong_count())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::RefCounted;

    assert_not_impl_any!(ScopedBorrow<Tracked>: Send, Sync, Clone);

    #[derive(Debug)]
    struct Tracked {
        value: u32,
        drops: Rc<Cell<u32>>,
    }

    impl RefCounted for Tracked {}

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    fn tracked(value: u32) -> (Strong<Tracked>, Rc<Cell<u32>>) {
        let drops = Rc::new(Cell::new(0));

        let strong = Strong::new(Tracked {
            value,
            drops: Rc::clone(&drops),
        });

        (strong, drops)
    }

    #[test]
    fn borrow_adds_strong_count_while_alive() {
        let (strong, _drops) = tracked(1);

        let borrow = strong.borrow_scoped().unwrap();
        assert_eq!(strong.strong_count(), 2);
        assert_eq!(borrow.value, 1);

        drop(borrow);
        assert_eq!(strong.strong_count(), 1);
    }

    #[test]
    fn borrow_keeps_value_alive_after_holders_let_go() {
        let (strong, drops) = tracked(1);
        let holder = RefCell::new(Some(strong));

        let borrow = holder.borrow().as_ref().unwrap().borrow_scoped().unwrap();
        *holder.borrow_mut() = None;

        assert_eq!(drops.get(), 0);
        assert_eq!(borrow.value, 1);
        assert_eq!(borrow.raw.strong_count(), 1);

        drop(borrow);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn borrow_from_weak() {
        let (strong, _drops) = tracked(2);
        let weak = strong.downgrade();

        let borrow = weak.borrow_scoped().unwrap();
        drop(strong);

        assert!(weak.is_valid());
        assert_eq!(borrow.value, 2);

        drop(borrow);
        assert!(weak.is_expired());
    }

    #[test]
    fn to_strong_outlives_borrow() {
        let (strong, _drops) = tracked(3);

        let copy = {
            let borrow = strong.borrow_scoped().unwrap();
            borrow.to_strong()
        };

        assert_eq!(copy, strong);
        assert_eq!(strong.strong_count(), 2);
    }

    #[test]
    fn empty_strong_has_nothing_to_borrow() {
        assert!(Strong::<Tracked>::empty().borrow_scoped().is_none());
    }

    #[test]
    fn debug_shows_value() {
        let (strong, _drops) = tracked(4);
        let borrow = strong.borrow_scoped().unwrap();

        assert!(format!("{borrow:?}").contains("value: 4"));
    }
}
