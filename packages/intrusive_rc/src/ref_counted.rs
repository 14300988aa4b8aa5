/// A type whose values can be owned by [`Strong`][crate::Strong] and observed by
/// [`Weak`][crate::Weak] handles.
///
/// Implementing the trait opts a type into reference counting. The only customization point is
/// the teardown hook, which runs when the last strong holder lets go, before the value is
/// dropped. Weak holders may still exist at that point and will observe the value as expired
/// from then on.
///
/// Everything the value owns is released at that same point. Fields such as [`Strong`] handles
/// to child values are dropped with the value when its last strong holder lets go, not when
/// its last [`Weak`] holder does. Only the memory block holding the counters is kept until the
/// weak holders are gone.
///
/// [`Strong`]: crate::Strong
/// [`Weak`]: crate::Weak
///
/// # Examples
///
/// ```
/// use std::cell::RefCell;
///
/// use intrusive_rc::{RefCounted, Strong, Weak};
///
/// struct Node {
///     parent: RefCell<Weak<Node>>,
/// }
///
/// impl RefCounted for Node {
///     fn on_last_strong_released(&mut self) {
///         // Safe even if this was the last holder of any kind: the memory outlives the hook.
///         self.parent.get_mut().reset();
///     }
/// }
///
/// let parent = Strong::new(Node {
///     parent: RefCell::new(Weak::default()),
/// });
/// *parent.parent.borrow_mut() = parent.downgrade();
///
/// assert_eq!(parent.weak_count(), 1);
/// drop(parent);
/// ```
pub trait RefCounted {
    /// Runs once, when the last strong holder of the value is released.
    ///
    /// The value is dropped right after this returns. The hook may freely release weak
    /// handles, including handles to this very value; attempting to obtain a new strong handle
    /// to this value yields an empty handle.
    #[cfg_attr(test, mutants::skip)] // Default is a no-op.
    fn on_last_strong_released(&mut self) {}
}
