//! C1: Handle Kernel.
//!
//! A typed, parent-scoped, reference-counted wrapper over an opaque native
//! handle. Destruction invokes a type-specialized native destructor and is
//! guaranteed to run before the parent's, because the handle holds a strong
//! `Arc` reference to the parent for the whole of its lifetime.

use std::fmt;
use std::sync::Arc;

/// A native destructor for `Native`, given the handle's parent.
///
/// Implemented per native type rather than as a trait on `Native` itself,
/// since the native types here (`vk::Buffer`, `vk::ImageView`, ...) are
/// bare integer-wrapper types with no room to attach behavior.
pub trait NativeDestroy<Parent>: Copy {
    fn destroy(self, parent: &Parent);
}

/// Owning, refcounted wrapper over a native handle plus the parent required
/// to destroy it. Not copyable by value; shareable via `clone` (which bumps
/// the inner `Arc`'s refcount, matching the source's reference-counted
/// handle semantics).
pub struct Handle<Native, Parent>
where
    Native: NativeDestroy<Parent>,
{
    inner: Arc<Inner<Native, Parent>>,
}

struct Inner<Native, Parent>
where
    Native: NativeDestroy<Parent>,
{
    native: Native,
    parent: Arc<Parent>,
}

impl<Native, Parent> Handle<Native, Parent>
where
    Native: NativeDestroy<Parent>,
{
    /// Constructing with a handle whose parent is not yet fully initialized
    /// is a program error; since `parent` here is always a live `Arc`, that
    /// invariant is enforced by the type system rather than a runtime check.
    pub fn create(native: Native, parent: Arc<Parent>) -> Self {
        Handle {
            inner: Arc::new(Inner { native, parent }),
        }
    }

    pub fn native(&self) -> Native {
        self.inner.native
    }

    pub fn parent(&self) -> &Parent {
        &self.inner.parent
    }

    /// Number of live references to this handle.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<Native, Parent> Clone for Handle<Native, Parent>
where
    Native: NativeDestroy<Parent>,
{
    fn clone(&self) -> Self {
        Handle {
            inner: self.inner.clone(),
        }
    }
}

impl<Native, Parent> Drop for Inner<Native, Parent>
where
    Native: NativeDestroy<Parent>,
{
    fn drop(&mut self) {
        self.native.destroy(&self.parent);
    }
}

impl<Native, Parent> fmt::Debug for Handle<Native, Parent>
where
    Native: NativeDestroy<Parent> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("native", &self.inner.native)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Parent {
        drops: Cell<u32>,
    }

    #[derive(Clone, Copy, Debug)]
    struct Fake(u32);

    impl NativeDestroy<Parent> for Fake {
        fn destroy(self, parent: &Parent) {
            parent.drops.set(parent.drops.get() + 1);
        }
    }

    #[test]
    fn destructor_runs_on_last_drop() {
        let parent = Arc::new(Parent {
            drops: Cell::new(0),
        });
        let a = Handle::create(Fake(1), parent.clone());
        let b = a.clone();
        assert_eq!(a.ref_count(), 2);
        drop(a);
        assert_eq!(parent.drops.get(), 0);
        drop(b);
        assert_eq!(parent.drops.get(), 1);
    }

    #[test]
    fn parent_outlives_handle() {
        let parent = Arc::new(Parent {
            drops: Cell::new(0),
        });
        let handle = Handle::create(Fake(7), parent.clone());
        drop(parent);
        assert_eq!(handle.native().0, 7);
    }
}
