//! The published-pointer cell used to swap container backing storage.

use std::sync::atomic::{AtomicPtr, Ordering};

/// An atomic pointer with publish semantics.
///
/// A `RcuCell` holds the current backing storage of a concurrent container.
/// The single writer that holds the container's exclusive mutation right
/// publishes a fresh allocation with [`store`](RcuCell::store) (release) or
/// [`swap`](RcuCell::swap); readers observe it with [`load`](RcuCell::load)
/// (acquire). The old allocation may be freed only after a grace period,
/// which is what makes the unsynchronized reader loads safe.
pub struct RcuCell<T> {
    ptr: AtomicPtr<T>,
}

impl<T> RcuCell<T> {
    /// Creates a cell holding `ptr`.
    pub fn new(ptr: *mut T) -> Self {
        RcuCell {
            ptr: AtomicPtr::new(ptr),
        }
    }

    /// Loads the published pointer.
    ///
    /// Pairs with [`store`](RcuCell::store): a reader that observes a
    /// pointer also observes every write made to the pointee before it was
    /// published.
    pub fn load(&self) -> *mut T {
        self.ptr.load(Ordering::Acquire)
    }

    /// Loads the pointer without ordering.
    ///
    /// Only the writer that holds the exclusive mutation right may use
    /// this; it already synchronizes with itself.
    pub fn load_owner(&self) -> *mut T {
        self.ptr.load(Ordering::Relaxed)
    }

    /// Publishes `ptr`, making it visible to subsequent [`load`](RcuCell::load)s.
    pub fn store(&self, ptr: *mut T) {
        self.ptr.store(ptr, Ordering::Release);
    }

    /// Publishes `ptr` and returns the previously published pointer.
    ///
    /// The returned pointer may still be in use by readers inside their
    /// regions; it must not be freed before a grace period has elapsed.
    pub fn swap(&self, ptr: *mut T) -> *mut T {
        self.ptr.swap(ptr, Ordering::AcqRel)
    }
}

// The cell hands out raw pointers; the containers built on top of it are
// responsible for when the pointee may be dereferenced or freed.
unsafe impl<T: Send + Sync> Send for RcuCell<T> {}
unsafe impl<T: Send + Sync> Sync for RcuCell<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_load_roundtrip() {
        let boxed = Box::into_raw(Box::new(7usize));
        let cell: RcuCell<usize> = RcuCell::new(std::ptr::null_mut());
        assert!(cell.load().is_null());

        cell.store(boxed);
        assert_eq!(cell.load(), boxed);
        assert_eq!(cell.load_owner(), boxed);

        let old = cell.swap(std::ptr::null_mut());
        assert_eq!(old, boxed);
        assert!(cell.load().is_null());

        unsafe { drop(Box::from_raw(boxed)) };
    }
}
