//! Append-only concurrent lists.
//!
//! Two shapes of the same protocol sit here:
//!
//! - [`AppendList<T>`] keeps heap-allocated records and hands out stable
//!   references; the call-graph node table is one of these.
//! - [`IndexList`] keeps bare machine words (node indices) in insertion
//!   order; the per-file node lists are these.
//!
//! Both publish an entry with a release store into the slot claimed by a
//! reservation, so a reader that can see the entry through an index map also
//! sees its contents. Slots claimed but not yet published read as empty and
//! are skipped by iteration.

use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use super::array::{ConcurrentArray, Storage, DEFAULT_CAPACITY};
use super::iter::Indices;
use super::set::EMPTY;
use crate::sync::RcuGuard;

/// An append-only list of boxed records.
///
/// Records never move once published: growth copies the pointers, not the
/// pointees, which is what lets [`get`](AppendList::get) tie its result to
/// the lifetime of the list instead of the reader region.
pub struct AppendList<T> {
    contents: ConcurrentArray<Boxes<T>>,
}

struct Boxes<T>(std::marker::PhantomData<T>);

impl<T> Storage for Boxes<T> {
    type Slot = AtomicPtr<T>;

    fn new_slot() -> AtomicPtr<T> {
        AtomicPtr::new(std::ptr::null_mut())
    }

    fn migrate(src: &[AtomicPtr<T>], dest: &mut [AtomicPtr<T>]) {
        // Growth happens when every slot is claimed, so each source slot is
        // either published or about to be; wait out the stragglers.
        for (from, to) in src.iter().zip(dest.iter_mut()) {
            let mut record = from.load(Ordering::Acquire);
            while record.is_null() {
                std::hint::spin_loop();
                record = from.load(Ordering::Acquire);
            }
            *to.get_mut() = record;
        }
    }

    unsafe fn drop_slot(slot: &mut AtomicPtr<T>) {
        let record = *slot.get_mut();
        if !record.is_null() {
            drop(unsafe { Box::from_raw(record) });
        }
    }
}

impl<T> AppendList<T> {
    /// Creates an empty list with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty list with `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        AppendList {
            contents: ConcurrentArray::with_capacity(capacity),
        }
    }

    /// Appends a record and returns its index.
    ///
    /// Indices are dense and stable for the lifetime of the list.
    pub fn push(&self, region: &mut RcuGuard<'_>, record: Box<T>) -> usize {
        let index = self.contents.reserve(region, 1.0);
        let slots = self.contents.slots(region);
        slots[index].store(Box::into_raw(record), Ordering::Release);
        index
    }

    /// Returns the record at `index`, if it has been published.
    ///
    /// The reference stays valid as long as the list itself: records are
    /// never freed before the list is dropped. The region is only needed to
    /// read the slot.
    pub fn get<'l>(&'l self, region: &RcuGuard<'_>, index: usize) -> Option<&'l T> {
        let slots = self.contents.slots(region);
        if index >= slots.len() {
            return None;
        }
        let record = slots[index].load(Ordering::Acquire);
        if record.is_null() {
            None
        } else {
            // SAFETY: published records are owned by the list and freed
            // only on drop, which the 'l borrow excludes.
            Some(unsafe { &*record })
        }
    }

    /// Number of appended records, including ones not yet published.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Returns true if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

impl<T> Default for AppendList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An append-only list of node indices in insertion order.
///
/// Unpublished slots hold the reserved all-ones word and are skipped by
/// iteration.
pub struct IndexList {
    contents: ConcurrentArray<Slots>,
}

struct Slots;

impl Storage for Slots {
    type Slot = AtomicUsize;

    fn new_slot() -> AtomicUsize {
        AtomicUsize::new(EMPTY)
    }

    fn migrate(src: &[AtomicUsize], dest: &mut [AtomicUsize]) {
        // Same as the record list: every slot is claimed by the time the
        // backing is full, so each one will be published shortly.
        for (from, to) in src.iter().zip(dest.iter_mut()) {
            let mut value = from.load(Ordering::Acquire);
            while value == EMPTY {
                std::hint::spin_loop();
                value = from.load(Ordering::Acquire);
            }
            *to.get_mut() = value;
        }
    }

    unsafe fn drop_slot(_slot: &mut AtomicUsize) {}
}

impl IndexList {
    /// Creates an empty list with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty list with `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        IndexList {
            contents: ConcurrentArray::with_capacity(capacity),
        }
    }

    /// Appends an index.
    ///
    /// # Panics
    ///
    /// Panics if `value` is the reserved all-ones word.
    pub fn push(&self, region: &mut RcuGuard<'_>, value: usize) {
        assert_ne!(value, EMPTY, "the all-ones index is reserved");
        let index = self.contents.reserve(region, 1.0);
        let slots = self.contents.slots(region);
        slots[index].store(value, Ordering::Release);
    }

    /// Iterates over the published indices, in insertion order.
    pub fn iter<'a>(&'a self, region: &'a RcuGuard<'_>) -> Indices<'a> {
        let slots = self.contents.slots(region);
        let published = self.contents.len().min(slots.len());
        Indices::over(&slots[..published])
    }

    /// Number of appended indices, including ones not yet published.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Returns true if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

impl Default for IndexList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::RcuThread;

    #[test]
    fn test_push_get_roundtrip() {
        let rcu = RcuThread::register();
        let mut region = rcu.read_lock();
        let list: AppendList<String> = AppendList::with_capacity(4);

        let a = list.push(&mut region, Box::new("alpha".to_string()));
        let b = list.push(&mut region, Box::new("beta".to_string()));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(list.get(&region, a).unwrap(), "alpha");
        assert_eq!(list.get(&region, b).unwrap(), "beta");
        assert!(list.get(&region, 2).is_none());
    }

    #[test]
    fn test_records_survive_growth() {
        let rcu = RcuThread::register();
        let mut region = rcu.read_lock();
        let list: AppendList<usize> = AppendList::with_capacity(4);

        for i in 0..40 {
            assert_eq!(list.push(&mut region, Box::new(i * 3)), i);
        }
        for i in 0..40 {
            assert_eq!(*list.get(&region, i).unwrap(), i * 3);
        }
        assert_eq!(list.len(), 40);
    }

    #[test]
    fn test_index_list_keeps_insertion_order() {
        let rcu = RcuThread::register();
        let mut region = rcu.read_lock();
        let list = IndexList::with_capacity(4);

        for value in [5, 1, 9, 1, 7] {
            list.push(&mut region, value);
        }
        let seen: Vec<usize> = list.iter(&region).collect();
        assert_eq!(seen, vec![5, 1, 9, 1, 7]);
    }
}
