//! An open-addressed concurrent set of machine words.
//!
//! Keys are node indices. The table uses linear probing over a
//! power-of-two backing with two reserved words: all-ones marks an empty
//! slot, all-ones minus one fences a slot off while the backing is being
//! rehashed into a larger allocation. Growth triggers at a load factor of
//! 3/4, which keeps probe sequences bounded.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use rustc_hash::FxHasher;

use super::array::{ConcurrentArray, Storage, DEFAULT_CAPACITY};
use super::iter::Indices;
use crate::sync::RcuGuard;

/// Reserved word marking an empty slot. Never a valid key.
pub const EMPTY: usize = usize::MAX;

/// Reserved word marking a slot fenced off by an in-progress rehash.
/// A writer or reader that observes it retries against the republished
/// backing.
pub(crate) const FENCED: usize = usize::MAX - 1;

/// Table load factor; growth triggers once 3 slots in 4 are claimed.
const LOAD_FACTOR: f64 = 0.75;

pub(crate) fn hash_word(value: usize) -> usize {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish() as usize
}

/// An unordered concurrent set of node indices.
///
/// Inserts and membership tests are lock-free; the only waiting happens
/// when an insert lands in the middle of a concurrent rehash, and is
/// bounded by the rehash itself.
pub struct IndexSet {
    contents: ConcurrentArray<Table>,
}

struct Table;

impl Storage for Table {
    type Slot = AtomicUsize;

    fn new_slot() -> AtomicUsize {
        AtomicUsize::new(EMPTY)
    }

    fn migrate(src: &[AtomicUsize], dest: &mut [AtomicUsize]) {
        let mask = dest.len() - 1;
        for slot in src {
            // Fence the slot off so no late insert can claim it behind the
            // rehash; a concurrent writer that loses this race retries on
            // the new backing once it is published.
            let key = loop {
                let key = slot.load(Ordering::Acquire);
                if key != EMPTY {
                    break key;
                }
                if slot
                    .compare_exchange(EMPTY, FENCED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    break EMPTY;
                }
            };
            if key == EMPTY {
                continue;
            }

            let mut i = hash_word(key).wrapping_sub(1);
            loop {
                i = i.wrapping_add(1) & mask;
                if *dest[i].get_mut() == EMPTY {
                    *dest[i].get_mut() = key;
                    break;
                }
            }
        }
    }

    unsafe fn drop_slot(_slot: &mut AtomicUsize) {}
}

impl IndexSet {
    /// Creates an empty set with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty set with `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        IndexSet {
            contents: ConcurrentArray::with_capacity(capacity),
        }
    }

    /// Inserts `value`. Returns false if it was already present.
    ///
    /// Exactly one of any number of concurrent inserts of the same value
    /// returns true.
    ///
    /// # Panics
    ///
    /// Panics if `value` is one of the two reserved words.
    pub fn insert(&self, region: &mut RcuGuard<'_>, value: usize) -> bool {
        assert!(value < FENCED, "index collides with a reserved word");
        self.contents.reserve(region, LOAD_FACTOR);

        'table: loop {
            let slots = self.contents.slots(region);
            let mask = slots.len() - 1;
            let mut i = hash_word(value).wrapping_sub(1);
            loop {
                i = i.wrapping_add(1) & mask;
                let mut current = slots[i].load(Ordering::Acquire);
                loop {
                    if current == FENCED {
                        // Rehash in progress; wait for the new backing.
                        std::hint::spin_loop();
                        continue 'table;
                    }
                    if current == value {
                        self.contents.drop_reservation();
                        return false;
                    }
                    if current != EMPTY {
                        // Occupied by some other key; keep probing.
                        break;
                    }
                    match slots[i].compare_exchange(
                        EMPTY,
                        value,
                        Ordering::Release,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return true,
                        // Another inserter won this slot; re-examine it.
                        Err(changed) => current = changed,
                    }
                }
            }
        }
    }

    /// Returns true if `value` is in the set.
    pub fn contains(&self, region: &RcuGuard<'_>, value: usize) -> bool {
        'table: loop {
            let slots = self.contents.slots(region);
            let mask = slots.len() - 1;
            let mut i = hash_word(value).wrapping_sub(1);
            loop {
                i = i.wrapping_add(1) & mask;
                let current = slots[i].load(Ordering::Relaxed);
                if current == value {
                    return true;
                }
                if current == EMPTY {
                    return false;
                }
                if current == FENCED {
                    std::hint::spin_loop();
                    continue 'table;
                }
            }
        }
    }

    /// Iterates over the members, in unspecified order.
    pub fn iter<'a>(&'a self, region: &'a RcuGuard<'_>) -> Indices<'a> {
        Indices::over(self.contents.slots(region))
    }

    /// Number of members, counting in-flight inserts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Returns true if the set has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

impl Default for IndexSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::RcuThread;

    #[test]
    fn test_insert_and_contains() {
        let rcu = RcuThread::register();
        let mut region = rcu.read_lock();
        let set = IndexSet::with_capacity(4);

        assert!(set.insert(&mut region, 3));
        assert!(set.contains(&region, 3));
        assert!(!set.contains(&region, 4));
    }

    #[test]
    fn test_duplicate_insert_returns_false() {
        let rcu = RcuThread::register();
        let mut region = rcu.read_lock();
        let set = IndexSet::with_capacity(4);

        assert!(set.insert(&mut region, 9));
        assert!(!set.insert(&mut region, 9));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_members_survive_growth() {
        let rcu = RcuThread::register();
        let mut region = rcu.read_lock();
        let set = IndexSet::with_capacity(4);

        for value in 0..64 {
            assert!(set.insert(&mut region, value * 7));
        }
        for value in 0..64 {
            assert!(set.contains(&region, value * 7));
            assert!(!set.contains(&region, value * 7 + 1));
        }

        let mut seen: Vec<usize> = set.iter(&region).collect();
        seen.sort_unstable();
        let expected: Vec<usize> = (0..64).map(|v| v * 7).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    #[should_panic(expected = "reserved word")]
    fn test_reserved_word_rejected() {
        let rcu = RcuThread::register();
        let mut region = rcu.read_lock();
        let set = IndexSet::new();
        set.insert(&mut region, EMPTY);
    }
}
