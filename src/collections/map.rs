//! An open-addressed concurrent string-keyed map.
//!
//! Each slot pairs an atomic key pointer with an inline value. The key
//! pointer doubles as the slot's state machine:
//!
//! - null: the slot is empty, the value is uninitialized;
//! - the all-ones pattern (`PENDING`): an inserter has claimed the slot and
//!   is constructing the value;
//! - all-ones minus one (`FENCED`): a rehash has fenced the empty slot off;
//! - anything else: an owned heap string, and the value is fully
//!   initialized.
//!
//! An inserter publishes the key with a release store only after moving the
//! value in, so any thread that observes a real key through an acquire load
//! also observes the value. Insertion is first-writer-wins: for every key,
//! exactly one claimant transitions null to `PENDING` and its value is the
//! one all observers see from then on.

use std::cell::UnsafeCell;
use std::hash::{Hash, Hasher};
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicPtr, Ordering};

use rustc_hash::FxHasher;

use super::array::{ConcurrentArray, Storage, DEFAULT_CAPACITY};
use crate::sync::RcuGuard;

/// Table load factor, matching the index set.
const LOAD_FACTOR: f64 = 0.75;

/// Slot claimed, value under construction.
fn pending() -> *mut String {
    usize::MAX as *mut String
}

/// Empty slot fenced off by an in-progress rehash.
fn fenced() -> *mut String {
    (usize::MAX - 1) as *mut String
}

fn is_sentinel(key: *mut String) -> bool {
    key as usize >= usize::MAX - 1
}

fn hash_str(key: &str) -> usize {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish() as usize
}

/// How a map value is handed back to callers.
///
/// Word-sized values are copied out; boxed values are handed out as a
/// reference to the stable pointee. In both cases the output must stay
/// valid for as long as the map is alive, independent of the slot storage
/// it was read from, because the slot array may be replaced by a rehash at
/// any point after the read.
pub trait MapValue: Sized {
    /// What lookups return.
    type Out<'a>
    where
        Self: 'a;

    /// Reads the output out of an initialized slot value.
    ///
    /// # Safety
    ///
    /// `value` must point at a fully initialized value inside an active
    /// reader region. The returned output must not borrow the slot storage
    /// itself.
    unsafe fn read_out<'a>(value: *const Self) -> Self::Out<'a>
    where
        Self: 'a;
}

impl MapValue for usize {
    type Out<'a>
        = usize
    where
        Self: 'a;

    unsafe fn read_out<'a>(value: *const usize) -> usize
    where
        Self: 'a,
    {
        unsafe { *value }
    }
}

impl<T> MapValue for Box<T> {
    type Out<'a>
        = &'a T
    where
        Self: 'a;

    unsafe fn read_out<'a>(value: *const Box<T>) -> &'a T
    where
        Self: 'a,
    {
        // SAFETY: the box itself may be moved between backings by a rehash,
        // but the pointee is heap-allocated and stays put until the map is
        // dropped.
        unsafe { &*(&**value as *const T) }
    }
}

/// One slot of the map's backing storage.
pub struct MapSlot<V> {
    key: AtomicPtr<String>,
    value: UnsafeCell<MaybeUninit<V>>,
}

// Values become shared once the key is published.
unsafe impl<V: Send> Send for MapSlot<V> {}
unsafe impl<V: Send + Sync> Sync for MapSlot<V> {}

struct Table<V>(std::marker::PhantomData<V>);

impl<V> Storage for Table<V> {
    type Slot = MapSlot<V>;

    fn new_slot() -> MapSlot<V> {
        MapSlot {
            key: AtomicPtr::new(std::ptr::null_mut()),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    fn migrate(src: &[MapSlot<V>], dest: &mut [MapSlot<V>]) {
        let mask = dest.len() - 1;
        for slot in src {
            // Fence empty slots off so late claimants retry on the new
            // backing, and wait out claimants that got in before us.
            let key = loop {
                let key = slot.key.load(Ordering::Acquire);
                if key.is_null() {
                    if slot
                        .key
                        .compare_exchange(
                            std::ptr::null_mut(),
                            fenced(),
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        break std::ptr::null_mut();
                    }
                } else if key == pending() {
                    std::hint::spin_loop();
                } else {
                    break key;
                }
            };
            if key.is_null() {
                continue;
            }

            // SAFETY: the key is a real pointer, so the value is
            // initialized; single-writer context for `dest`.
            let text = unsafe { (*key).as_str() };
            let mut i = hash_str(text).wrapping_sub(1);
            loop {
                i = i.wrapping_add(1) & mask;
                if dest[i].key.get_mut().is_null() {
                    break;
                }
            }
            // Ownership of the key string and the value follow the raw
            // bits; the retired backing is deallocated without dropping
            // its slots.
            *dest[i].key.get_mut() = key;
            unsafe {
                std::ptr::copy_nonoverlapping(slot.value.get(), dest[i].value.get(), 1);
            }
        }
    }

    unsafe fn drop_slot(slot: &mut MapSlot<V>) {
        let key = *slot.key.get_mut();
        if !key.is_null() && !is_sentinel(key) {
            unsafe {
                drop(Box::from_raw(key));
                (*slot.value.get()).assume_init_drop();
            }
        }
    }
}

/// A concurrent map from strings to values with single-insertion-wins
/// semantics.
///
/// `V` is either a machine word (`usize`) or a boxed record; see
/// [`MapValue`]. Lookups are lock-free; inserts are lock-free except for a
/// bounded wait when they land in the middle of a rehash.
pub struct StringMap<V: MapValue> {
    contents: ConcurrentArray<Table<V>>,
}

impl<V: MapValue> StringMap<V> {
    /// Creates an empty map with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty map with `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        StringMap {
            contents: ConcurrentArray::with_capacity(capacity),
        }
    }

    /// Inserts `value` under `key` unless the key is already present, and
    /// returns the winning value either way.
    pub fn add<'m>(&'m self, region: &mut RcuGuard<'_>, key: &str, value: V) -> V::Out<'m> {
        self.add_with(region, key, || value)
    }

    /// Inserts the value produced by `init` under `key` unless the key is
    /// already present, and returns the winning value either way.
    ///
    /// `init` runs only for the claimant that actually fills the slot.
    pub fn add_with<'m>(
        &'m self,
        region: &mut RcuGuard<'_>,
        key: &str,
        init: impl FnOnce() -> V,
    ) -> V::Out<'m> {
        let (slot, claimed) = self.acquire(region, key);
        // SAFETY: `slot` was returned by `acquire` under the active region.
        unsafe {
            if claimed {
                (*(*slot).value.get()).write(init());
                // Publish the key last so that observing it implies the
                // value is initialized.
                (*slot)
                    .key
                    .store(Box::into_raw(Box::new(key.to_owned())), Ordering::Release);
            }
            V::read_out((*(*slot).value.get()).as_ptr())
        }
    }

    /// Looks `key` up.
    pub fn get<'m>(&'m self, region: &RcuGuard<'_>, key: &str) -> Option<V::Out<'m>> {
        'table: loop {
            let slots = self.contents.slots(region);
            let mask = slots.len() - 1;
            let mut i = hash_str(key).wrapping_sub(1);
            loop {
                i = i.wrapping_add(1) & mask;
                let slot = &slots[i];
                let current = loop {
                    // Synchronizes with the key publication in `add_with`.
                    let current = slot.key.load(Ordering::Acquire);
                    if current != pending() {
                        break current;
                    }
                    std::hint::spin_loop();
                };
                if current.is_null() {
                    return None;
                }
                if current == fenced() {
                    std::hint::spin_loop();
                    continue 'table;
                }
                // SAFETY: a real key pointer stays valid until the map is
                // dropped; a published key implies an initialized value.
                if unsafe { (*current).as_str() } == key {
                    return Some(unsafe { V::read_out((*slot.value.get()).as_ptr()) });
                }
            }
        }
    }

    /// Claims or finds the slot for `key`.
    ///
    /// Returns the slot and whether the caller now holds the exclusive
    /// right to fill it (the key cell reads `PENDING` until the caller
    /// publishes a real key). The pointer is valid for the duration of the
    /// caller's reader region.
    fn acquire(&self, region: &mut RcuGuard<'_>, key: &str) -> (*const MapSlot<V>, bool) {
        self.contents.reserve(region, LOAD_FACTOR);

        'table: loop {
            let slots = self.contents.slots(region);
            let mask = slots.len() - 1;
            let mut i = hash_str(key).wrapping_sub(1);
            loop {
                i = i.wrapping_add(1) & mask;
                let slot = &slots[i];
                let mut current = slot.key.load(Ordering::Acquire);
                loop {
                    if current == pending() {
                        // Another claimant is filling this slot; it may be
                        // our key, so wait for the resolution.
                        std::hint::spin_loop();
                        current = slot.key.load(Ordering::Acquire);
                        continue;
                    }
                    if current == fenced() {
                        std::hint::spin_loop();
                        continue 'table;
                    }
                    if current.is_null() {
                        match slot.key.compare_exchange(
                            std::ptr::null_mut(),
                            pending(),
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        ) {
                            Ok(_) => return (slot, true),
                            // Somebody got here first; re-examine the slot.
                            Err(changed) => {
                                current = changed;
                                continue;
                            }
                        }
                    }
                    // SAFETY: real key pointers stay valid until the map is
                    // dropped.
                    if unsafe { (*current).as_str() } == key {
                        self.contents.drop_reservation();
                        return (slot, false);
                    }
                    // Some other key lives here; keep probing.
                    break;
                }
            }
        }
    }

    /// Iterates over the keys, in backing order.
    ///
    /// One-pass snapshot semantics: keys inserted concurrently may or may
    /// not appear.
    pub fn keys<'a>(&'a self, region: &'a RcuGuard<'_>) -> Keys<'a, V> {
        Keys {
            slots: self.contents.slots(region).iter(),
        }
    }

    /// Number of entries, counting in-flight inserts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Returns true if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

impl<V: MapValue> Default for StringMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the keys of a [`StringMap`].
pub struct Keys<'a, V> {
    slots: std::slice::Iter<'a, MapSlot<V>>,
}

impl<'a, V> Iterator for Keys<'a, V> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        for slot in self.slots.by_ref() {
            let key = slot.key.load(Ordering::Relaxed);
            if !key.is_null() && !is_sentinel(key) {
                // SAFETY: key strings are freed only when the map is
                // dropped, which the iterator's borrow of the map excludes.
                return Some(unsafe { (*key).as_str() });
            }
        }
        None
    }
}
