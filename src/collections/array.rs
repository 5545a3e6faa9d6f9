//! The append-only concurrent array underlying every container in this
//! module.
//!
//! A [`ConcurrentArray`] owns a single heap allocation of fixed-layout
//! slots. Writers claim slots through [`reserve`](ConcurrentArray::reserve),
//! which doubles the backing storage once the configured load factor is
//! reached. Growth publishes a fresh allocation through a [`RcuCell`] and
//! reclaims the old one only after a grace period, so readers inside a
//! reader region never observe freed memory.
//!
//! What a slot *is* and how live slots move into a bigger backing is decided
//! by the [`Storage`] policy, implemented by each concrete container.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::sync::{synchronize_rcu, RcuCell, RcuGuard};

/// Default slot count for freshly created containers.
pub const DEFAULT_CAPACITY: usize = 32;

/// Storage policy of a [`ConcurrentArray`].
///
/// The array handles reservation accounting, growth scheduling, publication
/// and reclamation; the policy decides the slot layout and how live entries
/// migrate when the backing doubles.
pub trait Storage {
    /// One slot of backing storage.
    ///
    /// Slot types must not implement `Drop`: after a grow the old backing is
    /// deallocated without running destructors, because everything it owned
    /// has moved into the new backing. Teardown of a live slot happens
    /// explicitly through [`drop_slot`](Storage::drop_slot).
    type Slot;

    /// Returns an empty slot.
    fn new_slot() -> Self::Slot;

    /// Moves every live entry of `src` into `dest`.
    ///
    /// Called under the grow lock, before `dest` is published, so `dest` is
    /// exclusively owned. `src` stays visible to concurrent readers and
    /// writers throughout; implementations must win any races with in-flight
    /// insertions (by waiting them out or by fencing slots off) so that no
    /// entry published into `src` is left behind.
    fn migrate(src: &[Self::Slot], dest: &mut [Self::Slot]);

    /// Releases whatever the slot owns.
    ///
    /// # Safety
    ///
    /// Must only be called during final teardown of the container, with no
    /// concurrent access to the slot, and at most once per live entry.
    unsafe fn drop_slot(slot: &mut Self::Slot);
}

/// A resizable array of atomic slots with reservation-based appends.
///
/// `capacity` is always a power of two. `count` tracks claimed slots; the
/// mapping from a reservation to a slot position is up to the owning
/// container (dense for lists, probed for hash tables).
pub struct ConcurrentArray<S: Storage> {
    grow_lock: Mutex<()>,
    capacity: AtomicUsize,
    count: AtomicUsize,
    backing: RcuCell<S::Slot>,
    _storage: PhantomData<S>,
}

// The backing pointer is managed through the RCU protocol; slots themselves
// are shared freely between threads.
unsafe impl<S: Storage> Send for ConcurrentArray<S> where S::Slot: Send + Sync {}
unsafe impl<S: Storage> Sync for ConcurrentArray<S> where S::Slot: Send + Sync {}

impl<S: Storage> ConcurrentArray<S> {
    /// Creates an array with `capacity` empty slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or not a power of two.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "capacity must be a power of two"
        );
        debug_assert!(
            !std::mem::needs_drop::<S::Slot>(),
            "slot types must not implement Drop"
        );
        ConcurrentArray {
            grow_lock: Mutex::new(()),
            capacity: AtomicUsize::new(capacity),
            count: AtomicUsize::new(0),
            backing: RcuCell::new(Self::alloc_backing(capacity)),
            _storage: PhantomData,
        }
    }

    /// Number of claimed slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Returns true if no slot has been claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current slot count of the backing storage.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Returns the current backing as a slice.
    ///
    /// The capacity is loaded before the backing pointer: growth publishes
    /// the pointer first and the capacity second, so the observed length
    /// never exceeds the observed allocation. The slice stays valid while
    /// the reader region and the array are both alive; a snapshot taken
    /// before a concurrent grow keeps pointing at the retired backing,
    /// which is exactly what the grace period protects.
    pub fn slots<'a>(&'a self, _region: &'a RcuGuard<'_>) -> &'a [S::Slot] {
        let capacity = self.capacity.load(Ordering::Acquire);
        let backing = self.backing.load();
        // SAFETY: `backing` points at least `capacity` initialized slots
        // (load order above), and the region plus the array borrow keep the
        // allocation alive for 'a.
        unsafe { std::slice::from_raw_parts(backing, capacity) }
    }

    /// Claims one slot, growing the backing first if the load factor has
    /// been reached.
    ///
    /// Returns the number of slots claimed before this one. The grow path
    /// steps outside the reader region around its grace-period wait, which
    /// is why the guard is taken mutably.
    pub fn reserve(&self, region: &mut RcuGuard<'_>, load_factor: f64) -> usize {
        let mut current = self.count.load(Ordering::Relaxed);
        loop {
            loop {
                // Load the capacity before deciding; a stale backing seen
                // later can only be larger than this.
                let capacity = self.capacity.load(Ordering::Acquire);
                #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
                let limit = (load_factor * capacity as f64) as usize;
                if current < limit {
                    break;
                }
                region.quiesce(|| {
                    let _ = self.grow(capacity, capacity * 2);
                });
                current = self.count.load(Ordering::Relaxed);
            }

            // Acquire-release on success orders the claim against the
            // capacity check and the slot write that follows.
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current,
                Err(changed) => current = changed,
            }
        }
    }

    /// Returns a reservation that will not be used.
    ///
    /// Containers call this when a claimed slot turns out to be a duplicate.
    pub fn drop_reservation(&self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Replaces the backing with one of `new_capacity` slots.
    ///
    /// Returns false if another writer already grew past
    /// `expected_capacity`. Must be called outside any reader region on the
    /// calling thread.
    fn grow(&self, expected_capacity: usize, new_capacity: usize) -> bool {
        let _guard = self.grow_lock.lock().expect("grow lock poisoned");

        if self.capacity.load(Ordering::Relaxed) != expected_capacity {
            return false;
        }

        let old = self.backing.load_owner();
        let fresh = Self::alloc_backing(new_capacity);
        {
            // SAFETY: `old` holds `expected_capacity` slots and stays alive;
            // `fresh` is unpublished, so the mutable slice is exclusive.
            let src = unsafe { std::slice::from_raw_parts(old, expected_capacity) };
            let dest = unsafe { std::slice::from_raw_parts_mut(fresh, new_capacity) };
            S::migrate(src, dest);
        }

        // Publish the backing before the capacity, mirroring the load order
        // in `slots`.
        self.backing.store(fresh);
        self.capacity.store(new_capacity, Ordering::Release);

        // Wait until no reader can still hold the old backing, then drop
        // the allocation. Slot contents moved out during migration.
        synchronize_rcu();
        unsafe { Self::dealloc_backing(old, expected_capacity) };
        true
    }

    fn alloc_backing(capacity: usize) -> *mut S::Slot {
        let slots: Box<[S::Slot]> = (0..capacity).map(|_| S::new_slot()).collect();
        Box::into_raw(slots) as *mut S::Slot
    }

    /// # Safety
    ///
    /// `backing` must have come from `alloc_backing(capacity)` and must not
    /// be reachable by any thread. Slot contents are not dropped.
    unsafe fn dealloc_backing(backing: *mut S::Slot, capacity: usize) {
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(backing, capacity)) });
    }
}

impl<S: Storage> Drop for ConcurrentArray<S> {
    fn drop(&mut self) {
        let backing = self.backing.load_owner();
        let capacity = self.capacity.load(Ordering::Relaxed);
        // SAFETY: exclusive access; every live entry lives in the current
        // backing and is torn down exactly once.
        unsafe {
            let slots = std::slice::from_raw_parts_mut(backing, capacity);
            for slot in slots.iter_mut() {
                S::drop_slot(slot);
            }
            Self::dealloc_backing(backing, capacity);
        }
    }
}
