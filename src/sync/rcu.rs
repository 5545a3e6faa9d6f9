//! A lightweight user-space read-copy-update (RCU) primitive.
//!
//! Readers register a per-thread [`RcuThread`] handle and bracket every
//! access to shared storage with a [`RcuGuard`] reader region. Entering and
//! leaving a region is wait-free: a store to the handle's period word plus a
//! full fence. Writers that need to reclaim storage call [`synchronize_rcu`],
//! which advances the global grace-period counter and blocks until every
//! reader that was inside a region when the grace period started has left it.
//!
//! The protocol is asymmetric on purpose. The reader side is two relaxed
//! stores and two fences per region; all waiting is pushed onto the
//! reclaiming writer, which parks on a process-wide semaphore until the last
//! straggling reader signals it.
//!
//! # Example
//!
//! ```rust
//! use callscope::sync::RcuThread;
//!
//! let rcu = RcuThread::register();
//! let region = rcu.read_lock();
//! // shared storage may be dereferenced here
//! drop(region);
//! ```

use std::cell::Cell;
use std::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Global grace-period counter. Starts at 1 so that a period word of 0 can
/// mean "not inside a region".
static GRACE_PERIOD: AtomicUsize = AtomicUsize::new(1);

/// All currently registered reader handles. Also serializes concurrent
/// callers of [`synchronize_rcu`].
static REGISTRY: Mutex<Vec<Arc<HandleState>>> = Mutex::new(Vec::new());

/// Process-wide binary semaphore used by readers to wake a writer that is
/// waiting out a grace period.
static WAKE: Semaphore = Semaphore::new(true);

/// The part of a reader handle that other threads inspect.
struct HandleState {
    /// Grace period the owning thread entered its current region under, or
    /// 0 when the thread is outside any region.
    period: AtomicUsize,
    /// Set by a synchronizing writer that wants to be woken when the owning
    /// thread leaves its region.
    waiting: AtomicBool,
}

/// A per-thread reader registration.
///
/// Each thread that touches shared storage owns one `RcuThread`. The handle
/// registers itself with the process-wide registry on creation and
/// deregisters on drop. It is `Send` but deliberately not `Sync`: a handle
/// belongs to exactly one thread at a time.
///
/// Reader regions obtained from the same handle must not nest. Recursive
/// entry is a programming error and aborts the process.
pub struct RcuThread {
    state: Arc<HandleState>,
    /// Region nesting depth of the owning thread. Anything above 1 aborts.
    depth: Cell<u32>,
}

impl RcuThread {
    /// Registers the calling thread with the RCU registry and returns its
    /// reader handle.
    #[must_use]
    pub fn register() -> Self {
        let state = Arc::new(HandleState {
            period: AtomicUsize::new(0),
            waiting: AtomicBool::new(false),
        });
        REGISTRY
            .lock()
            .expect("RCU registry poisoned")
            .push(Arc::clone(&state));
        RcuThread {
            state,
            depth: Cell::new(0),
        }
    }

    /// Enters a reader region.
    ///
    /// While the returned guard is alive, storage reached through the
    /// concurrent containers stays allocated: a grace period cannot elapse
    /// until the guard is dropped. Entering a second region from the same
    /// handle aborts the process.
    #[must_use]
    pub fn read_lock(&self) -> RcuGuard<'_> {
        self.enter();
        RcuGuard { thread: self }
    }

    fn enter(&self) {
        let depth = self.depth.get();
        if depth > 0 {
            // Recursive reader regions would deadlock synchronize_rcu.
            eprintln!("callscope: recursive RCU reader region");
            std::process::abort();
        }
        self.depth.set(depth + 1);

        // The period must be visible before any load performed inside the
        // region; the fence pairs with the one in synchronize_rcu.
        self.state
            .period
            .store(GRACE_PERIOD.load(Ordering::Relaxed), Ordering::Relaxed);
        fence(Ordering::SeqCst);
    }

    fn exit(&self) {
        self.depth.set(self.depth.get() - 1);
        self.state.period.store(0, Ordering::Release);
        fence(Ordering::SeqCst);

        // Ordered by the fence above: the period is cleared before the
        // waiting flag is examined.
        if self.state.waiting.load(Ordering::Relaxed) {
            self.state.waiting.store(false, Ordering::Relaxed);
            WAKE.post();
        }
    }
}

impl Drop for RcuThread {
    fn drop(&mut self) {
        let mut registry = REGISTRY.lock().expect("RCU registry poisoned");
        registry.retain(|h| !Arc::ptr_eq(h, &self.state));
    }
}

/// A scoped reader region.
///
/// Obtained from [`RcuThread::read_lock`]; leaving the region is the guard's
/// drop. Container operations take the guard by reference, which ties the
/// lifetime of everything they hand out to the region itself.
///
/// Operations that may grow storage take the guard mutably: the grow path
/// has to step outside the region around its own `synchronize_rcu` call, and
/// exclusive access to the guard proves that no reference obtained under the
/// region outlives that window.
pub struct RcuGuard<'t> {
    thread: &'t RcuThread,
}

impl RcuGuard<'_> {
    /// Runs `f` outside the reader region, then re-enters it.
    ///
    /// Everything previously read through this guard must be considered
    /// invalid once `f` has run: a full grace period may elapse inside.
    pub fn quiesce<R>(&mut self, f: impl FnOnce() -> R) -> R {
        self.thread.exit();
        let result = f();
        self.thread.enter();
        result
    }
}

impl Drop for RcuGuard<'_> {
    fn drop(&mut self) {
        self.thread.exit();
    }
}

/// Waits for a full grace period.
///
/// On return, every reader region that was active when the call was made has
/// ended, so storage unlinked before the call can be freed. Concurrent
/// callers are serialized. The calling thread must not itself be inside a
/// reader region, or the wait can never finish.
pub fn synchronize_rcu() {
    let registry = REGISTRY.lock().expect("RCU registry poisoned");
    if registry.is_empty() {
        return;
    }

    let current = GRACE_PERIOD.load(Ordering::Relaxed);

    // Open a new grace period, then wait out every reader still inside the
    // old one.
    GRACE_PERIOD.store(current + 1, Ordering::SeqCst);

    let mut waiting: Vec<Arc<HandleState>> = registry.iter().cloned().collect();
    loop {
        // Drop any stale notification from a previous round.
        WAKE.try_wait();

        // Request a wakeup from every candidate...
        for handle in &waiting {
            handle.waiting.store(true, Ordering::Relaxed);
        }

        fence(Ordering::SeqCst);

        // ... then keep only the readers still inside the old period.
        let mut pending = Vec::new();
        for handle in waiting {
            let period = handle.period.load(Ordering::Relaxed);
            if period != 0 && period == current {
                pending.push(handle);
            } else {
                handle.waiting.store(false, Ordering::Relaxed);
            }
        }

        if pending.is_empty() {
            return;
        }

        // Park until one of them leaves its region, then start over with
        // the survivors.
        WAKE.wait();
        waiting = pending;
    }
}

/// A binary semaphore built from a mutex and a condition variable.
struct Semaphore {
    permit: Mutex<bool>,
    signal: Condvar,
}

impl Semaphore {
    const fn new(available: bool) -> Self {
        Semaphore {
            permit: Mutex::new(available),
            signal: Condvar::new(),
        }
    }

    fn post(&self) {
        let mut permit = self.permit.lock().expect("semaphore poisoned");
        *permit = true;
        self.signal.notify_one();
    }

    fn wait(&self) {
        let mut permit = self.permit.lock().expect("semaphore poisoned");
        while !*permit {
            permit = self.signal.wait(permit).expect("semaphore poisoned");
        }
        *permit = false;
    }

    fn try_wait(&self) -> bool {
        let mut permit = self.permit.lock().expect("semaphore poisoned");
        let was_available = *permit;
        *permit = false;
        was_available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn test_region_enter_exit() {
        let rcu = RcuThread::register();
        assert_eq!(rcu.state.period.load(Ordering::Relaxed), 0);

        let region = rcu.read_lock();
        assert_ne!(rcu.state.period.load(Ordering::Relaxed), 0);
        drop(region);

        assert_eq!(rcu.state.period.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_sequential_regions() {
        let rcu = RcuThread::register();
        for _ in 0..4 {
            let region = rcu.read_lock();
            drop(region);
        }
    }

    #[test]
    fn test_synchronize_without_readers() {
        // No region is active on this thread, so this must return promptly.
        synchronize_rcu();
        synchronize_rcu();
    }

    #[test]
    fn test_synchronize_waits_for_reader() {
        let entered = Arc::new(Semaphore::new(false));
        let release = Arc::new(Semaphore::new(false));
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            std::thread::spawn(move || {
                let rcu = RcuThread::register();
                let region = rcu.read_lock();
                entered.post();
                release.wait();
                drop(region);
            })
        };

        entered.wait();

        let synchronizer = {
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                synchronize_rcu();
                done.store(true, Ordering::SeqCst);
            })
        };

        // The reader is still inside its region, so the grace period must
        // not have elapsed yet.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst));

        release.post();
        synchronizer.join().unwrap();
        reader.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn test_quiesce_reenters_region() {
        let rcu = RcuThread::register();
        let mut region = rcu.read_lock();
        let value = region.quiesce(|| {
            assert_eq!(rcu.state.period.load(Ordering::Relaxed), 0);
            42
        });
        assert_eq!(value, 42);
        assert_ne!(rcu.state.period.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_handle_deregisters_on_drop() {
        let rcu = RcuThread::register();
        let state = Arc::clone(&rcu.state);
        let registered = |state: &Arc<HandleState>| {
            REGISTRY
                .lock()
                .unwrap()
                .iter()
                .any(|handle| Arc::ptr_eq(handle, state))
        };
        assert!(registered(&state));
        drop(rcu);
        assert!(!registered(&state));
    }
}
