use crate::spinlock::{SpinGuard, SpinLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};

struct Waiter {
    thread: Thread,
    notified: AtomicBool,
}

/// A condition variable that pairs with [`SpinLock`].
///
/// `std::sync::Condvar` only composes with `std::sync::Mutex`, so the pool
/// carries its own: waiters register themselves on an internal list *before*
/// releasing the caller's guard, then park. Because `thread::park` remembers
/// an unpark that arrives early, a signal landing in the window between
/// release and park is never lost; the `notified` flag absorbs spurious
/// wakeups and stale park tokens.
///
/// Lock ordering: the waiter list's lock is only ever taken while either
/// holding the caller's lock (`wait`) or holding nothing (`signal_one`,
/// `broadcast`), so it always nests innermost.
pub struct Condvar {
    waiters: SpinLock<VecDeque<Arc<Waiter>>>,
}

impl Condvar {
    /// Creates a condition variable with no waiters.
    pub const fn new() -> Self {
        Self {
            waiters: SpinLock::new(VecDeque::new()),
        }
    }

    /// Atomically releases `guard`, blocks the current thread until
    /// signalled, and reacquires the lock before returning.
    ///
    /// As with any condition variable, the caller must re-check its
    /// predicate after waking.
    pub fn wait<'a, T>(&self, guard: SpinGuard<'a, T>) -> SpinGuard<'a, T> {
        let waiter = Arc::new(Waiter {
            thread: thread::current(),
            notified: AtomicBool::new(false),
        });
        self.waiters.lock().push_back(Arc::clone(&waiter));

        let lock = guard.spinlock();
        drop(guard);

        while !waiter.notified.load(Ordering::Acquire) {
            thread::park();
        }

        lock.lock()
    }

    /// Wakes the longest-waiting thread, if any.
    pub fn signal_one(&self) {
        let waiter = self.waiters.lock().pop_front();
        if let Some(w) = waiter {
            w.notified.store(true, Ordering::Release);
            w.thread.unpark();
        }
    }

    /// Wakes every waiting thread.
    pub fn broadcast(&self) {
        let drained: Vec<_> = self.waiters.lock().drain(..).collect();
        for w in drained {
            w.notified.store(true, Ordering::Release);
            w.thread.unpark();
        }
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
