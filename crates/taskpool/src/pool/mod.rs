mod task;
mod typed;

#[cfg(test)]
mod tests;

pub use task::Pool;
pub use typed::TypedPool;

use crate::clock::{CachedClock, NOW_UPDATE_INTERVAL};
use crate::condvar::Condvar;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::queue::WorkerQueue;
use crate::spinlock::SpinLock;
use crate::worker::Worker;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

const OPENED: u8 = 0;
const CLOSED: u8 = 1;

/// The lifecycle surface shared by [`Pool`] and [`TypedPool`], and the
/// interface the multi-pool dispatcher routes through.
pub trait Pooler: Send + Sync {
    /// Number of workers currently alive (executing or idle).
    fn running(&self) -> i32;

    /// Number of additional workers the pool could start, or `-1` for an
    /// unbounded pool.
    fn free(&self) -> i32;

    /// Number of submitters blocked waiting for a worker.
    fn waiting(&self) -> i32;

    /// The pool capacity; `-1` means unbounded.
    fn cap(&self) -> i32;

    /// Changes the capacity. A no-op for unbounded or pre-allocated pools,
    /// for non-positive sizes, and when the size is unchanged.
    fn tune(&self, size: i32);

    /// Whether the pool has been released and not rebooted.
    fn is_closed(&self) -> bool;

    /// Closes the pool: idle workers receive their exit sentinel, parked
    /// submitters are woken and observe
    /// [`Error::PoolClosed`](crate::Error::PoolClosed). Running tasks drain
    /// naturally. Idempotent.
    fn release(&self);

    /// [`release`](Pooler::release), then waits up to `timeout` for every
    /// worker and background thread to exit. Returns
    /// [`Error::Timeout`](crate::Error::Timeout) on expiry and
    /// [`Error::PoolClosed`](crate::Error::PoolClosed) if the pool was
    /// already closed.
    fn release_timeout(&self, timeout: Duration) -> Result<()>;

    /// Reopens a closed pool, restarting its background threads.
    ///
    /// Only sound once all submitters from the previous generation have
    /// returned; a caller still blocked in the old generation may observe
    /// the new generation's completion latch.
    fn reboot(&self);
}

/// One-shot completion latch: dropping the sender is the close, which every
/// receiver clone observes as a disconnect.
struct AllDone {
    tx: Option<Sender<()>>,
    rx: Receiver<()>,
}

impl AllDone {
    fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self { tx: Some(tx), rx }
    }
}

/// State and logic shared by the closure and typed pools.
///
/// Workers hold a `Weak` back-reference to this; the core owns workers
/// through the idle queue and the object cache, so ownership never cycles.
pub(crate) struct PoolCore<W: Worker> {
    capacity: AtomicI32,
    running: AtomicI32,
    waiting: AtomicI32,
    state: AtomicU8,

    /// Guards the idle queue; every other field is atomic or self-locking.
    queue: SpinLock<WorkerQueue<W>>,
    /// Submitters park here when the pool is saturated.
    cond: Condvar,
    /// Free-list of worker structs, so a respawn reuses the existing
    /// channels instead of reallocating them.
    cache: SegQueue<Arc<W>>,
    factory: Box<dyn Fn() -> Arc<W> + Send + Sync>,

    clock: CachedClock,
    purge_stop: SpinLock<Option<Sender<()>>>,
    purge_done: AtomicBool,
    clock_stop: SpinLock<Option<Sender<()>>>,
    clock_done: AtomicBool,
    all_done: SpinLock<AllDone>,

    pub(crate) opts: Options,
}

impl<W: Worker> PoolCore<W> {
    /// Validates `size`, builds the core, and starts the purger and clock
    /// threads. `make_factory` receives the core's weak handle and returns
    /// the worker constructor the object cache falls back to.
    pub(crate) fn new(
        size: i32,
        opts: Options,
        make_factory: impl FnOnce(Weak<Self>) -> Box<dyn Fn() -> Arc<W> + Send + Sync>,
    ) -> Result<Arc<Self>> {
        if size <= 0 && size != -1 {
            return Err(Error::InvalidPoolSize);
        }
        if opts.prealloc && size == -1 {
            return Err(Error::InvalidPreAllocSize);
        }

        let queue = if opts.prealloc {
            WorkerQueue::fifo(size as usize)
        } else {
            WorkerQueue::lifo()
        };

        let core = Arc::new_cyclic(|weak: &Weak<Self>| Self {
            capacity: AtomicI32::new(size),
            running: AtomicI32::new(0),
            waiting: AtomicI32::new(0),
            state: AtomicU8::new(OPENED),
            queue: SpinLock::new(queue),
            cond: Condvar::new(),
            cache: SegQueue::new(),
            factory: make_factory(weak.clone()),
            clock: CachedClock::new(),
            purge_stop: SpinLock::new(None),
            purge_done: AtomicBool::new(false),
            clock_stop: SpinLock::new(None),
            clock_done: AtomicBool::new(false),
            all_done: SpinLock::new(AllDone::new()),
            opts,
        });

        core.start_purger();
        core.start_ticktock();

        Ok(core)
    }

    pub(crate) fn running(&self) -> i32 {
        self.running.load(Ordering::Relaxed)
    }

    pub(crate) fn cap(&self) -> i32 {
        self.capacity.load(Ordering::Relaxed)
    }

    pub(crate) fn free(&self) -> i32 {
        let cap = self.cap();
        if cap < 0 {
            -1
        } else {
            cap - self.running()
        }
    }

    pub(crate) fn waiting(&self) -> i32 {
        self.waiting.load(Ordering::Relaxed)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == CLOSED
    }

    pub(crate) fn inc_running(&self) {
        self.running.fetch_add(1, Ordering::AcqRel);
    }

    fn dec_running(&self) -> i32 {
        self.running.fetch_sub(1, Ordering::AcqRel) - 1
    }

    fn add_waiting(&self, delta: i32) {
        self.waiting.fetch_add(delta, Ordering::AcqRel);
    }

    pub(crate) fn tune(&self, size: i32) {
        let capacity = self.cap();
        if capacity == -1 || size <= 0 || size == capacity || self.opts.prealloc {
            return;
        }

        self.capacity.store(size, Ordering::Relaxed);

        if size > capacity {
            if size - capacity == 1 {
                self.cond.signal_one();
            } else {
                self.cond.broadcast();
            }
        }
    }

    /// Hands out a worker: an idle one if any, a fresh one while below
    /// capacity, otherwise the overload policy decides between failing
    /// fast and parking on the condition variable until a worker reverts.
    pub(crate) fn retrieve_worker(&self) -> Result<Arc<W>> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(worker) = queue.detach() {
                drop(queue);
                return Ok(worker);
            }

            let capacity = self.cap();
            if capacity == -1 || capacity > self.running() {
                // Spawning happens outside the critical section.
                drop(queue);
                let worker = self.cache.pop().unwrap_or_else(|| (self.factory)());
                Arc::clone(&worker).run();
                return Ok(worker);
            }

            if self.opts.nonblocking
                || (self.opts.max_blocking_tasks != 0
                    && self.waiting() as usize >= self.opts.max_blocking_tasks)
            {
                drop(queue);
                return Err(Error::PoolOverload);
            }

            self.add_waiting(1);
            queue = self.cond.wait(queue);
            self.add_waiting(-1);

            if self.is_closed() {
                drop(queue);
                return Err(Error::PoolClosed);
            }
        }
    }

    /// Returns a worker to the idle queue after a task. A `false` return
    /// tells the worker to exit its loop instead.
    pub(crate) fn revert_worker(&self, worker: &Arc<W>) -> bool {
        let capacity = self.cap();
        if (capacity > 0 && self.running() > capacity) || self.is_closed() {
            self.cond.broadcast();
            return false;
        }

        worker.set_last_used(self.clock.now_millis());

        let mut queue = self.queue.lock();
        // Double-check under the lock so a racing release cannot strand the
        // worker in a queue that was already reset.
        if self.is_closed() {
            return false;
        }
        if queue.insert(Arc::clone(worker)).is_err() {
            return false;
        }
        self.cond.signal_one();
        drop(queue);
        true
    }

    /// Exit accounting shared by both worker loops: the last worker out of
    /// a closed pool closes the completion latch, the struct goes back to
    /// the free-list, and one parked submitter gets to retry.
    pub(crate) fn on_worker_exit(&self, worker: &Arc<W>) {
        if self.dec_running() == 0 && self.is_closed() {
            self.close_all_done();
        }
        self.cache.push(Arc::clone(worker));
        self.cond.signal_one();
    }

    fn close_all_done(&self) {
        // take() makes the close single-shot per generation.
        let tx = self.all_done.lock().tx.take();
        drop(tx);
    }

    fn start_purger(self: &Arc<Self>) {
        if self.opts.disable_purge {
            return;
        }
        self.purge_done.store(false, Ordering::Release);

        let (stop_tx, stop_rx) = bounded(0);
        *self.purge_stop.lock() = Some(stop_tx);

        let weak = Arc::downgrade(self);
        let interval = self.opts.expiry_duration;
        thread::Builder::new()
            .name("taskpool-purger".into())
            .spawn(move || Self::purge_stale_workers(weak, stop_rx, interval))
            .expect("failed to spawn purger thread");
    }

    /// Purger loop: every `interval`, extract the expired prefix of the
    /// idle queue and terminate it. When the pool looks dormant (nothing
    /// running, or everything that was running just expired), parked
    /// submitters are woken so they can re-check pool state.
    fn purge_stale_workers(weak: Weak<Self>, stop_rx: Receiver<()>, interval: Duration) {
        loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => break,
            }
            let Some(pool) = weak.upgrade() else {
                return;
            };
            if pool.is_closed() {
                break;
            }

            let (expired, is_dormant) = {
                let mut queue = pool.queue.lock();
                let expire_before = pool
                    .clock
                    .now_millis()
                    .saturating_sub(interval.as_millis() as u64);
                let expired = queue.refresh(expire_before);
                let running = pool.running();
                let is_dormant = running == 0 || running as usize == expired.len();
                (expired, is_dormant)
            };

            #[cfg(feature = "tracing")]
            if !expired.is_empty() {
                tracing::debug!(count = expired.len(), "purging expired workers");
            }

            // Termination happens outside the lock; each sentinel may block
            // until its worker rendezvouses.
            for worker in &expired {
                worker.finish();
            }

            if is_dormant && pool.waiting() > 0 {
                pool.cond.broadcast();
            }
        }

        if let Some(pool) = weak.upgrade() {
            pool.purge_done.store(true, Ordering::Release);
        }
    }

    fn start_ticktock(self: &Arc<Self>) {
        self.clock.refresh();
        self.clock_done.store(false, Ordering::Release);

        let (stop_tx, stop_rx) = bounded(0);
        *self.clock_stop.lock() = Some(stop_tx);

        let weak = Arc::downgrade(self);
        thread::Builder::new()
            .name("taskpool-clock".into())
            .spawn(move || Self::ticktock(weak, stop_rx))
            .expect("failed to spawn clock thread");
    }

    fn ticktock(weak: Weak<Self>, stop_rx: Receiver<()>) {
        loop {
            match stop_rx.recv_timeout(NOW_UPDATE_INTERVAL) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => break,
            }
            let Some(pool) = weak.upgrade() else {
                return;
            };
            if pool.is_closed() {
                break;
            }
            pool.clock.refresh();
        }

        if let Some(pool) = weak.upgrade() {
            pool.clock_done.store(true, Ordering::Release);
        }
    }

    pub(crate) fn release(&self) {
        if self
            .state
            .compare_exchange(OPENED, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        // Dropping the stop senders cancels the purger and clock threads.
        self.purge_stop.lock().take();
        self.clock_stop.lock().take();

        self.queue.lock().reset();

        // Wake the submitters parked in retrieve_worker.
        self.cond.broadcast();

        #[cfg(feature = "tracing")]
        tracing::debug!("pool released");
    }

    pub(crate) fn release_timeout(&self, timeout: Duration) -> Result<()> {
        let purger_gone = !self.opts.disable_purge && self.purge_stop.lock().is_none();
        if self.is_closed() || purger_gone || self.clock_stop.lock().is_none() {
            return Err(Error::PoolClosed);
        }
        self.release();

        let deadline = Instant::now() + timeout;

        if self.running() == 0 {
            self.close_all_done();
        }

        let all_done_rx = self.all_done.lock().rx.clone();
        match all_done_rx.recv_deadline(deadline) {
            // Disconnection is the close; nothing is ever sent.
            Err(RecvTimeoutError::Disconnected) | Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => return Err(Error::Timeout),
        }

        loop {
            if self.running() == 0
                && (self.opts.disable_purge || self.purge_done.load(Ordering::Acquire))
                && self.clock_done.load(Ordering::Acquire)
            {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    pub(crate) fn reboot(self: &Arc<Self>) {
        if self
            .state
            .compare_exchange(CLOSED, OPENED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.start_purger();
            self.start_ticktock();
            *self.all_done.lock() = AllDone::new();

            #[cfg(feature = "tracing")]
            tracing::debug!("pool rebooted");
        }
    }
}
