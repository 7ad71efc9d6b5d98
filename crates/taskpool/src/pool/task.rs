use super::{PoolCore, Pooler};
use crate::error::{Error, Result};
use crate::options::{Builder, Options};
use crate::worker::{Worker, WORKER_CHAN_CAP};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// A worker bound to a closure channel; `None` doubles as the exit
/// sentinel, so no separate termination signal is needed.
pub(crate) struct TaskWorker {
    pool: Weak<PoolCore<TaskWorker>>,
    task_tx: Sender<Option<Task>>,
    task_rx: Receiver<Option<Task>>,
    last_used: AtomicU64,
}

impl TaskWorker {
    fn new(pool: Weak<PoolCore<TaskWorker>>) -> Arc<Self> {
        let (task_tx, task_rx) = bounded(*WORKER_CHAN_CAP);
        Arc::new(Self {
            pool,
            task_tx,
            task_rx,
            last_used: AtomicU64::new(0),
        })
    }

    fn input(&self, task: Task) {
        // The receiver half lives in this struct, so the channel cannot
        // disconnect while the worker is checked out.
        let _ = self.task_tx.send(Some(task));
    }
}

impl Worker for TaskWorker {
    fn run(self: Arc<Self>) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        pool.inc_running();

        thread::Builder::new()
            .name("taskpool-worker".into())
            .spawn(move || {
                #[cfg(feature = "tracing")]
                tracing::trace!("worker started");

                while let Ok(Some(task)) = self.task_rx.recv() {
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                        if let Some(handler) = &pool.opts.panic_handler {
                            handler(payload);
                        } else {
                            #[cfg(feature = "tracing")]
                            tracing::error!("task panicked with no panic handler installed");
                        }
                    }
                    if !pool.revert_worker(&self) {
                        break;
                    }
                }

                pool.on_worker_exit(&self);

                #[cfg(feature = "tracing")]
                tracing::trace!("worker stopped");
            })
            .expect("failed to spawn worker thread");
    }

    fn finish(&self) {
        let _ = self.task_tx.send(None);
    }

    fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }

    fn set_last_used(&self, at_millis: u64) {
        self.last_used.store(at_millis, Ordering::Relaxed);
    }
}

/// A pool of recycled workers executing arbitrary closures.
///
/// Submitting a task hands it to an idle worker when one is parked, starts
/// a new worker while below capacity, and otherwise blocks, fails fast, or
/// respects the blocking cap according to the [`Builder`] options. Idle
/// workers older than the expiry duration are reclaimed in the background.
///
/// Dropping the pool releases it; share it across threads with `Arc`.
///
/// # Example
///
/// ```
/// use std::sync::mpsc;
/// use taskpool::{Pool, Pooler};
///
/// let pool = Pool::new(4).unwrap();
/// let (tx, rx) = mpsc::channel();
///
/// pool.submit(move || {
///     tx.send(1 + 1).unwrap();
/// })
/// .unwrap();
///
/// assert_eq!(rx.recv().unwrap(), 2);
/// pool.release();
/// ```
pub struct Pool {
    core: Arc<PoolCore<TaskWorker>>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").finish_non_exhaustive()
    }
}

impl Pool {
    /// Creates a pool with default options; `size` is the worker capacity,
    /// `-1` for unbounded.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPoolSize`] for zero or negative sizes other than
    /// `-1`.
    pub fn new(size: i32) -> Result<Self> {
        Builder::new().build(size)
    }

    /// A [`Builder`] for a customized pool.
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn with_options(size: i32, opts: Options) -> Result<Self> {
        let core = PoolCore::new(size, opts, |weak| {
            Box::new(move || TaskWorker::new(Weak::clone(&weak)))
        })?;
        Ok(Self { core })
    }

    /// Submits a task for execution by some worker.
    ///
    /// A successful return means the task will run exactly once; a failed
    /// one means it will not run at all.
    ///
    /// # Errors
    ///
    /// [`Error::PoolClosed`] after [`release`](Pooler::release);
    /// [`Error::PoolOverload`] when the pool is saturated and the overload
    /// policy forbids waiting.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_task(Box::new(task)).map_err(|(_, err)| err)
    }

    /// Boxed-task submission that hands the task back on failure, so the
    /// multi-pool can retry it on another shard.
    pub(crate) fn submit_task(&self, task: Task) -> core::result::Result<(), (Task, Error)> {
        if self.core.is_closed() {
            return Err((task, Error::PoolClosed));
        }
        match self.core.retrieve_worker() {
            Ok(worker) => {
                worker.input(task);
                Ok(())
            }
            Err(err) => Err((task, err)),
        }
    }
}

impl Pooler for Pool {
    fn running(&self) -> i32 {
        self.core.running()
    }

    fn free(&self) -> i32 {
        self.core.free()
    }

    fn waiting(&self) -> i32 {
        self.core.waiting()
    }

    fn cap(&self) -> i32 {
        self.core.cap()
    }

    fn tune(&self, size: i32) {
        self.core.tune(size);
    }

    fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    fn release(&self) {
        self.core.release();
    }

    fn release_timeout(&self, timeout: Duration) -> Result<()> {
        self.core.release_timeout(timeout)
    }

    fn reboot(&self) {
        self.core.reboot();
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.core.release();
    }
}
