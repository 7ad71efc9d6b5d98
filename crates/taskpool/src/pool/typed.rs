use super::{PoolCore, Pooler};
use crate::error::{Error, Result};
use crate::options::{Builder, Options};
use crate::worker::{Worker, WORKER_CHAN_CAP};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

type PoolFunc<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A worker bound to a typed parameter channel.
///
/// Unlike the closure worker, an arbitrary `T` has no value to spare as an
/// exit sentinel, so termination arrives on a second channel and the loop
/// selects over both.
pub(crate) struct TypedWorker<T: Send + 'static> {
    pool: Weak<PoolCore<TypedWorker<T>>>,
    func: PoolFunc<T>,
    arg_tx: Sender<T>,
    arg_rx: Receiver<T>,
    exit_tx: Sender<()>,
    exit_rx: Receiver<()>,
    last_used: AtomicU64,
}

impl<T: Send + 'static> TypedWorker<T> {
    fn new(pool: Weak<PoolCore<TypedWorker<T>>>, func: PoolFunc<T>) -> Arc<Self> {
        let (arg_tx, arg_rx) = bounded(*WORKER_CHAN_CAP);
        let (exit_tx, exit_rx) = bounded(1);
        Arc::new(Self {
            pool,
            func,
            arg_tx,
            arg_rx,
            exit_tx,
            exit_rx,
            last_used: AtomicU64::new(0),
        })
    }

    fn input(&self, arg: T) {
        // The receiver half lives in this struct, so the channel cannot
        // disconnect while the worker is checked out.
        let _ = self.arg_tx.send(arg);
    }
}

impl<T: Send + 'static> Worker for TypedWorker<T> {
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

                loop {
                    select! {
                        recv(self.exit_rx) -> _ => break,
                        recv(self.arg_rx) -> msg => {
                            let Ok(arg) = msg else { break };
                            let func = &self.func;
                            if let Err(payload) = catch_unwind(AssertUnwindSafe(move || func(arg))) {
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
                    }
                }

                pool.on_worker_exit(&self);

                #[cfg(feature = "tracing")]
                tracing::trace!("worker stopped");
            })
            .expect("failed to spawn worker thread");
    }

    fn finish(&self) {
        let _ = self.exit_tx.send(());
    }

    fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }

    fn set_last_used(&self, at_millis: u64) {
        self.last_used.store(at_millis, Ordering::Relaxed);
    }
}

/// A pool whose workers all run one function, each invocation receiving a
/// value of the bound parameter type.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use taskpool::{Pooler, TypedPool};
///
/// let sum = Arc::new(AtomicI64::new(0));
/// let pool = {
///     let sum = Arc::clone(&sum);
///     TypedPool::new(4, move |n: i64| {
///         sum.fetch_add(n, Ordering::Relaxed);
///     })
///     .unwrap()
/// };
///
/// for n in 1..=10 {
///     pool.invoke(n).unwrap();
/// }
/// pool.release_timeout(Duration::from_secs(1)).unwrap();
///
/// assert_eq!(sum.load(Ordering::Relaxed), 55);
/// ```
pub struct TypedPool<T: Send + 'static> {
    core: Arc<PoolCore<TypedWorker<T>>>,
}

impl<T: Send + 'static> TypedPool<T> {
    /// Creates a typed pool with default options; `size` is the worker
    /// capacity, `-1` for unbounded. The function is taken by value, which
    /// is what rules out the missing-function error of the error taxonomy.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPoolSize`] for zero or negative sizes other than
    /// `-1`.
    pub fn new<F>(size: i32, func: F) -> Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Builder::new().build_typed(size, func)
    }

    /// A [`Builder`] for a customized pool.
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn with_options<F>(size: i32, func: F, opts: Options) -> Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let func: PoolFunc<T> = Arc::new(func);
        let core = PoolCore::new(size, opts, |weak| {
            Box::new(move || TypedWorker::new(Weak::clone(&weak), Arc::clone(&func)))
        })?;
        Ok(Self { core })
    }

    /// Submits one invocation of the pool function with `arg`.
    ///
    /// # Errors
    ///
    /// [`Error::PoolClosed`] after [`release`](Pooler::release);
    /// [`Error::PoolOverload`] when the pool is saturated and the overload
    /// policy forbids waiting.
    pub fn invoke(&self, arg: T) -> Result<()> {
        self.try_invoke(arg).map_err(|(_, err)| err)
    }

    /// Invocation that hands the argument back on failure, so the
    /// multi-pool can retry it on another shard.
    pub(crate) fn try_invoke(&self, arg: T) -> core::result::Result<(), (T, Error)> {
        if self.core.is_closed() {
            return Err((arg, Error::PoolClosed));
        }
        match self.core.retrieve_worker() {
            Ok(worker) => {
                worker.input(arg);
                Ok(())
            }
            Err(err) => Err((arg, err)),
        }
    }
}

impl<T: Send + 'static> Pooler for TypedPool<T> {
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

impl<T: Send + 'static> Drop for TypedPool<T> {
    fn drop(&mut self) {
        self.core.release();
    }
}
