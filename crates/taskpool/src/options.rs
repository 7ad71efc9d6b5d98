use crate::error::Result;
use crate::multi::{LoadBalancingStrategy, MultiPool, TypedMultiPool};
use crate::pool::{Pool, TypedPool};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Invoked with the payload of a panicking task. Without one, panics are
/// recovered and dropped silently.
pub type PanicHandler = Arc<dyn Fn(Box<dyn Any + Send>) + Send + Sync>;

/// Default purge tick interval.
pub(crate) const DEFAULT_EXPIRY_DURATION: Duration = Duration::from_secs(1);

/// Resolved pool options; constructed through [`Builder`].
#[derive(Clone)]
pub(crate) struct Options {
    pub(crate) expiry_duration: Duration,
    pub(crate) prealloc: bool,
    pub(crate) max_blocking_tasks: usize,
    pub(crate) nonblocking: bool,
    pub(crate) panic_handler: Option<PanicHandler>,
    pub(crate) disable_purge: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            expiry_duration: DEFAULT_EXPIRY_DURATION,
            prealloc: false,
            max_blocking_tasks: 0,
            nonblocking: false,
            panic_handler: None,
            disable_purge: false,
        }
    }
}

/// Configures and constructs pools.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use taskpool::{Builder, Pooler};
///
/// let pool = Builder::new()
///     .expiry_duration(Duration::from_secs(5))
///     .nonblocking(true)
///     .build(2)
///     .unwrap();
///
/// assert_eq!(pool.cap(), 2);
/// pool.release();
/// ```
#[derive(Clone, Default)]
pub struct Builder {
    opts: Options,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interval between purge ticks; idle workers older than this are
    /// reclaimed. A zero duration falls back to the 1 s default. Values
    /// below 500 ms are effectively rounded up by the cached clock's
    /// refresh interval.
    pub fn expiry_duration(mut self, duration: Duration) -> Self {
        self.opts.expiry_duration = if duration.is_zero() {
            DEFAULT_EXPIRY_DURATION
        } else {
            duration
        };
        self
    }

    /// Pre-allocates the idle queue as a fixed-capacity ring (FIFO
    /// checkout) instead of the default growable stack (LIFO checkout).
    /// Requires a finite pool size and disables [`tune`].
    ///
    /// [`tune`]: crate::Pooler::tune
    pub fn prealloc(mut self, prealloc: bool) -> Self {
        self.opts.prealloc = prealloc;
        self
    }

    /// Caps how many submitters may block waiting for a free worker;
    /// beyond the cap, submissions fail with
    /// [`Error::PoolOverload`](crate::Error::PoolOverload). Zero means
    /// unlimited.
    pub fn max_blocking_tasks(mut self, max: usize) -> Self {
        self.opts.max_blocking_tasks = max;
        self
    }

    /// Never blocks a submitter: a submission with no worker available
    /// fails immediately with
    /// [`Error::PoolOverload`](crate::Error::PoolOverload).
    pub fn nonblocking(mut self, nonblocking: bool) -> Self {
        self.opts.nonblocking = nonblocking;
        self
    }

    /// Handler invoked with the panic payload when a task panics. The
    /// worker recovers and reverts to the idle queue either way.
    pub fn panic_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Box<dyn Any + Send>) + Send + Sync + 'static,
    {
        self.opts.panic_handler = Some(Arc::new(handler));
        self
    }

    /// Skips the purger thread entirely; workers then live until the pool
    /// is released.
    pub fn disable_purge(mut self, disable: bool) -> Self {
        self.opts.disable_purge = disable;
        self
    }

    /// Builds a closure pool with `size` workers; `-1` means unbounded.
    pub fn build(self, size: i32) -> Result<Pool> {
        Pool::with_options(size, self.opts)
    }

    /// Builds a typed pool whose workers all run `func`.
    pub fn build_typed<T, F>(self, size: i32, func: F) -> Result<TypedPool<T>>
    where
        T: Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        TypedPool::with_options(size, func, self.opts)
    }

    /// Builds a multi-pool of `shards` independent closure pools, each of
    /// capacity `size_per_pool`.
    pub fn build_multi(
        self,
        shards: usize,
        size_per_pool: i32,
        strategy: LoadBalancingStrategy,
    ) -> Result<MultiPool> {
        MultiPool::with_options(shards, size_per_pool, strategy, self.opts)
    }

    /// Builds a multi-pool of `shards` independent typed pools.
    pub fn build_typed_multi<T, F>(
        self,
        shards: usize,
        size_per_pool: i32,
        func: F,
        strategy: LoadBalancingStrategy,
    ) -> Result<TypedMultiPool<T>>
    where
        T: Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        TypedMultiPool::with_options(shards, size_per_pool, func, strategy, self.opts)
    }
}
