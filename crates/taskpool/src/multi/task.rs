use super::{LoadBalancingStrategy, MultiPoolCore};
use crate::error::{Error, Result};
use crate::options::{Builder, Options};
use crate::pool::Pool;
use std::time::Duration;

/// A sharded front-end over independent [`Pool`]s.
///
/// Each shard owns its own lock, queue, and worker population, so
/// submissions spread across shards contend far less than on one large
/// pool. Routing follows the configured [`LoadBalancingStrategy`]; a
/// round-robin submission that lands on a saturated shard is retried once
/// on the least-loaded shard before the overload is reported.
///
/// # Example
///
/// ```
/// use std::sync::mpsc;
/// use taskpool::{LoadBalancingStrategy, MultiPool};
///
/// let pool = MultiPool::new(4, 2, LoadBalancingStrategy::RoundRobin).unwrap();
/// let (tx, rx) = mpsc::channel();
///
/// for i in 0..8 {
///     let tx = tx.clone();
///     pool.submit(move || {
///         tx.send(i).unwrap();
///     })
///     .unwrap();
/// }
/// drop(tx);
///
/// let mut seen: Vec<i32> = rx.iter().collect();
/// seen.sort_unstable();
/// assert_eq!(seen, (0..8).collect::<Vec<_>>());
/// pool.release();
/// ```
pub struct MultiPool {
    core: MultiPoolCore<Pool>,
}

impl std::fmt::Debug for MultiPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiPool").finish_non_exhaustive()
    }
}

impl MultiPool {
    /// Creates `shards` independent pools of capacity `size_per_pool`
    /// each, with default options.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidMultiPoolSize`] for a zero shard count;
    /// [`Error::InvalidPoolSize`] when the per-shard size is invalid.
    pub fn new(
        shards: usize,
        size_per_pool: i32,
        strategy: LoadBalancingStrategy,
    ) -> Result<Self> {
        Builder::new().build_multi(shards, size_per_pool, strategy)
    }

    /// A [`Builder`] for a customized multi-pool.
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn with_options(
        shards: usize,
        size_per_pool: i32,
        strategy: LoadBalancingStrategy,
        opts: Options,
    ) -> Result<Self> {
        if shards == 0 {
            return Err(Error::InvalidMultiPoolSize);
        }
        let pools = (0..shards)
            .map(|_| Pool::with_options(size_per_pool, opts.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            core: MultiPoolCore::new(pools, strategy),
        })
    }

    /// Submits a task to the shard the strategy picks. Under round-robin,
    /// an overloaded shard earns the task one retry on the least-loaded
    /// shard.
    ///
    /// # Errors
    ///
    /// [`Error::PoolClosed`] after [`release`](Self::release);
    /// [`Error::PoolOverload`] when the chosen shard (and, for
    /// round-robin, the fallback shard) is saturated.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.core.is_closed() {
            return Err(Error::PoolClosed);
        }

        let shard = &self.core.pools[self.core.next(self.core.strategy)];
        match shard.submit_task(Box::new(task)) {
            Ok(()) => Ok(()),
            Err((task, Error::PoolOverload))
                if self.core.strategy == LoadBalancingStrategy::RoundRobin =>
            {
                let fallback = &self.core.pools[self.core.next(LoadBalancingStrategy::LeastTasks)];
                fallback.submit_task(task).map_err(|(_, err)| err)
            }
            Err((_, err)) => Err(err),
        }
    }

    /// Total number of live workers across all shards.
    pub fn running(&self) -> i32 {
        self.core.running()
    }

    /// Sum of per-shard free capacity. Negative for unbounded shards.
    pub fn free(&self) -> i32 {
        self.core.free()
    }

    /// Total number of blocked submitters across all shards.
    pub fn waiting(&self) -> i32 {
        self.core.waiting()
    }

    /// Total capacity across all shards.
    pub fn cap(&self) -> i32 {
        self.core.cap()
    }

    /// Applies `size` to every shard, so the total capacity becomes
    /// `shards * size`.
    pub fn tune(&self, size: i32) {
        self.core.tune(size);
    }

    /// Whether this multi-pool has been released and not rebooted.
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Latches the closed state and releases every shard. Idempotent.
    pub fn release(&self) {
        self.core.release();
    }

    /// Releases every shard in parallel, waiting up to `timeout` for each;
    /// the first shard error wins.
    pub fn release_timeout(&self, timeout: Duration) -> Result<()> {
        self.core.release_timeout(timeout)
    }

    /// Reopens a closed multi-pool, rebooting every shard and resetting
    /// the round-robin cursor.
    pub fn reboot(&self) {
        self.core.reboot();
    }

    /// Borrows the shard at `index`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPoolIndex`] when `index` is out of range.
    pub fn pool_at(&self, index: usize) -> Result<&Pool> {
        self.core.pool_at(index)
    }

    /// Number of shards.
    pub fn pool_count(&self) -> usize {
        self.core.pool_count()
    }
}
