use super::{LoadBalancingStrategy, MultiPoolCore};
use crate::error::{Error, Result};
use crate::options::{Builder, Options};
use crate::pool::TypedPool;
use std::sync::Arc;
use std::time::Duration;

/// The typed-parameter counterpart of [`MultiPool`]: a sharded front-end
/// over independent [`TypedPool`]s, all bound to the same function.
///
/// [`MultiPool`]: crate::MultiPool
pub struct TypedMultiPool<T: Send + 'static> {
    core: MultiPoolCore<TypedPool<T>>,
}

impl<T: Send + 'static> TypedMultiPool<T> {
    /// Creates `shards` independent typed pools of capacity
    /// `size_per_pool` each, every worker running `func`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidMultiPoolSize`] for a zero shard count;
    /// [`Error::InvalidPoolSize`] when the per-shard size is invalid.
    pub fn new<F>(
        shards: usize,
        size_per_pool: i32,
        func: F,
        strategy: LoadBalancingStrategy,
    ) -> Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Builder::new().build_typed_multi(shards, size_per_pool, func, strategy)
    }

    /// A [`Builder`] for a customized multi-pool.
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn with_options<F>(
        shards: usize,
        size_per_pool: i32,
        func: F,
        strategy: LoadBalancingStrategy,
        opts: Options,
    ) -> Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        if shards == 0 {
            return Err(Error::InvalidMultiPoolSize);
        }
        let func = Arc::new(func);
        let pools = (0..shards)
            .map(|_| {
                let func = Arc::clone(&func);
                TypedPool::with_options(size_per_pool, move |arg| func(arg), opts.clone())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            core: MultiPoolCore::new(pools, strategy),
        })
    }

    /// Submits one invocation of the pool function to the shard the
    /// strategy picks. Under round-robin, an overloaded shard earns the
    /// argument one retry on the least-loaded shard.
    ///
    /// # Errors
    ///
    /// [`Error::PoolClosed`] after [`release`](Self::release);
    /// [`Error::PoolOverload`] when the chosen shard (and, for
    /// round-robin, the fallback shard) is saturated.
    pub fn invoke(&self, arg: T) -> Result<()> {
        if self.core.is_closed() {
            return Err(Error::PoolClosed);
        }

        let shard = &self.core.pools[self.core.next(self.core.strategy)];
        match shard.try_invoke(arg) {
            Ok(()) => Ok(()),
            Err((arg, Error::PoolOverload))
                if self.core.strategy == LoadBalancingStrategy::RoundRobin =>
            {
                let fallback = &self.core.pools[self.core.next(LoadBalancingStrategy::LeastTasks)];
                fallback.try_invoke(arg).map_err(|(_, err)| err)
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
    pub fn pool_at(&self, index: usize) -> Result<&TypedPool<T>> {
        self.core.pool_at(index)
    }

    /// Number of shards.
    pub fn pool_count(&self) -> usize {
        self.core.pool_count()
    }
}
