mod task;
mod typed;

#[cfg(test)]
mod tests;

pub use task::MultiPool;
pub use typed::TypedMultiPool;

use crate::error::{Error, Result};
use crate::pool::Pooler;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

const OPENED: u8 = 0;
const CLOSED: u8 = 1;

/// How a multi-pool picks the shard for the next submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancingStrategy {
    /// Rotate across shards in submission order. Oblivious to local
    /// saturation, which is why an overloaded round-robin submission gets
    /// one least-tasks retry.
    RoundRobin,
    /// Scan for the shard with the fewest running workers, ties broken by
    /// the lowest index.
    LeastTasks,
}

/// Shard vector, routing state, and the lifecycle fan-out shared by
/// [`MultiPool`] and [`TypedMultiPool`].
pub(crate) struct MultiPoolCore<P: Pooler> {
    pub(crate) pools: Vec<P>,
    /// Round-robin cursor; seeded to `u32::MAX` so the first increment
    /// wraps to shard 0.
    index: AtomicU32,
    state: AtomicU8,
    pub(crate) strategy: LoadBalancingStrategy,
}

impl<P: Pooler> MultiPoolCore<P> {
    pub(crate) fn new(pools: Vec<P>, strategy: LoadBalancingStrategy) -> Self {
        Self {
            pools,
            index: AtomicU32::new(u32::MAX),
            state: AtomicU8::new(OPENED),
            strategy,
        }
    }

    /// Index of the shard the given strategy picks next.
    pub(crate) fn next(&self, strategy: LoadBalancingStrategy) -> usize {
        match strategy {
            LoadBalancingStrategy::RoundRobin => {
                let next = self.index.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
                (next % self.pools.len() as u32) as usize
            }
            LoadBalancingStrategy::LeastTasks => {
                let mut idx = 0;
                let mut least = i32::MAX;
                for (i, pool) in self.pools.iter().enumerate() {
                    let running = pool.running();
                    if running < least {
                        least = running;
                        idx = i;
                    }
                }
                idx
            }
        }
    }

    pub(crate) fn running(&self) -> i32 {
        self.pools.iter().map(Pooler::running).sum()
    }

    pub(crate) fn free(&self) -> i32 {
        self.pools.iter().map(Pooler::free).sum()
    }

    pub(crate) fn waiting(&self) -> i32 {
        self.pools.iter().map(Pooler::waiting).sum()
    }

    pub(crate) fn cap(&self) -> i32 {
        self.pools.iter().map(Pooler::cap).sum()
    }

    pub(crate) fn tune(&self, size: i32) {
        for pool in &self.pools {
            pool.tune(size);
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == CLOSED
    }

    pub(crate) fn release(&self) {
        if self
            .state
            .compare_exchange(OPENED, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        for pool in &self.pools {
            pool.release();
        }
    }

    /// Releases every shard in parallel and waits for all of them; the
    /// first shard error (in index order) wins.
    pub(crate) fn release_timeout(&self, timeout: Duration) -> Result<()> {
        if self
            .state
            .compare_exchange(OPENED, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::PoolClosed);
        }

        let mut result = Ok(());
        thread::scope(|s| {
            let handles: Vec<_> = self
                .pools
                .iter()
                .map(|pool| s.spawn(move || pool.release_timeout(timeout)))
                .collect();
            for handle in handles {
                let shard = handle.join().expect("shard release thread panicked");
                if result.is_ok() {
                    result = shard;
                }
            }
        });
        result
    }

    pub(crate) fn reboot(&self) {
        if self
            .state
            .compare_exchange(CLOSED, OPENED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.index.store(0, Ordering::Relaxed);
            for pool in &self.pools {
                pool.reboot();
            }
        }
    }

    pub(crate) fn pool_at(&self, index: usize) -> Result<&P> {
        self.pools.get(index).ok_or(Error::InvalidPoolIndex)
    }

    pub(crate) fn pool_count(&self) -> usize {
        self.pools.len()
    }
}
