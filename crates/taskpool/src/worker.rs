use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock};
use std::thread;

/// The contract between the pool core and its workers.
///
/// A worker owns one execution context and one inbound task slot. The pool
/// parks idle workers in the queue ordered by last-use time, recycles their
/// structs through the object cache, and terminates them by `finish`.
pub(crate) trait Worker: Send + Sync + 'static {
    /// Starts the worker's thread loop. Increments the pool's running count
    /// synchronously, before the thread is spawned, so that capacity checks
    /// observe the new worker immediately.
    fn run(self: Arc<Self>);

    /// Delivers the exit sentinel; the worker leaves its loop without
    /// reverting to the idle queue.
    fn finish(&self);

    /// Last-use timestamp in pool-clock milliseconds.
    fn last_used(&self) -> u64;

    /// Stamps the last-use timestamp; called on every revert, before the
    /// worker is inserted into the idle queue.
    fn set_last_used(&self, at_millis: u64);
}

/// Capacity of a worker's inbound task channel.
///
/// On a single-CPU host the channel is a rendezvous (capacity 0): the
/// handoff switches straight from sender to receiver. With more CPUs a
/// one-slot buffer keeps the submitter from being dragged down by a
/// CPU-bound receiver.
pub(crate) static WORKER_CHAN_CAP: LazyLock<usize> = LazyLock::new(|| {
    if thread::available_parallelism().map_or(1, NonZeroUsize::get) == 1 {
        0
    } else {
        1
    }
});
