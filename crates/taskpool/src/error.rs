pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the pool, the typed pool, and the multi-pool.
///
/// Submission errors ([`Error::PoolClosed`], [`Error::PoolOverload`]) are the
/// only ones a caller sees after construction; [`Error::PoolOverload`] is the
/// only recoverable one. Everything else is surfaced synchronously from a
/// constructor or from [`release_timeout`].
///
/// [`release_timeout`]: crate::Pooler::release_timeout
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The pool has been released and not rebooted.
    #[error("this pool has been closed")]
    PoolClosed,

    /// The pool is full and no worker freed up: either the pool is
    /// nonblocking, or the number of blocked submitters reached the
    /// configured maximum.
    #[error("too many submitters blocked on submit or nonblocking pool is full")]
    PoolOverload,

    /// A typed pool was built without a function. Unreachable through this
    /// API (the constructor takes the function by value), retained in the
    /// taxonomy for callers matching exhaustively against older versions.
    #[error("must provide function for pool")]
    MissingPoolFunc,

    /// The multi-pool shard count is zero.
    #[error("invalid multi-pool size")]
    InvalidMultiPoolSize,

    /// The load-balancing strategy is not recognized. Unreachable through
    /// this API ([`LoadBalancingStrategy`] is a closed enum), retained in
    /// the taxonomy for callers matching exhaustively against older
    /// versions.
    ///
    /// [`LoadBalancingStrategy`]: crate::LoadBalancingStrategy
    #[error("invalid load-balancing strategy")]
    InvalidLoadBalancingStrategy,

    /// A shard index passed to [`pool_at`] is out of range.
    ///
    /// [`pool_at`]: crate::MultiPool::pool_at
    #[error("invalid pool index")]
    InvalidPoolIndex,

    /// The fixed-capacity idle queue is full.
    #[error("the queue is full")]
    QueueIsFull,

    /// Pre-allocation was requested together with an unbounded capacity.
    #[error("can not set up a negative capacity under pre-allocation mode")]
    InvalidPreAllocSize,

    /// [`release_timeout`] expired before every worker exited.
    ///
    /// [`release_timeout`]: crate::Pooler::release_timeout
    #[error("operation timed out")]
    Timeout,

    /// The pool size is zero or a negative value other than `-1`.
    #[error("size must be greater than 0 or -1 for an unbounded pool")]
    InvalidPoolSize,
}
