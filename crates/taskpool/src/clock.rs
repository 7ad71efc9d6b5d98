use core::time::Duration;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Interval at which the pool's ticker thread refreshes the cached time.
pub(crate) const NOW_UPDATE_INTERVAL: Duration = Duration::from_millis(500);

/// A cached monotonic clock, read on the revert hot path instead of the OS
/// clock.
///
/// Timestamps are milliseconds since pool construction, stored in an atomic
/// that the pool's ticker thread refreshes every [`NOW_UPDATE_INTERVAL`].
/// Readers therefore observe a value up to 500 ms stale; the idle-expiry
/// boundary inherits that staleness window, which also acts as an effective
/// floor on `expiry_duration`.
pub(crate) struct CachedClock {
    origin: Instant,
    now_ms: AtomicU64,
}

impl CachedClock {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
            now_ms: AtomicU64::new(0),
        }
    }

    /// The cached timestamp, in milliseconds since construction.
    pub(crate) fn now_millis(&self) -> u64 {
        self.now_ms.load(Ordering::Relaxed)
    }

    /// Re-reads the monotonic clock and publishes the new timestamp.
    pub(crate) fn refresh(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.now_ms.store(elapsed, Ordering::Relaxed);
    }
}
