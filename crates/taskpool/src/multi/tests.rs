use crate::{
    Builder, Error, LoadBalancingStrategy, MultiPool, Pooler, TypedMultiPool,
};
use crossbeam_channel::unbounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[test]
fn round_robin_rotates_across_shards() {
    let pool = MultiPool::new(2, 1, LoadBalancingStrategy::RoundRobin).unwrap();
    let (tx, rx) = unbounded::<()>();

    // The cursor starts one step before shard 0, so the first two
    // submissions land on shards 0 and 1 in order.
    for _ in 0..2 {
        let rx = rx.clone();
        pool.submit(move || {
            let _ = rx.recv();
        })
        .unwrap();
    }

    assert_eq!(pool.pool_at(0).unwrap().running(), 1);
    assert_eq!(pool.pool_at(1).unwrap().running(), 1);
    assert_eq!(pool.running(), 2);

    drop(tx);
    drop(rx);
    assert_eq!(pool.release_timeout(Duration::from_secs(2)), Ok(()));
}

#[test]
fn round_robin_overload_falls_back_then_fails() {
    let pool = Builder::new()
        .nonblocking(true)
        .build_multi(2, 1, LoadBalancingStrategy::RoundRobin)
        .unwrap();
    let (tx0, rx0) = unbounded::<()>();
    let (tx1, rx1) = unbounded::<()>();

    // Fill both shards with one blocked task each.
    pool.submit(move || {
        let _ = rx0.recv();
    })
    .unwrap();
    pool.submit(move || {
        let _ = rx1.recv();
    })
    .unwrap();
    assert_eq!(pool.running(), 2);
    assert_eq!(pool.free(), 0);

    // Round-robin picks a saturated shard, the least-tasks retry finds
    // every shard equally saturated, and the overload surfaces.
    assert_eq!(pool.submit(|| {}), Err(Error::PoolOverload));

    // Draining one shard makes the fallback path succeed again.
    drop(tx0);
    assert!(wait_until(Duration::from_secs(2), || pool.submit(|| {}).is_ok()));

    drop(tx1);
}

#[test]
fn least_tasks_prefers_the_emptier_shard() {
    let pool = MultiPool::new(2, 2, LoadBalancingStrategy::LeastTasks).unwrap();
    let (tx, rx) = unbounded::<()>();

    for _ in 0..2 {
        let rx = rx.clone();
        pool.submit(move || {
            let _ = rx.recv();
        })
        .unwrap();
    }

    // With ties broken by index, the two submissions spread one per shard.
    assert_eq!(pool.pool_at(0).unwrap().running(), 1);
    assert_eq!(pool.pool_at(1).unwrap().running(), 1);

    drop(tx);
    drop(rx);
}

#[test]
fn aggregates_sum_over_shards() {
    let pool = MultiPool::new(3, 4, LoadBalancingStrategy::RoundRobin).unwrap();
    assert_eq!(pool.cap(), 12);
    assert_eq!(pool.running(), 0);
    assert_eq!(pool.waiting(), 0);
    assert_eq!(pool.free(), 12);
    assert_eq!(pool.pool_count(), 3);

    pool.tune(2);
    assert_eq!(pool.cap(), 6);
}

#[test]
fn release_latches_and_fans_out() {
    let pool = MultiPool::new(2, 2, LoadBalancingStrategy::RoundRobin).unwrap();
    pool.submit(|| {}).unwrap();

    pool.release();
    assert!(pool.is_closed());
    assert!(pool.pool_at(0).unwrap().is_closed());
    assert!(pool.pool_at(1).unwrap().is_closed());
    assert_eq!(pool.submit(|| {}), Err(Error::PoolClosed));

    // Releasing again is a quiet no-op.
    pool.release();
}

#[test]
fn release_timeout_waits_for_all_shards() {
    let pool = MultiPool::new(2, 2, LoadBalancingStrategy::RoundRobin).unwrap();
    let (tx, rx) = unbounded();

    for i in 0..4 {
        let tx = tx.clone();
        pool.submit(move || {
            tx.send(i).unwrap();
        })
        .unwrap();
    }
    drop(tx);
    let done: Vec<i32> = rx.iter().collect();
    assert_eq!(done.len(), 4);

    assert_eq!(pool.release_timeout(Duration::from_secs(2)), Ok(()));
    assert_eq!(pool.running(), 0);
    assert_eq!(
        pool.release_timeout(Duration::from_secs(2)),
        Err(Error::PoolClosed)
    );
}

#[test]
fn reboot_reopens_every_shard() {
    let pool = MultiPool::new(2, 1, LoadBalancingStrategy::RoundRobin).unwrap();
    assert_eq!(pool.release_timeout(Duration::from_secs(2)), Ok(()));
    assert!(pool.is_closed());

    pool.reboot();
    assert!(!pool.is_closed());
    assert!(!pool.pool_at(0).unwrap().is_closed());

    let (tx, rx) = unbounded();
    pool.submit(move || {
        tx.send(()).unwrap();
    })
    .unwrap();
    rx.recv_timeout(Duration::from_secs(1)).unwrap();
}

#[test]
fn constructor_rejects_invalid_shapes() {
    assert_eq!(
        MultiPool::new(0, 1, LoadBalancingStrategy::RoundRobin).unwrap_err(),
        Error::InvalidMultiPoolSize
    );
    assert_eq!(
        MultiPool::new(2, 0, LoadBalancingStrategy::RoundRobin).unwrap_err(),
        Error::InvalidPoolSize
    );
}

#[test]
fn pool_at_rejects_out_of_range_indices() {
    let pool = MultiPool::new(2, 1, LoadBalancingStrategy::RoundRobin).unwrap();
    assert!(pool.pool_at(1).is_ok());
    assert_eq!(pool.pool_at(2).unwrap_err(), Error::InvalidPoolIndex);
}

#[test]
fn typed_multi_pool_routes_invocations() {
    let sum = Arc::new(AtomicUsize::new(0));
    let pool = {
        let sum = Arc::clone(&sum);
        TypedMultiPool::new(2, 2, move |n: usize| {
            sum.fetch_add(n, Ordering::Relaxed);
        }, LoadBalancingStrategy::RoundRobin)
        .unwrap()
    };

    for n in 1..=10 {
        pool.invoke(n).unwrap();
    }

    assert_eq!(pool.release_timeout(Duration::from_secs(2)), Ok(()));
    assert_eq!(sum.load(Ordering::Relaxed), 55);
}

#[test]
fn typed_multi_pool_overload_fallback() {
    let (tx, rx) = unbounded::<()>();
    let pool = {
        let rx = rx.clone();
        Builder::new()
            .nonblocking(true)
            .build_typed_multi(
                2,
                1,
                move |_: u32| {
                    let _ = rx.recv();
                },
                LoadBalancingStrategy::RoundRobin,
            )
            .unwrap()
    };

    pool.invoke(1).unwrap();
    pool.invoke(2).unwrap();
    assert_eq!(pool.invoke(3), Err(Error::PoolOverload));
    assert_eq!(pool.invoke(4), Err(Error::PoolOverload));

    drop(tx);
    drop(rx);
    assert!(wait_until(Duration::from_secs(2), || pool.invoke(5).is_ok()));
}

#[test]
fn typed_multi_pool_release_and_reboot() {
    let pool = TypedMultiPool::new(2, 1, |_: u8| {}, LoadBalancingStrategy::LeastTasks).unwrap();
    pool.invoke(1).unwrap();

    pool.release();
    assert_eq!(pool.invoke(2), Err(Error::PoolClosed));

    pool.reboot();
    pool.invoke(3).unwrap();
}
