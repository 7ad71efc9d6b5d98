use crate::{Builder, Error, Pool, Pooler, TypedPool};
use crossbeam_channel::unbounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Polls `cond` every 10 ms until it holds or `timeout` elapses.
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
fn submit_runs_task() {
    let pool = Pool::new(4).unwrap();
    let (tx, rx) = unbounded();

    pool.submit(move || {
        tx.send(42).unwrap();
    })
    .unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 42);
    assert!(pool.running() >= 1);
}

#[test]
fn submit_on_fresh_pool_never_parks() {
    let pool = Pool::new(2).unwrap();
    let start = Instant::now();
    pool.submit(|| {}).unwrap();
    // With free capacity the submission path must not touch the condvar.
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(pool.waiting(), 0);
}

#[test]
fn capacity_bounds_running_and_purger_reclaims() {
    let size = 10;
    let pool = Pool::new(size).unwrap();
    let (tx, rx) = unbounded::<()>();

    for _ in 0..size {
        let rx = rx.clone();
        pool.submit(move || {
            let _ = rx.recv();
        })
        .unwrap();
    }

    assert_eq!(pool.running(), size);
    assert_eq!(pool.free(), 0);
    assert_eq!(pool.cap(), size);

    // Unblock every task; the workers go idle and the purger reaps them
    // within two expiry ticks (plus the cached clock's staleness window).
    drop(tx);
    drop(rx);
    assert!(wait_until(Duration::from_secs(4), || pool.running() == 0));
}

#[test]
fn nonblocking_pool_reports_overload() {
    let pool = Builder::new().nonblocking(true).build(1).unwrap();
    let (tx, rx) = unbounded::<()>();

    {
        let rx = rx.clone();
        pool.submit(move || {
            let _ = rx.recv();
        })
        .unwrap();
    }

    // The worker count is bumped synchronously, so the second submission
    // deterministically sees a saturated pool.
    assert_eq!(pool.submit(|| {}), Err(Error::PoolOverload));

    drop(tx);
    drop(rx);
    assert!(wait_until(Duration::from_secs(2), || pool.submit(|| {}).is_ok()));
}

#[test]
fn max_blocking_tasks_caps_parked_submitters() {
    let pool = Arc::new(Builder::new().max_blocking_tasks(1).build(1).unwrap());
    let (tx, rx) = unbounded::<()>();

    {
        let rx = rx.clone();
        pool.submit(move || {
            let _ = rx.recv();
        })
        .unwrap();
    }

    // One submitter may park.
    let parked = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.submit(|| {}))
    };
    assert!(wait_until(Duration::from_secs(2), || pool.waiting() == 1));

    // The next would exceed the blocking cap.
    assert_eq!(pool.submit(|| {}), Err(Error::PoolOverload));

    // Draining frees the worker and the parked submission concludes.
    drop(tx);
    drop(rx);
    assert_eq!(parked.join().unwrap(), Ok(()));
    assert!(wait_until(Duration::from_secs(2), || pool.waiting() == 0));
}

#[test]
fn release_closes_and_reboot_reopens() {
    let pool = Pool::new(10).unwrap();
    let (tx, rx) = unbounded();

    pool.submit(move || {
        tx.send(()).unwrap();
    })
    .unwrap();
    rx.recv_timeout(Duration::from_secs(1)).unwrap();

    assert_eq!(pool.release_timeout(Duration::from_secs(1)), Ok(()));
    assert!(pool.is_closed());
    assert_eq!(pool.submit(|| {}), Err(Error::PoolClosed));

    pool.reboot();
    assert!(!pool.is_closed());
    pool.submit(|| {}).unwrap();
}

#[test]
fn release_unblocks_parked_submitters_with_closed() {
    let pool = Arc::new(Pool::new(1).unwrap());
    let (tx, rx) = unbounded::<()>();

    {
        let rx = rx.clone();
        pool.submit(move || {
            let _ = rx.recv();
        })
        .unwrap();
    }

    let parked = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.submit(|| {}))
    };
    assert!(wait_until(Duration::from_secs(2), || pool.waiting() == 1));

    // The broadcast in release reaches the parked submitter, which then
    // observes the closed state instead of retrying.
    pool.release();
    assert_eq!(parked.join().unwrap(), Err(Error::PoolClosed));

    drop(tx);
    drop(rx);
    assert!(wait_until(Duration::from_secs(2), || pool.running() == 0));
}

#[test]
fn release_timeout_on_closed_pool() {
    let pool = Pool::new(2).unwrap();
    assert_eq!(pool.release_timeout(Duration::from_secs(1)), Ok(()));
    assert_eq!(
        pool.release_timeout(Duration::from_secs(1)),
        Err(Error::PoolClosed)
    );
}

#[test]
fn release_timeout_expires_with_stuck_task() {
    let pool = Pool::new(1).unwrap();
    let (tx, rx) = unbounded::<()>();

    pool.submit(move || {
        let _ = rx.recv();
    })
    .unwrap();

    assert_eq!(
        pool.release_timeout(Duration::from_millis(100)),
        Err(Error::Timeout)
    );

    // The generation's stop handles are consumed by the first call.
    assert_eq!(
        pool.release_timeout(Duration::from_millis(100)),
        Err(Error::PoolClosed)
    );

    drop(tx);
    assert!(wait_until(Duration::from_secs(2), || pool.running() == 0));
}

#[test]
fn unbounded_pool_grows_on_nested_submit() {
    let pool = Arc::new(Pool::new(-1).unwrap());
    assert_eq!(pool.cap(), -1);
    assert_eq!(pool.free(), -1);

    let (outer_tx, outer_rx) = unbounded::<()>();
    let (inner_tx, inner_rx) = unbounded::<()>();

    {
        let pool = Arc::clone(&pool);
        let outer_rx = outer_rx.clone();
        pool.clone()
            .submit(move || {
                pool.submit(move || {
                    let _ = inner_rx.recv();
                })
                .unwrap();
                let _ = outer_rx.recv();
            })
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(2), || pool.running() == 2));
    assert_eq!(pool.free(), -1);

    drop(outer_tx);
    drop(inner_tx);
    assert_eq!(pool.release_timeout(Duration::from_secs(2)), Ok(()));
}

#[test]
fn panic_handler_sees_payload_and_worker_survives() {
    let payloads = Arc::new(Mutex::new(Vec::new()));
    let pool = {
        let payloads = Arc::clone(&payloads);
        Builder::new()
            .panic_handler(move |payload| {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map_or_else(|| "<opaque>".to_owned(), |s| (*s).to_owned());
                payloads.lock().unwrap().push(msg);
            })
            .build(1)
            .unwrap()
    };

    pool.submit(|| panic!("boom")).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        payloads.lock().unwrap().len() == 1
    }));
    assert_eq!(payloads.lock().unwrap()[0], "boom");

    // The worker recovered and reverted; the pool still serves tasks.
    let (tx, rx) = unbounded();
    pool.submit(move || {
        tx.send(()).unwrap();
    })
    .unwrap();
    rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(payloads.lock().unwrap().len(), 1);
    assert_eq!(pool.running(), 1);
}

#[test]
fn panic_without_handler_is_swallowed() {
    let pool = Pool::new(1).unwrap();
    pool.submit(|| panic!("ignored")).unwrap();

    let (tx, rx) = unbounded();
    pool.submit(move || {
        tx.send(()).unwrap();
    })
    .unwrap();
    rx.recv_timeout(Duration::from_secs(1)).unwrap();
}

#[test]
fn tune_adjusts_capacity() {
    let pool = Pool::new(2).unwrap();
    assert_eq!(pool.cap(), 2);

    pool.tune(5);
    assert_eq!(pool.cap(), 5);

    // No-ops: non-positive, unchanged.
    pool.tune(0);
    pool.tune(-3);
    assert_eq!(pool.cap(), 5);
    pool.tune(5);
    assert_eq!(pool.cap(), 5);
}

#[test]
fn tune_is_a_no_op_for_unbounded_and_preallocated_pools() {
    let unbounded_pool = Pool::new(-1).unwrap();
    unbounded_pool.tune(8);
    assert_eq!(unbounded_pool.cap(), -1);

    let prealloc_pool = Builder::new().prealloc(true).build(4).unwrap();
    prealloc_pool.tune(8);
    assert_eq!(prealloc_pool.cap(), 4);
}

#[test]
fn tune_down_retires_surplus_workers() {
    let pool = Pool::new(4).unwrap();
    let (tx, rx) = unbounded::<()>();

    for _ in 0..4 {
        let rx = rx.clone();
        pool.submit(move || {
            let _ = rx.recv();
        })
        .unwrap();
    }
    assert_eq!(pool.running(), 4);

    pool.tune(1);
    drop(tx);
    drop(rx);

    // Reverting workers observe the shrunken capacity and exit.
    assert!(wait_until(Duration::from_secs(2), || pool.running() <= 1));
}

#[test]
fn tune_up_unparks_blocked_submitters() {
    let pool = Arc::new(Pool::new(1).unwrap());
    let (tx, rx) = unbounded::<()>();

    {
        let rx = rx.clone();
        pool.submit(move || {
            let _ = rx.recv();
        })
        .unwrap();
    }

    let parked = {
        let pool = Arc::clone(&pool);
        let rx = rx.clone();
        thread::spawn(move || {
            pool.submit(move || {
                let _ = rx.recv();
            })
        })
    };
    assert!(wait_until(Duration::from_secs(2), || pool.waiting() == 1));

    pool.tune(2);
    assert_eq!(parked.join().unwrap(), Ok(()));
    assert!(wait_until(Duration::from_secs(2), || pool.running() == 2));

    drop(tx);
    drop(rx);
}

#[test]
fn constructor_rejects_invalid_sizes() {
    assert_eq!(Pool::new(0).unwrap_err(), Error::InvalidPoolSize);
    assert_eq!(Pool::new(-2).unwrap_err(), Error::InvalidPoolSize);
    assert_eq!(
        Builder::new().prealloc(true).build(-1).unwrap_err(),
        Error::InvalidPreAllocSize
    );
}

#[test]
fn preallocated_pool_serves_and_reclaims() {
    let pool = Builder::new()
        .prealloc(true)
        .expiry_duration(Duration::from_millis(600))
        .build(4)
        .unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..16 {
        let counter = Arc::clone(&counter);
        pool.submit(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
    }

    assert!(wait_until(Duration::from_secs(2), || {
        counter.load(Ordering::Relaxed) == 16
    }));
    // The FIFO ring drains through the same purge path as the stack.
    assert!(wait_until(Duration::from_secs(4), || pool.running() == 0));
}

#[test]
fn disable_purge_keeps_idle_workers_alive() {
    let pool = Builder::new()
        .disable_purge(true)
        .expiry_duration(Duration::from_millis(500))
        .build(2)
        .unwrap();

    let (tx, rx) = unbounded();
    pool.submit(move || {
        tx.send(()).unwrap();
    })
    .unwrap();
    rx.recv_timeout(Duration::from_secs(1)).unwrap();

    thread::sleep(Duration::from_millis(1500));
    assert_eq!(pool.running(), 1);

    assert_eq!(pool.release_timeout(Duration::from_secs(1)), Ok(()));
}

#[test]
fn dropping_the_pool_releases_it() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let pool = Pool::new(2).unwrap();
        let counter_clone = Arc::clone(&counter);
        pool.submit(move || {
            counter_clone.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        assert!(wait_until(Duration::from_secs(1), || {
            counter.load(Ordering::Relaxed) == 1
        }));
    }
    // The drop released the pool; nothing to assert beyond not hanging.
}

#[test]
fn typed_pool_invokes_bound_function() {
    let sum = Arc::new(AtomicUsize::new(0));
    let pool = {
        let sum = Arc::clone(&sum);
        TypedPool::new(4, move |n: usize| {
            sum.fetch_add(n, Ordering::Relaxed);
        })
        .unwrap()
    };

    for n in 1..=10 {
        pool.invoke(n).unwrap();
    }

    assert_eq!(pool.release_timeout(Duration::from_secs(2)), Ok(()));
    assert_eq!(sum.load(Ordering::Relaxed), 55);
}

#[test]
fn typed_pool_reports_overload_when_nonblocking() {
    let (tx, rx) = unbounded::<()>();
    let pool = {
        let rx = rx.clone();
        Builder::new()
            .nonblocking(true)
            .build_typed(1, move |_: u32| {
                let _ = rx.recv();
            })
            .unwrap()
    };

    pool.invoke(1).unwrap();
    assert_eq!(pool.invoke(2), Err(Error::PoolOverload));

    drop(tx);
    drop(rx);
    assert!(wait_until(Duration::from_secs(2), || pool.invoke(3).is_ok()));
}

#[test]
fn typed_pool_release_and_reboot() {
    let pool = TypedPool::new(2, |_: u8| {}).unwrap();
    pool.invoke(1).unwrap();

    assert_eq!(pool.release_timeout(Duration::from_secs(1)), Ok(()));
    assert_eq!(pool.invoke(2), Err(Error::PoolClosed));

    pool.reboot();
    pool.invoke(3).unwrap();
}

#[test]
fn typed_pool_panic_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let pool = {
        let hits = Arc::clone(&hits);
        Builder::new()
            .panic_handler(move |_| {
                hits.fetch_add(1, Ordering::Relaxed);
            })
            .build_typed(1, |n: u32| {
                assert!(n != 7, "unlucky");
            })
            .unwrap()
    };

    pool.invoke(7).unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        hits.load(Ordering::Relaxed) == 1
    }));

    pool.invoke(1).unwrap();
    assert!(wait_until(Duration::from_secs(1), || pool.waiting() == 0));
    assert_eq!(hits.load(Ordering::Relaxed), 1);
}

#[test]
fn workers_are_recycled_between_tasks() {
    let pool = Pool::new(1).unwrap();
    let (tx, rx) = unbounded();

    for i in 0..50 {
        let tx = tx.clone();
        pool.submit(move || {
            tx.send(i).unwrap();
        })
        .unwrap();
    }
    drop(tx);

    let received: Vec<i32> = rx.iter().collect();
    // One worker, so arrival order is execution order.
    assert_eq!(received, (0..50).collect::<Vec<_>>());
    assert!(pool.running() <= 1);
}
