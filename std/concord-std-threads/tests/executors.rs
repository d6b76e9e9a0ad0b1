//!
//! Integration tests for the executors
//!
//! Both executors are driven through `dyn Executor` and checked for
//! completeness; the pool is also checked against its size bound.
//!

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use concord_std_core::{OverflowPolicy, task};
use concord_std_threads::{Executor, PooledExecutor, QueuedExecutor};

fn run_all(executor: &dyn Executor, n: usize) -> usize {
    let done = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();
    for _ in 0..n {
        let done = Arc::clone(&done);
        let tx = tx.clone();
        executor
            .execute(task(move || {
                done.fetch_add(1, Ordering::SeqCst);
                tx.send(()).unwrap();
            }))
            .unwrap();
    }
    for _ in 0..n {
        rx.recv_timeout(Duration::from_secs(10)).unwrap();
    }
    done.load(Ordering::SeqCst)
}

#[test]
fn test_every_task_runs() {
    assert_eq!(run_all(&PooledExecutor::new(), 200), 200);
    assert_eq!(run_all(&QueuedExecutor::new(), 200), 200);
}

#[test]
fn test_pool_size_never_exceeds_maximum() {
    let pool = Arc::new(
        PooledExecutor::builder()
            .maximum_pool_size(3)
            .policy(OverflowPolicy::WaitForSlot)
            .build()
            .unwrap(),
    );
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();

    let submitters: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let tx = tx.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    let running = Arc::clone(&running);
                    let peak = Arc::clone(&peak);
                    let tx = tx.clone();
                    pool.submit(task(move || {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(1));
                        running.fetch_sub(1, Ordering::SeqCst);
                        tx.send(()).unwrap();
                    }))
                    .unwrap();
                    assert!(pool.pool_size() <= 3);
                }
            })
        })
        .collect();

    for h in submitters {
        h.join().unwrap();
    }
    for _ in 0..100 {
        rx.recv_timeout(Duration::from_secs(10)).unwrap();
    }
    assert!(peak.load(Ordering::SeqCst) <= 3);
    pool.shutdown_now();
    assert!(pool.await_termination(Duration::from_secs(5)).unwrap());
}
