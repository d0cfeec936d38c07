//! Bulkhead stress tests

use super::{ConcurrencyTracker, Failure};
use fortify::{
    Bulkhead, BulkheadConfig, ResilienceError, ThreadPoolBulkhead, ThreadPoolBulkheadConfig,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Test: thousands of waiting tasks never exceed the limit
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn stress_ten_thousand_waiters() {
    let bulkhead = Arc::new(Bulkhead::new(
        "stress",
        BulkheadConfig::builder()
            .max_concurrent_calls(32)
            .max_wait_duration(Duration::from_secs(60))
            .build(),
    ));
    let tracker = ConcurrencyTracker::new();

    let handles: Vec<_> = (0..10_000)
        .map(|_| {
            let bulkhead = Arc::clone(&bulkhead);
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                bulkhead
                    .execute(async {
                        tracker.enter();
                        tokio::time::sleep(Duration::from_micros(100)).await;
                        tracker.exit();
                        Ok::<_, Failure>(())
                    })
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    println!("Peak concurrency: {}", tracker.peak());
    assert!(tracker.peak() <= 32);
    assert_eq!(tracker.current(), 0);
    assert_eq!(bulkhead.metrics().available_concurrent_calls, 32);
}

/// Test: a saturated pool rejects instead of growing its queue
#[test]
#[ignore]
fn stress_thread_pool_saturation() {
    let pool = Arc::new(ThreadPoolBulkhead::new(
        "stress",
        ThreadPoolBulkheadConfig::builder()
            .core_thread_pool_size(2)
            .max_thread_pool_size(4)
            .queue_capacity(16)
            .build(),
    ));
    let completed = Arc::new(AtomicUsize::new(0));
    let mut tasks = Vec::new();
    let mut rejected = 0;

    for _ in 0..10_000 {
        let completed = Arc::clone(&completed);
        match pool.submit(move || {
            std::thread::sleep(Duration::from_micros(50));
            completed.fetch_add(1, Ordering::Relaxed);
            Ok::<_, ResilienceError<Failure>>(())
        }) {
            Ok(task) => tasks.push(task),
            Err(_) => rejected += 1,
        }
        let metrics = pool.metrics();
        assert!(metrics.queue_depth <= 16);
        assert!(metrics.thread_pool_size <= 4);
    }

    let accepted = tasks.len();
    for task in tasks {
        task.wait().unwrap().unwrap();
    }
    println!("accepted {accepted}, rejected {rejected}");
    assert_eq!(completed.load(Ordering::Relaxed), accepted);
    pool.shutdown();
}
