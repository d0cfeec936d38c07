//! Decorated stack stress tests

use super::{ConcurrencyTracker, Failure};
use fortify::{
    Bulkhead, BulkheadConfig, CircuitBreaker, CircuitBreakerConfig, Decorators, Retry,
    RetryConfig,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Test: a full stack shared by many threads keeps every invariant
#[test]
#[ignore]
fn stress_shared_decorated_stack() {
    let tracker = ConcurrencyTracker::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let bulkhead = Arc::new(Bulkhead::new(
        "stress",
        BulkheadConfig::builder()
            .max_concurrent_calls(8)
            .max_wait_duration(Duration::from_secs(10))
            .build(),
    ));
    let breaker = Arc::new(CircuitBreaker::new(
        "stress",
        CircuitBreakerConfig::builder()
            .failure_rate_threshold(1.0)
            .build(),
    ));

    let t = Arc::clone(&tracker);
    let c = Arc::clone(&calls);
    let decorated = Decorators::of_supplier(move || {
        t.enter();
        let n = c.fetch_add(1, Ordering::Relaxed);
        t.exit();
        if n % 3 == 0 { Err(Failure) } else { Ok(n) }
    })
    .with_bulkhead(Arc::clone(&bulkhead))
    .with_circuit_breaker(breaker)
    .with_retry(Arc::new(Retry::new(
        "stress",
        RetryConfig::builder()
            .max_attempts(3)
            .wait_duration(Duration::ZERO)
            .build(),
    )))
    .decorate();

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let decorated = decorated.clone();
            thread::spawn(move || {
                for _ in 0..10_000 {
                    let _ = decorated.invoke();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    println!("operation calls: {}", calls.load(Ordering::Relaxed));
    assert!(tracker.peak() <= 8);
    assert_eq!(bulkhead.metrics().available_concurrent_calls, 8);
}
