//! Circuit breaker stress tests

use super::{Failure, init_tracing};
use fortify::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Test: 1 million calls through a closed breaker
#[test]
#[ignore]
fn stress_one_million_calls() {
    let breaker = CircuitBreaker::new("stress", CircuitBreakerConfig::builder().build());
    let start = Instant::now();

    for _ in 0..1_000_000 {
        breaker.execute_sync(|| Ok::<_, Failure>(())).unwrap();
    }

    let elapsed = start.elapsed();
    println!("1M calls completed in {:?}", elapsed);
    println!(
        "Throughput: {:.0} calls/sec",
        1_000_000.0 / elapsed.as_secs_f64()
    );

    let metrics = breaker.metrics();
    assert_eq!(metrics.state, CircuitState::Closed);
    assert_eq!(metrics.buffered_calls, 100);
}

/// Test: many threads hammering one breaker keep the window consistent
#[test]
#[ignore]
fn stress_concurrent_outcomes_stay_consistent() {
    let breaker = Arc::new(CircuitBreaker::new(
        "stress",
        CircuitBreakerConfig::builder()
            .failure_rate_threshold(1.0)
            .sliding_window_size(1_000)
            .build(),
    ));
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|t| {
            let breaker = Arc::clone(&breaker);
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                for i in 0..50_000 {
                    let _ = breaker.execute_sync(|| {
                        calls.fetch_add(1, Ordering::Relaxed);
                        if (i + t) % 2 == 0 { Ok(()) } else { Err(Failure) }
                    });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let metrics = breaker.metrics();
    assert_eq!(calls.load(Ordering::Relaxed), 16 * 50_000);
    assert_eq!(metrics.buffered_calls, 1_000);
    assert_eq!(metrics.failed_calls + metrics.successful_calls, 1_000);
    assert_eq!(metrics.state, CircuitState::Closed);
}

/// Test: rapid open/half-open/closed cycling
#[test]
#[ignore]
fn stress_state_thrashing() {
    init_tracing();
    let breaker = CircuitBreaker::new(
        "thrash",
        CircuitBreakerConfig::builder()
            .sliding_window_size(2)
            .minimum_number_of_calls(2)
            .wait_duration_in_open(Duration::from_millis(1))
            .permitted_calls_in_half_open(1)
            .build(),
    );
    let transitions = Arc::new(AtomicUsize::new(0));
    let t = Arc::clone(&transitions);
    breaker.on_state_transition(move |_, _| {
        t.fetch_add(1, Ordering::Relaxed);
    });

    for cycle in 0..1_000 {
        for _ in 0..2 {
            let _ = breaker.execute_sync(|| Err::<(), _>(Failure));
        }
        assert_eq!(breaker.state(), CircuitState::Open, "cycle {cycle}");
        thread::sleep(Duration::from_millis(2));
        breaker.execute_sync(|| Ok::<_, Failure>(())).unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed, "cycle {cycle}");
    }

    // closed -> open -> half-open -> closed every cycle
    assert_eq!(transitions.load(Ordering::Relaxed), 3_000);
}

/// Test: random outcomes from many threads never corrupt the window
#[test]
#[ignore]
fn stress_random_outcomes() {
    let breaker = Arc::new(CircuitBreaker::new(
        "random",
        CircuitBreakerConfig::builder()
            .failure_rate_threshold(0.9)
            .sliding_window_size(50)
            .wait_duration_in_open(Duration::from_millis(1))
            .permitted_calls_in_half_open(5)
            .build(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let breaker = Arc::clone(&breaker);
            thread::spawn(move || {
                let mut rng = rand::rng();
                for _ in 0..100_000 {
                    let ok = rng.random_bool(0.7);
                    let _ = breaker.execute_sync(|| if ok { Ok(()) } else { Err(Failure) });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let metrics = breaker.metrics();
    assert!(metrics.buffered_calls <= 50);
    assert_eq!(
        metrics.failed_calls + metrics.successful_calls,
        metrics.buffered_calls
    );
}
