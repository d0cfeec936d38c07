use super::RemoteDown;
use fortify::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

#[test]
fn concurrent_outcomes_are_all_recorded() {
    let cb = Arc::new(CircuitBreaker::new(
        "shared",
        CircuitBreakerConfig::builder()
            .sliding_window_size(1_000)
            .minimum_number_of_calls(1_000)
            .build(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cb = Arc::clone(&cb);
            thread::spawn(move || {
                for i in 0..100 {
                    let _ = cb.execute_sync(|| {
                        if (t + i) % 2 == 0 {
                            Ok(())
                        } else {
                            Err(RemoteDown)
                        }
                    });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let metrics = cb.metrics();
    assert_eq!(metrics.buffered_calls, 800);
    assert_eq!(metrics.failed_calls + metrics.successful_calls, 800);
    assert_eq!(metrics.state, CircuitState::Closed);
}

#[test]
fn a_trip_is_announced_once() {
    let cb = Arc::new(CircuitBreaker::new(
        "trip",
        CircuitBreakerConfig::builder()
            .sliding_window_size(10)
            .minimum_number_of_calls(10)
            .build(),
    ));
    let opened = Arc::new(AtomicUsize::new(0));
    let o = Arc::clone(&opened);
    cb.on_state_transition(move |_, to| {
        if to == CircuitState::Open {
            o.fetch_add(1, Ordering::SeqCst);
        }
    });

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cb = Arc::clone(&cb);
            thread::spawn(move || {
                for _ in 0..50 {
                    let _ = cb.execute_sync(|| Err::<(), _>(RemoteDown));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cb.state(), CircuitState::Open);
    assert_eq!(opened.load(Ordering::SeqCst), 1);
}
