//! Property tests for the circuit breaker.
//!
//! Invariants tested:
//! - The window never buffers more than its size
//! - The breaker opens exactly when the windowed failure rate reaches the threshold
//! - Open breakers never run the operation

use super::TestError;
use fortify::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use proptest::prelude::*;
use std::collections::VecDeque;

fn breaker(threshold: f64, window: usize, minimum: usize) -> CircuitBreaker {
    CircuitBreaker::new(
        "property",
        CircuitBreakerConfig::builder()
            .failure_rate_threshold(threshold)
            .sliding_window_size(window)
            .minimum_number_of_calls(minimum)
            .build(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// Property: buffered outcomes never exceed the window size
    #[test]
    fn window_is_bounded(
        window in 1usize..=20,
        outcomes in prop::collection::vec(any::<bool>(), 0..100),
    ) {
        let cb = breaker(1.0, window, window);
        for ok in outcomes {
            let _ = cb.execute_sync(|| if ok { Ok(()) } else { Err(TestError) });
            let metrics = cb.metrics();
            prop_assert!(metrics.buffered_calls <= window);
            prop_assert_eq!(
                metrics.failed_calls + metrics.successful_calls,
                metrics.buffered_calls
            );
        }
    }

    /// Property: the breaker agrees with a reference sliding window
    #[test]
    fn opens_when_windowed_rate_reaches_threshold(
        threshold in 0.1f64..=1.0,
        window in 1usize..=20,
        minimum in 1usize..=20,
        outcomes in prop::collection::vec(any::<bool>(), 1..80),
    ) {
        let minimum = minimum.min(window);
        let cb = breaker(threshold, window, minimum);
        let mut model: VecDeque<bool> = VecDeque::new();

        for ok in outcomes {
            let _ = cb.execute_sync(|| if ok { Ok(()) } else { Err(TestError) });

            model.push_back(ok);
            if model.len() > window {
                model.pop_front();
            }
            let failed = model.iter().filter(|ok| !**ok).count();
            let should_open = model.len() >= minimum
                && failed as f64 / model.len() as f64 >= threshold;

            if should_open {
                prop_assert_eq!(cb.state(), CircuitState::Open);
                break;
            }
            prop_assert_eq!(cb.state(), CircuitState::Closed);
        }
    }

    /// Property: an open breaker rejects every call without running it
    #[test]
    fn open_breaker_never_calls_through(attempts in 1usize..50) {
        let cb = breaker(0.5, 10, 10);
        cb.transition_to_open_state();

        let mut ran = 0;
        for _ in 0..attempts {
            let result = cb.execute_sync(|| {
                ran += 1;
                Ok::<_, TestError>(())
            });
            prop_assert!(result.is_err());
        }
        prop_assert_eq!(ran, 0);
        prop_assert_eq!(cb.metrics().not_permitted_calls, attempts as u64);
    }
}
