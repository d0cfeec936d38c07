//! Property tests for retry.
//!
//! Invariants tested:
//! - The operation runs at most max_attempts times
//! - A call succeeds iff some attempt within the budget succeeds
//! - Exhaustion reports the number of attempts made

use super::TestError;
use fortify::{ResilienceError, Retry, RetryConfig};
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// Property: attempts are bounded and the outcome matches the first success
    #[test]
    fn attempts_never_exceed_the_budget(
        max_attempts in 1usize..=10,
        failures_before_success in 0usize..=15,
    ) {
        let retry = Retry::new(
            "property",
            RetryConfig::builder()
                .max_attempts(max_attempts)
                .wait_duration(Duration::ZERO)
                .build(),
        );
        let mut calls = 0;

        let result = retry.execute_sync(|| {
            calls += 1;
            if calls > failures_before_success {
                Ok(calls)
            } else {
                Err(TestError)
            }
        });

        prop_assert!(calls <= max_attempts);
        if failures_before_success < max_attempts {
            prop_assert_eq!(result.unwrap(), failures_before_success + 1);
        } else {
            match result {
                Err(ResilienceError::RetryExhausted { attempts, .. }) => {
                    prop_assert_eq!(attempts, max_attempts);
                    prop_assert_eq!(calls, max_attempts);
                }
                other => prop_assert!(false, "unexpected outcome: {:?}", other),
            }
        }
    }

    /// Property: the delays handed to listeners follow the interval function
    #[test]
    fn exponential_delays_double(max_attempts in 2usize..=8, initial_ms in 1u64..=50) {
        let retry = Retry::new(
            "property",
            RetryConfig::builder()
                .max_attempts(max_attempts)
                .exponential_backoff(Duration::from_millis(initial_ms))
                .build(),
        );

        for attempt in 0..max_attempts - 1 {
            let expected = Duration::from_millis(initial_ms) * 2u32.pow(attempt as u32);
            let actual = retry.config().interval(attempt);
            let diff = actual.abs_diff(expected);
            prop_assert!(diff < Duration::from_micros(1), "{:?} vs {:?}", actual, expected);
        }
    }
}
