//! Retry metrics regression tests

use super::helpers::{Recorded, init_recorder};
use fortify::{Retry, RetryConfig};
use serial_test::serial;
use std::time::Duration;

fn retry(name: &str, attempts: usize) -> Retry {
    Retry::new(
        name,
        RetryConfig::builder()
            .max_attempts(attempts)
            .wait_duration(Duration::from_millis(1))
            .build(),
    )
}

fn calls(recorded: &Recorded, name: &str, outcome: &str) -> u64 {
    recorded.counter("retry_calls_total", &[("retry", name), ("outcome", outcome)])
}

#[test]
#[serial]
fn recovered_call_counts_one_retry() {
    init_recorder();

    let retry = retry("inventory_retry", 3);
    let mut count = 0;
    let _ = retry.execute_sync(|| {
        count += 1;
        if count < 2 {
            Err(std::io::Error::other("failure"))
        } else {
            Ok("success")
        }
    });

    let recorded = Recorded::capture();
    assert_eq!(calls(&recorded, "inventory_retry", "successful_with_retry"), 1);
    assert_eq!(
        recorded.counter("retry_attempts_total", &[("retry", "inventory_retry")]),
        1
    );
}

#[test]
#[serial]
fn exhausted_and_first_try_outcomes() {
    init_recorder();

    let retry = retry("shipping_retry", 2);
    let _ = retry.execute_sync(|| Err::<(), _>(std::io::Error::other("failure")));
    let _ = retry.execute_sync(|| Ok::<_, std::io::Error>(()));

    let recorded = Recorded::capture();
    assert_eq!(calls(&recorded, "shipping_retry", "failed_with_retry"), 1);
    assert_eq!(calls(&recorded, "shipping_retry", "successful_without_retry"), 1);
}
