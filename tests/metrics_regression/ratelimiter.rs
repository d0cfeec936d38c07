//! Rate limiter metrics regression tests

use super::helpers::{Recorded, init_recorder};
use fortify::{RateLimiter, RateLimiterConfig};
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn admissions_and_rejections_are_counted() {
    init_recorder();

    let limiter = RateLimiter::new(
        "search_rl",
        RateLimiterConfig::builder()
            .limit_for_period(1)
            .limit_refresh_period(Duration::from_secs(60))
            .timeout_duration(Duration::ZERO)
            .build(),
    );
    assert!(limiter.try_acquire_permission().is_ok());
    assert!(limiter.try_acquire_permission().is_err());
    assert!(limiter.try_acquire_permission().is_err());

    let recorded = Recorded::capture();
    let instance = [("ratelimiter", "search_rl")];
    assert_eq!(recorded.counter("ratelimiter_calls_permitted_total", &instance), 1);
    assert_eq!(recorded.counter("ratelimiter_calls_rejected_total", &instance), 2);
    assert_eq!(recorded.gauge("ratelimiter_waiting_calls", &instance), 0.0);
    recorded.histogram("ratelimiter_wait_duration_seconds", &instance);
}
