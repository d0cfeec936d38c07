//! Time limiter tests.
//!
//! - deadlines.rs: async deadlines and cancellation
//! - blocking.rs: helper threads and pending handles


use fortify::{TimeLimiter, TimeLimiterConfig};
use std::time::Duration;

pub fn limiter(timeout: Duration, cancel: bool) -> TimeLimiter {
    TimeLimiter::new(
        "backend",
        TimeLimiterConfig::builder()
            .timeout_duration(timeout)
            .cancel_running_future(cancel)
            .build(),
    )
}
