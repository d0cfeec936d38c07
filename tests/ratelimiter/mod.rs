//! Rate limiter tests.
//!
//! - fixed_period.rs: per-period admission, waiting and refresh
//! - reconfiguration.rs: changing limits and draining at run time

mod fixed_period;
mod reconfiguration;

use fortify::{RateLimiter, RateLimiterConfig};
use std::time::Duration;

pub fn limiter(limit: usize, timeout: Duration) -> RateLimiter {
    RateLimiter::new(
        "api",
        RateLimiterConfig::builder()
            .limit_for_period(limit)
            .limit_refresh_period(Duration::from_secs(1))
            .timeout_duration(timeout)
            .build(),
    )
}
