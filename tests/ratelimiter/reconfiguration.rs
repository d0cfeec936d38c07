use super::limiter;
use fortify::{RateLimiterEvent, ResilienceEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::advance;

#[tokio::test(start_paused = true)]
async fn new_limit_applies_from_next_period() {
    let rl = limiter(2, Duration::ZERO);
    rl.try_acquire_permission().unwrap();
    rl.change_limit_for_period(5);
    assert_eq!(rl.limit_for_period(), 5);

    advance(Duration::from_secs(1)).await;
    for _ in 0..5 {
        rl.try_acquire_permission().unwrap();
    }
    assert!(rl.try_acquire_permission().is_err());
}

#[tokio::test(start_paused = true)]
async fn new_timeout_applies_to_later_callers() {
    let rl = limiter(1, Duration::ZERO);
    rl.try_acquire_permission().unwrap();
    assert!(rl.acquire_permission_async().await.is_err());

    rl.change_timeout_duration(Duration::from_secs(2));
    assert_eq!(rl.timeout_duration(), Duration::from_secs(2));
    rl.acquire_permission_async().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn drain_discards_remaining_permits() {
    let rl = limiter(4, Duration::ZERO);
    let drained = Arc::new(Mutex::new(None));
    let d = Arc::clone(&drained);
    rl.on_event(move |event| {
        if let RateLimiterEvent::Drained {
            discarded_permits, ..
        } = event
        {
            *d.lock().unwrap() = Some((*discarded_permits, event.event_type()));
        }
    });

    rl.try_acquire_permission().unwrap();
    rl.drain_permissions();

    assert!(rl.try_acquire_permission().is_err());
    assert_eq!(*drained.lock().unwrap(), Some((3, "drained")));

    advance(Duration::from_secs(1)).await;
    assert_eq!(rl.metrics().available_permissions, 4);
}
