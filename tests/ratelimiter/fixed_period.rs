use super::limiter;
use fortify::{ErrorKind, ResilienceEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, advance};

#[tokio::test(start_paused = true)]
async fn admits_limit_per_period() {
    let rl = limiter(3, Duration::ZERO);
    for _ in 0..3 {
        rl.try_acquire_permission().unwrap();
    }
    assert!(rl.try_acquire_permission().is_err());

    advance(Duration::from_secs(1)).await;
    for _ in 0..3 {
        rl.try_acquire_permission().unwrap();
    }
    assert!(rl.try_acquire_permission().is_err());
}

#[tokio::test(start_paused = true)]
async fn unused_permits_do_not_accumulate() {
    let rl = limiter(2, Duration::ZERO);
    advance(Duration::from_secs(5)).await;
    assert_eq!(rl.metrics().available_permissions, 2);
}

#[tokio::test(start_paused = true)]
async fn waits_for_next_period_within_timeout() {
    let rl = limiter(1, Duration::from_secs(2));
    rl.acquire_permission_async().await.unwrap();

    let start = Instant::now();
    rl.acquire_permission_async().await.unwrap();
    let waited = start.elapsed();
    assert!(waited > Duration::ZERO && waited <= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn rejects_when_wait_exceeds_timeout() {
    let rl = limiter(1, Duration::from_millis(100));
    rl.execute(async { Ok::<_, std::io::Error>(()) }).await.unwrap();

    let err = rl
        .execute(async { Ok::<_, std::io::Error>(()) })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RequestNotPermitted);
    assert_eq!(err.suggested_http_status(), 429);
}

#[tokio::test(start_paused = true)]
async fn waiting_callers_are_visible_in_metrics() {
    let rl = Arc::new(limiter(1, Duration::from_secs(5)));
    rl.try_acquire_permission().unwrap();

    let waiter = {
        let rl = Arc::clone(&rl);
        tokio::spawn(async move { rl.acquire_permission_async().await })
    };
    tokio::task::yield_now().await;
    assert_eq!(rl.metrics().number_of_waiting_calls, 1);

    waiter.await.unwrap().unwrap();
    assert_eq!(rl.metrics().number_of_waiting_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn events_report_acquire_outcomes() {
    let rl = limiter(1, Duration::ZERO);
    let events = Arc::new(Mutex::new(Vec::new()));
    let e = Arc::clone(&events);
    rl.on_event(move |event| e.lock().unwrap().push(event.event_type()));

    rl.try_acquire_permission().unwrap();
    let _ = rl.try_acquire_permission();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["successful_acquire", "failed_acquire"]
    );
}

#[test]
fn blocking_acquire_sleeps_the_calling_thread() {
    let rl = fortify::RateLimiter::new(
        "blocking",
        fortify::RateLimiterConfig::builder()
            .limit_for_period(1)
            .limit_refresh_period(Duration::from_millis(50))
            .timeout_duration(Duration::from_millis(200))
            .build(),
    );
    rl.acquire_permission().unwrap();

    let start = std::time::Instant::now();
    rl.acquire_permission().unwrap();
    assert!(start.elapsed() >= Duration::from_millis(10));
}
