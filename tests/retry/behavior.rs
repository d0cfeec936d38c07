use super::RemoteError;
use fortify::{ErrorKind, ResilienceError, Retry, RetryConfig, RetryEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn retry(max_attempts: usize) -> Retry {
    Retry::new(
        "backend",
        RetryConfig::builder()
            .max_attempts(max_attempts)
            .wait_duration(Duration::from_millis(100))
            .build(),
    )
}

#[tokio::test(start_paused = true)]
async fn succeeds_after_transient_failures() {
    let retry = retry(3);
    let calls = AtomicUsize::new(0);

    let value = retry
        .execute(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(RemoteError::Unavailable)
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 2);
    assert_eq!(retry.metrics().successful_calls_with_retry, 1);
}

#[tokio::test(start_paused = true)]
async fn exhaustion_wraps_the_last_failure() {
    let retry = retry(3);
    let calls = AtomicUsize::new(0);

    let err = retry
        .execute(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(RemoteError::Unavailable) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match &err {
        ResilienceError::RetryExhausted { attempts, last, .. } => {
            assert_eq!(*attempts, 3);
            assert_eq!(last.as_application(), Some(&RemoteError::Unavailable));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.root_cause().kind(), ErrorKind::Application);
    assert_eq!(retry.metrics().failed_calls_with_retry, 1);
}

#[tokio::test(start_paused = true)]
async fn waits_the_configured_interval_between_attempts() {
    let retry = retry(3);
    let start = tokio::time::Instant::now();

    let _ = retry
        .execute(|| async { Err::<(), _>(RemoteError::Unavailable) })
        .await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn exponential_backoff_grows_each_delay() {
    let retry = Retry::new(
        "backoff",
        RetryConfig::builder()
            .max_attempts(4)
            .exponential_backoff(Duration::from_millis(10))
            .build(),
    );
    let delays = Arc::new(Mutex::new(Vec::new()));
    let d = Arc::clone(&delays);
    retry.on_retry(move |attempt, delay| d.lock().unwrap().push((attempt, delay)));

    let _ = retry
        .execute(|| async { Err::<(), _>(RemoteError::Unavailable) })
        .await;

    assert_eq!(
        *delays.lock().unwrap(),
        vec![
            (1, Duration::from_millis(10)),
            (2, Duration::from_millis(20)),
            (3, Duration::from_millis(40)),
        ]
    );
}

#[test]
fn sync_retry_blocks_between_attempts() {
    let retry = Retry::new(
        "sync",
        RetryConfig::builder()
            .max_attempts(2)
            .wait_duration(Duration::from_millis(20))
            .build(),
    );
    let start = std::time::Instant::now();
    let mut calls = 0;

    let value = retry
        .execute_sync(|| {
            calls += 1;
            if calls == 1 {
                Err(RemoteError::Unavailable)
            } else {
                Ok("second")
            }
        })
        .unwrap();

    assert_eq!(value, "second");
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[tokio::test(start_paused = true)]
async fn first_try_success_is_counted_separately() {
    let retry = retry(3);
    let events = Arc::new(Mutex::new(Vec::new()));
    let e = Arc::clone(&events);
    retry.on_event(move |event| {
        if let RetryEvent::Success { attempts, .. } = event {
            e.lock().unwrap().push(*attempts);
        }
    });

    retry
        .execute(|| async { Ok::<_, RemoteError>(()) })
        .await
        .unwrap();

    let metrics = retry.metrics();
    assert_eq!(metrics.successful_calls_without_retry, 1);
    assert_eq!(metrics.successful_calls_with_retry, 0);
    assert_eq!(*events.lock().unwrap(), vec![1]);
}
