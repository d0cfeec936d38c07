use super::{Calls, Unavailable};
use fortify::{
    BulkheadConfig, BulkheadLayer, CircuitBreakerConfig, CircuitBreakerLayer, ErrorKind, Fallback,
    FallbackLayer, RetryConfig, RetryLayer, TimeLimiterConfig, TimeLimiterLayer,
};
use fortify_core::ResilienceErrorLayer;
use std::sync::Arc;
use std::time::Duration;
use tower::{ServiceBuilder, ServiceExt, service_fn};

#[tokio::test]
async fn retry_layer_sees_every_failure_recorded_by_the_breaker() {
    let breaker_layer = CircuitBreakerLayer::from_config(
        "tower",
        CircuitBreakerConfig::builder()
            .sliding_window_size(10)
            .minimum_number_of_calls(10)
            .build(),
    );
    let breaker = Arc::clone(breaker_layer.breaker());
    let calls = Calls::default();
    let c = calls.clone();

    let service = ServiceBuilder::new()
        .layer(RetryLayer::from_config(
            "tower",
            RetryConfig::builder()
                .max_attempts(3)
                .wait_duration(Duration::ZERO)
                .build(),
        ))
        .layer(breaker_layer)
        .layer(ResilienceErrorLayer)
        .service(service_fn(move |id: u32| {
            let attempt = c.hit();
            async move {
                if attempt < 3 {
                    Err(Unavailable)
                } else {
                    Ok(id * 2)
                }
            }
        }));

    assert_eq!(service.oneshot(21).await.unwrap(), 42);
    let metrics = breaker.metrics();
    assert_eq!(metrics.failed_calls, 2);
    assert_eq!(metrics.successful_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn full_tower_stack_falls_back_on_timeouts() {
    let fallback: Fallback<&'static str, Unavailable> = Fallback::builder("tower")
        .on_kind(ErrorKind::Timeout)
        .value("stale")
        .build();
    let calls = Calls::default();
    let c = calls.clone();

    let service = ServiceBuilder::new()
        .layer(FallbackLayer::from_fallback(fallback))
        .layer(RetryLayer::from_config(
            "tower",
            RetryConfig::builder()
                .max_attempts(2)
                .wait_duration(Duration::ZERO)
                .build(),
        ))
        .layer(TimeLimiterLayer::from_config(
            "tower",
            TimeLimiterConfig::builder()
                .timeout_duration(Duration::from_millis(20))
                .build(),
        ))
        .layer(BulkheadLayer::from_config(
            "tower",
            BulkheadConfig::builder().max_concurrent_calls(4).build(),
        ))
        .layer(ResilienceErrorLayer)
        .service(service_fn(move |_: ()| {
            c.hit();
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, Unavailable>("fresh")
            }
        }));

    assert_eq!(service.oneshot(()).await.unwrap(), "stale");
    assert_eq!(calls.count(), 2);
}
