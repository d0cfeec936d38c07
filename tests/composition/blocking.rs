use super::{Calls, Unavailable};
use fortify::{
    Bulkhead, BulkheadConfig, CircuitBreaker, CircuitBreakerConfig, CircuitState, Decorators,
    ErrorKind, Fallback, RateLimiter, RateLimiterConfig, ResilienceRegistries, Retry, RetryConfig,
};
use std::sync::Arc;
use std::time::Duration;

fn retry(attempts: usize) -> Arc<Retry> {
    Arc::new(Retry::new(
        "upstream",
        RetryConfig::builder()
            .max_attempts(attempts)
            .wait_duration(Duration::ZERO)
            .build(),
    ))
}

#[test]
fn every_retry_attempt_spends_a_rate_limit_permit() {
    let limiter = Arc::new(RateLimiter::new(
        "upstream",
        RateLimiterConfig::builder()
            .limit_for_period(2)
            .limit_refresh_period(Duration::from_secs(60))
            .timeout_duration(Duration::ZERO)
            .build(),
    ));
    let calls = Calls::default();
    let c = calls.clone();

    let decorated = Decorators::of_supplier(move || {
        c.hit();
        Err::<(), _>(Unavailable)
    })
    .with_retry(retry(3))
    .with_rate_limiter(Arc::clone(&limiter))
    .decorate();

    let err = decorated.invoke().unwrap_err();

    // the third attempt is rejected, and rejections are not retried
    assert_eq!(err.kind(), ErrorKind::RequestNotPermitted);
    assert_eq!(calls.count(), 2);
    assert_eq!(limiter.metrics().available_permissions, 0);
}

#[test]
fn bulkhead_permits_are_returned_between_attempts() {
    let bulkhead = Arc::new(Bulkhead::new(
        "upstream",
        BulkheadConfig::builder().max_concurrent_calls(1).build(),
    ));
    let calls = Calls::default();
    let c = calls.clone();

    let decorated = Decorators::of_supplier(move || {
        if c.hit() < 3 {
            Err(Unavailable)
        } else {
            Ok("third time")
        }
    })
    .with_bulkhead(Arc::clone(&bulkhead))
    .with_retry(retry(3))
    .decorate();

    assert_eq!(decorated.invoke().unwrap(), "third time");
    assert_eq!(bulkhead.metrics().available_concurrent_calls, 1);
}

#[test]
fn breaker_opens_mid_retry_and_fallback_answers() {
    let breaker = Arc::new(CircuitBreaker::new(
        "upstream",
        CircuitBreakerConfig::builder()
            .sliding_window_size(2)
            .minimum_number_of_calls(2)
            .build(),
    ));
    let fallback = Arc::new(
        Fallback::<String, Unavailable>::builder("upstream")
            .on_admission_rejection()
            .value("cached".to_string())
            .build(),
    );
    let calls = Calls::default();
    let c = calls.clone();

    let decorated = Decorators::of_supplier(move || {
        c.hit();
        Err::<String, _>(Unavailable)
    })
    .with_circuit_breaker(Arc::clone(&breaker))
    .with_retry(retry(5))
    .with_fallback(fallback)
    .decorate();

    assert_eq!(decorated.invoke().unwrap(), "cached");
    assert_eq!(calls.count(), 2);
    assert_eq!(breaker.state(), CircuitState::Open);

    // later calls never reach the operation
    assert_eq!(decorated.invoke().unwrap(), "cached");
    assert_eq!(calls.count(), 2);
}

#[test]
fn declaration_order_can_put_retry_inside_the_breaker() {
    let breaker = Arc::new(CircuitBreaker::new(
        "upstream",
        CircuitBreakerConfig::builder()
            .sliding_window_size(10)
            .minimum_number_of_calls(10)
            .build(),
    ));
    let calls = Calls::default();
    let c = calls.clone();

    let decorated = Decorators::of_supplier(move || {
        c.hit();
        Err::<(), _>(Unavailable)
    })
    .with_retry(retry(3))
    .with_circuit_breaker(Arc::clone(&breaker))
    .preserve_declaration_order()
    .decorate();

    let err = decorated.invoke().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RetryExhausted);
    assert_eq!(calls.count(), 3);
    // the breaker saw a single exhausted call
    assert_eq!(breaker.metrics().buffered_calls, 1);
}

#[test]
fn registry_instances_decorate_many_suppliers() {
    let registries = ResilienceRegistries::builder()
        .circuit_breaker_config(
            CircuitBreakerConfig::builder()
                .sliding_window_size(2)
                .minimum_number_of_calls(2)
                .build(),
        )
        .build();

    let failing = Decorators::of_supplier(|| Err::<u8, _>(Unavailable))
        .with_circuit_breaker(registries.circuit_breakers().get_or_create("shared"))
        .decorate();
    let healthy = Decorators::of_supplier(|| Ok::<u8, Unavailable>(1))
        .with_circuit_breaker(registries.circuit_breakers().get_or_create("shared"))
        .decorate();

    let _ = failing.invoke();
    let _ = failing.invoke();

    assert_eq!(
        healthy.invoke().unwrap_err().kind(),
        ErrorKind::CallNotPermitted
    );
}
