use super::CatalogError;
use fortify::{
    Bulkhead, BulkheadConfig, CircuitBreaker, CircuitBreakerConfig, ErrorKind, Fallback,
    FallbackLayer, ResilienceError, Retry, RetryConfig,
};
use std::sync::Arc;
use tower::{Service, ServiceBuilder, ServiceExt, service_fn};

#[test]
fn open_circuit_falls_back_to_a_default() {
    let breaker = CircuitBreaker::new("catalog", CircuitBreakerConfig::builder().build());
    breaker.transition_to_open_state();
    let fallback: Fallback<String, CatalogError> = Fallback::builder("catalog")
        .on_kind(ErrorKind::CallNotPermitted)
        .recover(|err| format!("default ({})", err.kind()))
        .build();

    let result = fallback.apply_sync(breaker.execute_sync(|| Ok("live".to_string())));

    assert_eq!(result.unwrap(), format!("default ({})", ErrorKind::CallNotPermitted));
}

#[test]
fn exhausted_retry_is_matched_through_its_last_error() {
    let retry = Retry::new("catalog", RetryConfig::builder().max_attempts(2).build());
    let fallback: Fallback<u32, CatalogError> = Fallback::builder("catalog")
        .on_error::<CatalogError>()
        .value(0)
        .build();

    let outcome = retry.execute_sync(|| Err::<u32, _>(CatalogError("flaky")));
    assert_eq!(outcome.as_ref().unwrap_err().kind(), ErrorKind::RetryExhausted);

    assert_eq!(fallback.apply_sync(outcome).unwrap(), 0);
}

#[tokio::test]
async fn layer_recovers_from_a_full_bulkhead() {
    let bulkhead = Arc::new(Bulkhead::new(
        "catalog",
        BulkheadConfig::builder().max_concurrent_calls(1).build(),
    ));
    let held = bulkhead.try_acquire_permission();
    assert!(held.is_ok());

    let fallback: Fallback<&'static str, CatalogError> = Fallback::builder("catalog")
        .on_admission_rejection()
        .value("busy")
        .build();
    let gated = Arc::clone(&bulkhead);
    let mut service = ServiceBuilder::new()
        .layer(FallbackLayer::from_fallback(fallback))
        .service(service_fn(move |name: &'static str| {
            let gated = Arc::clone(&gated);
            async move { gated.execute(async move { Ok::<_, CatalogError>(name) }).await }
        }));

    let reply = service.ready().await.unwrap().call("widgets").await.unwrap();
    assert_eq!(reply, "busy");

    bulkhead.release_permission();
    let reply = service.ready().await.unwrap().call("widgets").await.unwrap();
    assert_eq!(reply, "widgets");
}

#[tokio::test]
async fn layer_leaves_unmatched_errors_alone() {
    let fallback: Fallback<u8, CatalogError> = Fallback::builder("strict")
        .on_kind(ErrorKind::Timeout)
        .value(0)
        .build();
    let service = ServiceBuilder::new()
        .layer(FallbackLayer::from_fallback(fallback))
        .service(service_fn(|_: ()| async {
            Err::<u8, _>(ResilienceError::Application(CatalogError("bad input")))
        }));

    let err = service.oneshot(()).await.unwrap_err();

    assert_eq!(err.application_error(), Some(CatalogError("bad input")));
}
