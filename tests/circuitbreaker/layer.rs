use fortify::{CircuitBreakerConfig, CircuitBreakerLayer, CircuitState, ErrorKind};
use fortify_core::ResilienceErrorLayer;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::{ServiceBuilder, ServiceExt, service_fn};

#[tokio::test]
async fn layer_shares_one_breaker_across_clones() {
    let layer = CircuitBreakerLayer::from_config(
        "tower",
        CircuitBreakerConfig::builder()
            .sliding_window_size(3)
            .minimum_number_of_calls(3)
            .build(),
    );
    let breaker = Arc::clone(layer.breaker());
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let svc = ServiceBuilder::new()
        .layer(layer)
        .layer(ResilienceErrorLayer)
        .service(service_fn(move |_: ()| {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(std::io::Error::other("down")) }
        }));

    for _ in 0..3 {
        let err = svc.clone().oneshot(()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Application);
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let err = svc.oneshot(()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CallNotPermitted);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
