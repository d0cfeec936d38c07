use super::CatalogError;
use fortify::{ErrorKind, Fallback, FallbackEvent, ResilienceError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn rejected() -> ResilienceError<CatalogError> {
    ResilienceError::RequestNotPermitted {
        name: "catalog".into(),
    }
}

fn timed_out() -> ResilienceError<CatalogError> {
    ResilienceError::Timeout {
        name: "catalog".into(),
        timeout: Duration::from_millis(100),
    }
}

fn chain() -> Fallback<Vec<&'static str>, CatalogError> {
    Fallback::builder("products")
        .on_admission_rejection()
        .value(vec!["cached"])
        .on_kind(ErrorKind::Timeout)
        .recover(|err| vec![if err.is_timeout() { "slow" } else { "retried" }])
        .on_error::<CatalogError>()
        .map_error(|err| err.map_application(|e: CatalogError| CatalogError(if e.0 == "gone" { "missing" } else { e.0 })))
        .build()
}

#[test]
fn first_matching_handler_wins() {
    let fallback = chain();

    assert_eq!(fallback.apply_sync(Err(rejected())).unwrap(), vec!["cached"]);
    assert_eq!(fallback.apply_sync(Err(timed_out())).unwrap(), vec!["slow"]);
    assert_eq!(fallback.len(), 3);
}

#[test]
fn successes_pass_through() {
    let fallback = chain();

    assert_eq!(fallback.apply_sync(Ok(vec!["live"])).unwrap(), vec!["live"]);
}

#[test]
fn root_cause_decides_the_kind() {
    let fallback = chain();
    let exhausted = ResilienceError::RetryExhausted {
        name: "retry".into(),
        attempts: 3,
        last: Box::new(timed_out()),
    };

    assert_eq!(fallback.apply_sync(Err(exhausted)).unwrap(), vec!["retried"]);
}

#[test]
fn error_types_are_found_in_the_source_chain() {
    let fallback = chain();

    let err = fallback
        .apply_sync(Err(ResilienceError::Application(CatalogError("gone"))))
        .unwrap_err();

    assert_eq!(err.application_error(), Some(CatalogError("missing")));
}

#[test]
fn unmatched_errors_are_returned_unchanged() {
    let fallback: Fallback<u32, CatalogError> = Fallback::builder("narrow")
        .on_kind(ErrorKind::BulkheadFull)
        .value(0)
        .build();
    let skipped = Arc::new(Mutex::new(0));
    let s = Arc::clone(&skipped);
    fallback.on_event(move |event| {
        if matches!(event, FallbackEvent::Skipped { .. }) {
            *s.lock().unwrap() += 1;
        }
    });

    let err = fallback.apply_sync(Err(timed_out())).unwrap_err();

    assert_eq!(err, timed_out());
    assert_eq!(*skipped.lock().unwrap(), 1);
}

#[tokio::test]
async fn async_recovery_can_fail_too() {
    let fallback: Fallback<String, CatalogError> = Fallback::builder("backup")
        .otherwise()
        .recover_async(|err| async move {
            if err.is_timeout() {
                Ok("from backup".to_string())
            } else {
                Err(ResilienceError::Application(CatalogError("backup down")))
            }
        })
        .build();
    let events = Arc::new(Mutex::new(Vec::new()));
    let e = Arc::clone(&events);
    fallback.on_event(move |event| match event {
        FallbackEvent::Applied { handler, strategy, .. } => {
            e.lock().unwrap().push(format!("applied {handler} {strategy}"))
        }
        FallbackEvent::Failed { .. } => e.lock().unwrap().push("failed".to_string()),
        _ => {}
    });

    assert_eq!(fallback.apply(Err(timed_out())).await.unwrap(), "from backup");
    let err = fallback.apply(Err(rejected())).await.unwrap_err();

    assert_eq!(err.as_application(), Some(&CatalogError("backup down")));
    assert_eq!(
        *events.lock().unwrap(),
        vec!["applied 0 recover_async", "applied 0 recover_async", "failed"]
    );
}
