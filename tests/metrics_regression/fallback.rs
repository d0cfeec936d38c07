//! Fallback metrics regression tests

use super::helpers::{Recorded, init_recorder};
use fortify::{ErrorKind, Fallback, ResilienceError};
use serial_test::serial;

#[test]
#[serial]
fn applied_fallbacks_name_their_strategy() {
    init_recorder();

    let fallback: Fallback<u8, std::io::Error> = Fallback::builder("quotes_fb")
        .on_kind(ErrorKind::RequestNotPermitted)
        .value(0)
        .build();
    let _ = fallback.apply_sync(Err(ResilienceError::RequestNotPermitted {
        name: "rl".into(),
    }));
    let _ = fallback.apply_sync(Err(ResilienceError::Application(std::io::Error::other(
        "unmatched",
    ))));

    let recorded = Recorded::capture();
    let applied = [
        ("fallback", "quotes_fb"),
        ("outcome", "applied"),
        ("strategy", "value"),
    ];
    assert_eq!(recorded.counter("fallback_calls_total", &applied), 1);
    assert_eq!(
        recorded.counter(
            "fallback_calls_total",
            &[("fallback", "quotes_fb"), ("outcome", "skipped")]
        ),
        1
    );
}
