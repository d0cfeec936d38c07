//! Registry metrics regression tests

use super::helpers::{Recorded, init_recorder};
use fortify::{Registry, Retry, RetryConfig};
use serial_test::serial;

#[test]
#[serial]
fn entry_gauge_follows_registry_size() {
    init_recorder();

    let registry: Registry<Retry> = Registry::new(RetryConfig::builder().build());
    registry.get_or_create("a");
    registry.get_or_create("b");
    registry.remove("a");

    let recorded = Recorded::capture();
    assert_eq!(recorded.gauge("registry_entries", &[("registry", "retry")]), 1.0);
}
