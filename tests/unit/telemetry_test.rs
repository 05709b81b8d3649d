//! Tests for telemetry helpers

use least_loaded::util::{init_tracing, init_tracing_with};

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing_with("debug");
    assert!(tracing::dispatcher::has_been_set());
}
