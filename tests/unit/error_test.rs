//! Tests for error types

use least_loaded::core::{BalancerError, PoolError, SlotId};

#[test]
fn test_empty_pool_error() {
    let err = PoolError::Empty;
    assert_eq!(format!("{}", err), "pool is empty");
}

#[test]
fn test_index_out_of_bounds_error() {
    let err = PoolError::IndexOutOfBounds { index: 5, len: 2 };
    assert_eq!(format!("{}", err), "heap index 5 out of bounds (len 2)");
}

#[test]
fn test_unexpected_completion_error() {
    let err = BalancerError::UnexpectedCompletion(SlotId::new(1));
    assert_eq!(format!("{}", err), "completion reported for idle worker #1");
}

#[test]
fn test_shutdown_error() {
    let err = BalancerError::Shutdown;
    assert_eq!(format!("{}", err), "balancer has been shut down");
}

#[test]
fn test_pool_error_is_transparent() {
    let err = BalancerError::from(PoolError::AlreadyQueued(SlotId::new(2)));
    assert_eq!(format!("{}", err), "slot #2 is already queued");
}
