//! Tests for configuration validation and loading

use least_loaded::config::{BalancerConfig, OverflowPolicy};

#[test]
fn test_balancer_config_validation() {
    let valid = BalancerConfig::new()
        .with_worker_count(4)
        .with_producer_count(16)
        .with_queue_capacity(16);
    assert!(valid.validate().is_ok());
    assert!(valid.is_stall_free());
}

#[test]
fn test_balancer_config_invalid_worker_count() {
    let invalid = BalancerConfig::new().with_worker_count(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_balancer_config_invalid_queue_capacity() {
    let invalid = BalancerConfig::new().with_queue_capacity(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_balancer_config_invalid_stack_size() {
    let invalid = BalancerConfig::new().with_thread_stack_size(1024);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_undersized_queues_are_not_stall_free() {
    let cfg = BalancerConfig::new()
        .with_producer_count(100)
        .with_queue_capacity(10);
    assert!(cfg.validate().is_ok());
    assert!(!cfg.is_stall_free());
}

#[test]
fn test_balancer_config_from_json() {
    let json = r#"{
        "worker_count": 3,
        "producer_count": 12,
        "queue_capacity": 12,
        "overflow": "reject"
    }"#;

    let config = BalancerConfig::from_json_str(json).unwrap();
    assert_eq!(config.worker_count, 3);
    assert_eq!(config.producer_count, 12);
    assert_eq!(config.overflow, OverflowPolicy::Reject);
    assert_eq!(
        config.thread_stack_size,
        BalancerConfig::default().thread_stack_size
    );
}

#[test]
fn test_balancer_config_from_json_rejects_invalid() {
    assert!(BalancerConfig::from_json_str(r#"{ "worker_count": 0 }"#).is_err());
    assert!(BalancerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_balancer_config_from_env() {
    std::env::set_var("BALANCER_WORKER_COUNT", "6");
    std::env::set_var("BALANCER_OVERFLOW", "reject");
    let config = BalancerConfig::from_env();
    std::env::set_var("BALANCER_QUEUE_CAPACITY", "lots");
    let bad = BalancerConfig::from_env();
    std::env::remove_var("BALANCER_WORKER_COUNT");
    std::env::remove_var("BALANCER_OVERFLOW");
    std::env::remove_var("BALANCER_QUEUE_CAPACITY");

    let config = config.unwrap();
    assert_eq!(config.worker_count, 6);
    assert_eq!(config.overflow, OverflowPolicy::Reject);
    assert_eq!(config.queue_capacity, BalancerConfig::default().queue_capacity);
    assert!(bad.is_err());
}
