//! Configuration models for the balancer and its worker pool.

pub mod balancer;

pub use balancer::{BalancerConfig, OverflowPolicy};
