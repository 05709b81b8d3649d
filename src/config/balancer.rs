//! Balancer configuration.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Environment variable holding the worker count.
pub const ENV_WORKER_COUNT: &str = "BALANCER_WORKER_COUNT";
/// Environment variable holding the producer count.
pub const ENV_PRODUCER_COUNT: &str = "BALANCER_PRODUCER_COUNT";
/// Environment variable holding the per-worker queue capacity.
pub const ENV_QUEUE_CAPACITY: &str = "BALANCER_QUEUE_CAPACITY";
/// Environment variable selecting the overflow policy (`block` or `reject`).
pub const ENV_OVERFLOW: &str = "BALANCER_OVERFLOW";
/// Environment variable holding the worker thread stack size in bytes.
pub const ENV_THREAD_STACK_SIZE: &str = "BALANCER_THREAD_STACK_SIZE";

const MIN_STACK_SIZE: usize = 64 * 1024;

/// What dispatch does when the chosen worker's queue has no room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for queue space. The coordinating loop pauses until the worker
    /// drains a request; completions queue up meanwhile and are never lost.
    #[default]
    Block,
    /// Answer the request with `Overloaded` and leave the worker untouched.
    Reject,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown overflow policy `{other}`")),
        }
    }
}

/// Sizing of the worker pool and its queues. Fixed once the balancer starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Number of workers in the pool.
    pub worker_count: usize,
    /// Number of producers expected to submit concurrently.
    pub producer_count: usize,
    /// Capacity of each worker's private request queue.
    pub queue_capacity: usize,
    /// Behaviour when a worker queue is full.
    pub overflow: OverflowPolicy,
    /// Stack size for worker threads in bytes.
    pub thread_stack_size: usize,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            worker_count: 10,
            producer_count: 100,
            queue_capacity: 100,
            overflow: OverflowPolicy::Block,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl BalancerConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with one worker per logical CPU.
    #[must_use]
    pub fn per_cpu() -> Self {
        Self::default().with_worker_count(num_cpus::get())
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the producer count.
    #[must_use]
    pub const fn with_producer_count(mut self, producer_count: usize) -> Self {
        self.producer_count = producer_count;
        self
    }

    /// Set the per-worker queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set the overflow policy.
    #[must_use]
    pub const fn with_overflow_policy(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, thread_stack_size: usize) -> Self {
        self.thread_stack_size = thread_stack_size;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// A description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".into());
        }
        if self.thread_stack_size < MIN_STACK_SIZE {
            return Err(format!(
                "thread_stack_size must be at least {MIN_STACK_SIZE} bytes"
            ));
        }
        Ok(())
    }

    /// Whether the queues hold one request per producer.
    ///
    /// When each producer keeps at most one request in flight (blocking
    /// `submit`), such a queue never fills. Producers that pipeline through
    /// `enqueue` can still fill it; under `Block` the loop then waits for the
    /// worker to drain, which delays dispatch but cannot deadlock.
    #[must_use]
    pub const fn is_stall_free(&self) -> bool {
        self.queue_capacity >= self.producer_count
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `BALANCER_*` environment variables, loading a
    /// `.env` file first if one exists. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// A variable that does not parse, or validation failure.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let cfg = Self {
            worker_count: env_or(ENV_WORKER_COUNT, defaults.worker_count)?,
            producer_count: env_or(ENV_PRODUCER_COUNT, defaults.producer_count)?,
            queue_capacity: env_or(ENV_QUEUE_CAPACITY, defaults.queue_capacity)?,
            overflow: env_or(ENV_OVERFLOW, defaults.overflow)?,
            thread_stack_size: env_or(ENV_THREAD_STACK_SIZE, defaults.thread_stack_size)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("{key}: cannot parse `{raw}`: {e}")),
        Err(_) => Ok(default),
    }
}
