//! Core dispatching: the worker heap, the balancer and its runtime.

pub mod balancer;
pub mod dispatcher;
pub mod error;
pub mod pool;
pub mod request;
pub mod stats;
pub mod worker;

pub use balancer::{Balancer, WorkerQueue};
pub use dispatcher::{Dispatcher, Submitter};
pub use error::{AppResult, BalancerError, PoolError};
pub use pool::{Pool, Ranked, SlotId};
pub use request::{Event, Message, Outcome, Reply, Request, RequestId, WorkFn};
pub use stats::{
    mean_and_variance, BalancerCounters, ChannelStatsSink, DispatcherStats, InMemoryStatsSink,
    LoadSnapshot, StatsSink, TracingStatsSink, WorkerLoad,
};
pub use worker::{spawn_worker, Worker, WorkerId};
