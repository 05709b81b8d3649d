//! Error types for pool and balancer operations.

use thiserror::Error;

use crate::core::pool::SlotId;
use crate::core::request::RequestId;

/// Errors produced by structural operations on a [`Pool`](crate::core::Pool).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The heap holds no entries.
    #[error("pool is empty")]
    Empty,
    /// No slot exists for the given id.
    #[error("unknown slot {0}")]
    UnknownSlot(SlotId),
    /// The slot is already present in the heap.
    #[error("slot {0} is already queued")]
    AlreadyQueued(SlotId),
    /// A heap position past the end of the heap was requested.
    #[error("heap index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        /// Requested heap position.
        index: usize,
        /// Current heap length.
        len: usize,
    },
}

/// Errors produced by the balancer, its workers and its submit surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalancerError {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The priority structure rejected an operation.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// The least-loaded worker has no room left in its queue.
    #[error("worker {worker} is overloaded (queue capacity {capacity})")]
    Overloaded {
        /// Worker the request would have gone to.
        worker: SlotId,
        /// Configured per-worker queue capacity.
        capacity: usize,
    },
    /// The worker's execution loop is gone.
    #[error("worker {0} is no longer accepting requests")]
    WorkerDisconnected(SlotId),
    /// The work function panicked; the worker survived and moved on.
    #[error("request {0} panicked during execution")]
    WorkPanicked(RequestId),
    /// A completion arrived for a worker with nothing pending.
    #[error("completion reported for idle worker {0}")]
    UnexpectedCompletion(SlotId),
    /// A completion named a worker that is not in the pool.
    #[error("unknown worker {0}")]
    UnknownWorker(SlotId),
    /// The balancer has stopped accepting requests.
    #[error("balancer has been shut down")]
    Shutdown,
    /// A worker or coordinator thread could not be started.
    #[error("failed to spawn thread: {0}")]
    Spawn(String),
    /// Internal failure (join error, panicked thread).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_converts_transparently() {
        let err: BalancerError = PoolError::Empty.into();
        assert_eq!(err, BalancerError::Pool(PoolError::Empty));
        assert_eq!(err.to_string(), "pool is empty");
    }

    #[test]
    fn test_overloaded_display() {
        let err = BalancerError::Overloaded {
            worker: SlotId::new(3),
            capacity: 8,
        };
        assert_eq!(err.to_string(), "worker #3 is overloaded (queue capacity 8)");
    }

    #[test]
    fn test_work_panicked_display() {
        let err = BalancerError::WorkPanicked(17);
        assert_eq!(err.to_string(), "request 17 panicked during execution");
    }
}
