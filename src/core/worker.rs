//! Worker state held by the balancer and the execution loop run per worker.
//!
//! The balancer owns a [`Worker`] per pool slot: the sending half of that
//! worker's private queue plus its pending-count. The receiving half lives on a
//! dedicated OS thread started with [`spawn_worker`], which pulls requests in
//! FIFO order, runs them, answers the producer and only then reports the
//! completion back to the balancer.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, warn};

use crate::config::OverflowPolicy;
use crate::core::error::BalancerError;
use crate::core::pool::{Ranked, SlotId};
use crate::core::request::{Outcome, Request};

/// Worker identity: the worker's slot in the pool.
pub type WorkerId = SlotId;

/// Balancer-side state of one processing unit.
#[derive(Debug)]
pub struct Worker<R> {
    queue: Sender<Request<R>>,
    pending: usize,
}

impl<R> Ranked for Worker<R> {
    type Rank = usize;

    fn rank(&self) -> usize {
        self.pending
    }
}

impl<R: Send + 'static> Worker<R> {
    /// Create a worker feeding the given queue.
    #[must_use]
    pub const fn new(queue: Sender<Request<R>>) -> Self {
        Self { queue, pending: 0 }
    }

    /// Requests assigned to this worker and not yet completed.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.pending
    }

    /// Requests sitting in the queue, not yet picked up by the thread.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Enqueue a request and count it as pending.
    ///
    /// Under [`OverflowPolicy::Reject`] a worker at `capacity` pending requests
    /// refuses the request; under [`OverflowPolicy::Block`] the call waits for
    /// queue space.
    ///
    /// # Errors
    ///
    /// Hands the request back with `Overloaded` or `WorkerDisconnected`.
    pub fn assign(
        &mut self,
        id: WorkerId,
        request: Request<R>,
        policy: OverflowPolicy,
        capacity: usize,
    ) -> Result<(), (Request<R>, BalancerError)> {
        let sent = match policy {
            OverflowPolicy::Block => self
                .queue
                .send(request)
                .map_err(|err| (err.into_inner(), BalancerError::WorkerDisconnected(id))),
            OverflowPolicy::Reject if self.pending >= capacity => {
                Err((request, BalancerError::Overloaded { worker: id, capacity }))
            }
            OverflowPolicy::Reject => self.queue.try_send(request).map_err(|err| match err {
                TrySendError::Full(request) => {
                    (request, BalancerError::Overloaded { worker: id, capacity })
                }
                TrySendError::Disconnected(request) => {
                    (request, BalancerError::WorkerDisconnected(id))
                }
            }),
        };
        sent?;
        self.pending += 1;
        Ok(())
    }

    /// Count one request as done.
    ///
    /// # Errors
    ///
    /// `UnexpectedCompletion` if nothing was pending.
    pub fn complete(&mut self, id: WorkerId) -> Result<(), BalancerError> {
        self.pending = self
            .pending
            .checked_sub(1)
            .ok_or(BalancerError::UnexpectedCompletion(id))?;
        Ok(())
    }
}

/// Start the execution loop for one worker on its own thread.
///
/// The loop ends when the request queue disconnects (the balancer dropped the
/// worker) or when the completion channel is closed.
///
/// # Errors
///
/// `Spawn` if the OS refuses the thread.
pub fn spawn_worker<R>(
    id: WorkerId,
    requests: Receiver<Request<R>>,
    done: Sender<WorkerId>,
    stack_size: usize,
) -> Result<JoinHandle<()>, BalancerError>
where
    R: Send + 'static,
{
    thread::Builder::new()
        .name(format!("lb-worker-{}", id.get()))
        .stack_size(stack_size)
        .spawn(move || run_worker(id, &requests, &done))
        .map_err(|e| BalancerError::Spawn(e.to_string()))
}

fn run_worker<R>(id: WorkerId, requests: &Receiver<Request<R>>, done: &Sender<WorkerId>)
where
    R: Send + 'static,
{
    debug!(worker_id = id.get(), "Worker thread started");

    while let Ok(request) = requests.recv() {
        let request_id = request.id();
        match request.execute() {
            Outcome::Delivered => {}
            Outcome::Unclaimed => warn!(
                worker_id = id.get(),
                request_id = request_id,
                "Producer stopped waiting; result discarded"
            ),
            Outcome::Panicked => warn!(
                worker_id = id.get(),
                request_id = request_id,
                "Work function panicked"
            ),
        }
        debug!(worker_id = id.get(), request_id = request_id, "Worker completed request");

        // Reply first, then report: the balancer may lag the producer by one step.
        // A panicked request still counts as completed.
        if done.send(id).is_err() {
            debug!(worker_id = id.get(), "Completion channel closed, exiting");
            return;
        }
    }

    debug!(worker_id = id.get(), "Worker queue closed, exiting");
}
