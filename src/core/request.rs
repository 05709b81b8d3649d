//! Requests, replies and the messages that carry them to the balancer.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::core::error::BalancerError;
use crate::core::worker::WorkerId;

/// Identifier assigned to a request at submission.
pub type RequestId = u64;

/// Unit of work carried by a request.
pub type WorkFn<R> = Box<dyn FnOnce() -> R + Send + 'static>;

/// A unit of work paired with the private channel its result goes back on.
pub struct Request<R> {
    id: RequestId,
    work: WorkFn<R>,
    reply: Sender<Result<R, BalancerError>>,
}

impl<R> fmt::Debug for Request<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<R: Send + 'static> Request<R> {
    /// Create a request together with the handle its producer waits on.
    pub fn new<F>(id: RequestId, work: F) -> (Self, Reply<R>)
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        (
            Self {
                id,
                work: Box::new(work),
                reply: tx,
            },
            Reply { id, rx },
        )
    }

    /// Identifier given at submission.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Run the work and deliver its result.
    ///
    /// A panicking work function is caught and answered with `WorkPanicked`,
    /// so the calling thread keeps going.
    pub fn execute(self) -> Outcome {
        let Self { id, work, reply } = self;
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(result) => {
                if reply.send(Ok(result)).is_ok() {
                    Outcome::Delivered
                } else {
                    Outcome::Unclaimed
                }
            }
            Err(_) => {
                // The producer may already be gone; the panic is reported either way.
                let _ = reply.send(Err(BalancerError::WorkPanicked(id)));
                Outcome::Panicked
            }
        }
    }

    /// Answer the producer with an error instead of running the work.
    pub fn reject(self, error: BalancerError) -> bool {
        self.reply.send(Err(error)).is_ok()
    }
}

/// How a request's execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The result reached the producer.
    Delivered,
    /// The work ran but the producer stopped waiting for it.
    Unclaimed,
    /// The work function panicked.
    Panicked,
}

/// Producer side of a request: blocks until the result arrives.
#[derive(Debug)]
pub struct Reply<R> {
    id: RequestId,
    rx: Receiver<Result<R, BalancerError>>,
}

impl<R> Reply<R> {
    /// Identifier of the request this reply belongs to.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Block until the request has been executed or rejected.
    ///
    /// # Errors
    ///
    /// The rejection error, or `Shutdown` if the request was dropped unanswered.
    pub fn wait(self) -> Result<R, BalancerError> {
        self.rx.recv().unwrap_or(Err(BalancerError::Shutdown))
    }

    /// Non-blocking check for the outcome.
    pub fn try_wait(&self) -> Option<Result<R, BalancerError>> {
        self.rx.try_recv().ok()
    }
}

/// What producers put on the balancer's intake channel.
#[derive(Debug)]
pub enum Message<R> {
    /// Work to be dispatched.
    Request(Request<R>),
    /// Stop accepting work and drain.
    Shutdown,
}

/// The two events the balancer reacts to.
#[derive(Debug)]
pub enum Event<R> {
    /// A new request needs a worker.
    Dispatch(Request<R>),
    /// A worker finished one request.
    Completed(WorkerId),
}
