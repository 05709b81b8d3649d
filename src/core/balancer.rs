//! The balancer: sole owner of the worker pool and its coordinating loop.
//!
//! Every mutation of the pool happens inside [`Balancer::handle`], which is
//! only ever called from one thread. Producers and workers talk to it through
//! two channels (intake and completion), so the pool needs no lock.
//!
//! ```text
//! producer ──intake──▶ dispatch ──queue──▶ worker thread ──reply──▶ producer
//!                          ▲                     │
//!                          └──── completed ◀─done┘
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::config::{BalancerConfig, OverflowPolicy};
use crate::core::error::{BalancerError, PoolError};
use crate::core::pool::Pool;
use crate::core::request::{Event, Message, Request};
use crate::core::stats::{BalancerCounters, LoadSnapshot, StatsSink, WorkerLoad};
use crate::core::worker::{Worker, WorkerId};

/// Receiving half of a worker's private queue, handed out at construction.
pub type WorkerQueue<R> = (WorkerId, Receiver<Request<R>>);

/// Least-loaded dispatcher over a heap of workers keyed by pending-count.
pub struct Balancer<R> {
    pool: Pool<Worker<R>>,
    done_tx: Sender<WorkerId>,
    done_rx: Receiver<WorkerId>,
    sink: Box<dyn StatsSink>,
    counters: Arc<BalancerCounters>,
    policy: OverflowPolicy,
    queue_capacity: usize,
}

impl<R: Send + 'static> Balancer<R> {
    /// Build a balancer with `config.worker_count` idle workers.
    ///
    /// Returns the receiving end of every worker queue; the caller runs one
    /// execution loop per queue (see [`spawn_worker`](crate::core::spawn_worker)).
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate.
    pub fn new(
        config: &BalancerConfig,
        sink: Box<dyn StatsSink>,
    ) -> Result<(Self, Vec<WorkerQueue<R>>), BalancerError> {
        config.validate().map_err(BalancerError::InvalidConfig)?;

        let (done_tx, done_rx) = unbounded();
        let mut pool = Pool::with_capacity(config.worker_count);
        let mut queues = Vec::with_capacity(config.worker_count);
        for _ in 0..config.worker_count {
            let (tx, rx) = bounded(config.queue_capacity);
            let id = pool.insert(Worker::new(tx));
            queues.push((id, rx));
        }

        Ok((
            Self {
                pool,
                done_tx,
                done_rx,
                sink,
                counters: Arc::new(BalancerCounters::default()),
                policy: config.overflow,
                queue_capacity: config.queue_capacity,
            },
            queues,
        ))
    }

    /// Sender workers report completions on.
    #[must_use]
    pub fn completion_sender(&self) -> Sender<WorkerId> {
        self.done_tx.clone()
    }

    /// Shared activity counters.
    #[must_use]
    pub fn counters(&self) -> Arc<BalancerCounters> {
        Arc::clone(&self.counters)
    }

    /// Read-only view of the pool.
    #[must_use]
    pub const fn pool(&self) -> &Pool<Worker<R>> {
        &self.pool
    }

    /// Number of workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.pool.slot_count()
    }

    /// Pending-count of a worker.
    #[must_use]
    pub fn pending(&self, worker: WorkerId) -> Option<usize> {
        self.pool.get(worker).map(Worker::pending)
    }

    /// Total requests assigned and not yet completed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pool.slots().map(|(_, w)| w.pending()).sum()
    }

    /// Assign a request to the least-loaded worker.
    ///
    /// Pops the minimum, enqueues the request on that worker, bumps its
    /// pending-count and pushes it back. A request that cannot be placed is
    /// answered with the error and the worker is pushed back unchanged.
    ///
    /// # Errors
    ///
    /// `Overloaded`, `WorkerDisconnected`, or a pool error.
    pub fn dispatch(&mut self, request: Request<R>) -> Result<WorkerId, BalancerError> {
        let request_id = request.id();
        let id = match self.pool.pop_min() {
            Ok(id) => id,
            Err(e) => return Err(self.refuse(request, e.into())),
        };
        let Some(worker) = self.pool.get_mut(id) else {
            return Err(self.refuse(request, PoolError::UnknownSlot(id).into()));
        };

        let assigned = worker.assign(id, request, self.policy, self.queue_capacity);
        self.pool.push(id)?;

        match assigned {
            Ok(()) => {
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                debug!(worker_id = id.get(), request_id = request_id, "Request dispatched");
                Ok(id)
            }
            Err((request, e)) => Err(self.refuse(request, e)),
        }
    }

    /// Record that `worker` finished one request and re-home it in the heap.
    ///
    /// # Errors
    ///
    /// `UnknownWorker` if the worker is not queued, `UnexpectedCompletion` if
    /// its pending-count is already zero.
    pub fn completed(&mut self, worker: WorkerId) -> Result<(), BalancerError> {
        let position = self
            .pool
            .position(worker)
            .ok_or(BalancerError::UnknownWorker(worker))?;
        if self.pending(worker) == Some(0) {
            error!(worker_id = worker.get(), "Completion reported for idle worker");
            return Err(BalancerError::UnexpectedCompletion(worker));
        }

        let id = self.pool.remove_at(position)?;
        let result = self
            .pool
            .get_mut(id)
            .ok_or(BalancerError::UnknownWorker(id))
            .and_then(|w| w.complete(id));
        self.pool.push(id)?;
        result?;

        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        debug!(worker_id = id.get(), "Completion processed");
        Ok(())
    }

    /// Pending-counts of every worker in heap order, with mean and variance.
    #[must_use]
    pub fn snapshot(&self) -> LoadSnapshot {
        LoadSnapshot::from_loads(
            self.pool
                .iter()
                .map(|(position, worker, w)| WorkerLoad {
                    worker,
                    position,
                    pending: w.pending(),
                })
                .collect(),
        )
    }

    /// Handle one event, then publish a snapshot.
    ///
    /// # Errors
    ///
    /// Whatever [`dispatch`](Self::dispatch) or [`completed`](Self::completed)
    /// returned; the snapshot is emitted either way.
    pub fn handle(&mut self, event: Event<R>) -> Result<(), BalancerError> {
        let result = match event {
            Event::Dispatch(request) => self.dispatch(request).map(|_| ()),
            Event::Completed(worker) => self.completed(worker),
        };
        debug_assert!(self.pool.is_heap());
        debug_assert!(self.pool.positions_consistent());

        let snapshot = self.snapshot();
        self.sink.emit(&snapshot);
        result
    }

    /// Run the coordinating loop until shutdown.
    ///
    /// Waits on whichever of intake and completion is ready, handles exactly
    /// one event, and loops. On [`Message::Shutdown`] or a closed intake it
    /// stops dispatching, processes completions until nothing is in flight,
    /// then drops the worker queues so the worker threads exit.
    pub fn run(mut self, intake: &Receiver<Message<R>>) {
        info!(workers = self.worker_count(), "Balancer loop started");
        let done_rx = self.done_rx.clone();

        loop {
            select! {
                recv(intake) -> msg => match msg {
                    Ok(Message::Request(request)) => {
                        if let Err(e) = self.handle(Event::Dispatch(request)) {
                            debug!(error = %e, "Dispatch refused");
                        }
                    }
                    Ok(Message::Shutdown) | Err(_) => break,
                },
                recv(done_rx) -> done => match done {
                    Ok(worker) => {
                        if let Err(e) = self.handle(Event::Completed(worker)) {
                            warn!(worker_id = worker.get(), error = %e, "Completion rejected");
                        }
                    }
                    Err(_) => break,
                },
            }
        }

        self.drain(&done_rx);
        info!("Balancer loop stopped");
    }

    fn drain(&mut self, done_rx: &Receiver<WorkerId>) {
        let in_flight = self.in_flight();
        if in_flight > 0 {
            info!(in_flight = in_flight, "Draining in-flight requests");
        }
        while self.in_flight() > 0 {
            let Ok(worker) = done_rx.recv() else {
                break;
            };
            if let Err(e) = self.handle(Event::Completed(worker)) {
                warn!(worker_id = worker.get(), error = %e, "Completion rejected");
            }
        }
    }

    fn refuse(&self, request: Request<R>, e: BalancerError) -> BalancerError {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        warn!(request_id = request.id(), error = %e, "Request refused");
        request.reject(e.clone());
        e
    }
}
