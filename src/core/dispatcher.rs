//! Threaded runtime around a [`Balancer`].
//!
//! [`Dispatcher::start`] spawns one OS thread per worker and one coordinator
//! thread running [`Balancer::run`]. Producers talk to it through cloneable
//! [`Submitter`] handles, which only ever touch the intake channel.
//!
//! # Design Principles
//!
//! - **Single writer**: only the coordinator thread mutates the pool
//! - **No polling**: every thread blocks on a channel
//! - **Clean shutdown**: the coordinator drains in-flight work, then dropping
//!   the worker queues unblocks the worker threads

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{BalancerConfig, OverflowPolicy};
use crate::core::balancer::Balancer;
use crate::core::error::BalancerError;
use crate::core::request::{Message, Reply, Request};
use crate::core::stats::{BalancerCounters, DispatcherStats, StatsSink, TracingStatsSink};
use crate::core::worker::spawn_worker;

/// Cloneable handle producers use to submit work.
pub struct Submitter<R> {
    intake: Sender<Message<R>>,
    counters: Arc<BalancerCounters>,
    request_ids: Arc<AtomicU64>,
}

impl<R> Clone for Submitter<R> {
    fn clone(&self) -> Self {
        Self {
            intake: self.intake.clone(),
            counters: Arc::clone(&self.counters),
            request_ids: Arc::clone(&self.request_ids),
        }
    }
}

impl<R: Send + 'static> Submitter<R> {
    /// Put a request on the intake channel without waiting for its result.
    ///
    /// # Errors
    ///
    /// `Shutdown` if the balancer no longer accepts work.
    pub fn enqueue<F>(&self, work: F) -> Result<Reply<R>, BalancerError>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let id = self.request_ids.fetch_add(1, Ordering::Relaxed);
        let (request, reply) = Request::new(id, work);
        self.intake
            .send(Message::Request(request))
            .map_err(|_| BalancerError::Shutdown)?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(reply)
    }

    /// Submit work and block until its result arrives.
    ///
    /// # Errors
    ///
    /// `Shutdown` if the balancer stopped before answering, or the error the
    /// request was rejected with.
    pub fn submit<F>(&self, work: F) -> Result<R, BalancerError>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        self.enqueue(work)?.wait()
    }

    /// Submit work from an async context.
    ///
    /// The blocking wait runs on tokio's blocking thread pool.
    ///
    /// # Errors
    ///
    /// As [`submit`](Self::submit), plus `Internal` if the blocking task panicked.
    #[cfg(feature = "tokio-runtime")]
    pub async fn submit_async<F>(&self, work: F) -> Result<R, BalancerError>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let reply = self.enqueue(work)?;
        tokio::task::spawn_blocking(move || reply.wait())
            .await
            .map_err(|e| BalancerError::Internal(e.to_string()))?
    }
}

/// Running balancer: coordinator thread, worker threads and intake.
pub struct Dispatcher<R> {
    config: BalancerConfig,
    submitter: Submitter<R>,
    counters: Arc<BalancerCounters>,
    shutdown: AtomicBool,
    coordinator: Mutex<Option<JoinHandle<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: Send + 'static> Dispatcher<R> {
    /// Start a dispatcher that logs load snapshots through `tracing`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` or `Spawn`.
    pub fn new(config: BalancerConfig) -> Result<Self, BalancerError> {
        Self::start(config, Box::new(TracingStatsSink))
    }

    /// Start a dispatcher publishing load snapshots to `sink`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate, `Spawn` if a
    /// thread cannot be started.
    pub fn start(config: BalancerConfig, sink: Box<dyn StatsSink>) -> Result<Self, BalancerError> {
        let (balancer, queues) = Balancer::<R>::new(&config, sink)?;
        if config.overflow == OverflowPolicy::Block && !config.is_stall_free() {
            warn!(
                queue_capacity = config.queue_capacity,
                producer_count = config.producer_count,
                "Worker queues are smaller than the producer count; dispatch may wait on a full queue"
            );
        }

        let counters = balancer.counters();
        let done = balancer.completion_sender();
        let mut workers = Vec::with_capacity(queues.len());
        for (id, rx) in queues {
            workers.push(spawn_worker(id, rx, done.clone(), config.thread_stack_size)?);
        }
        drop(done);

        let (intake_tx, intake_rx) = unbounded();
        let coordinator = thread::Builder::new()
            .name("lb-balancer".into())
            .spawn(move || balancer.run(&intake_rx))
            .map_err(|e| BalancerError::Spawn(e.to_string()))?;

        info!(
            worker_count = config.worker_count,
            queue_capacity = config.queue_capacity,
            overflow = ?config.overflow,
            "Dispatcher started"
        );

        Ok(Self {
            submitter: Submitter {
                intake: intake_tx,
                counters: Arc::clone(&counters),
                request_ids: Arc::new(AtomicU64::new(0)),
            },
            config,
            counters,
            shutdown: AtomicBool::new(false),
            coordinator: Mutex::new(Some(coordinator)),
            workers: Mutex::new(workers),
        })
    }

    /// A handle producers can move to their own threads.
    #[must_use]
    pub fn submitter(&self) -> Submitter<R> {
        self.submitter.clone()
    }

    /// Submit work and block until its result arrives.
    ///
    /// # Errors
    ///
    /// See [`Submitter::submit`].
    pub fn submit<F>(&self, work: F) -> Result<R, BalancerError>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(BalancerError::Shutdown);
        }
        self.submitter.submit(work)
    }

    /// Submit work from an async context.
    ///
    /// # Errors
    ///
    /// See [`Submitter::submit_async`].
    #[cfg(feature = "tokio-runtime")]
    pub async fn submit_async<F>(&self, work: F) -> Result<R, BalancerError>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(BalancerError::Shutdown);
        }
        self.submitter.submit_async(work).await
    }

    /// Configuration the dispatcher was started with.
    #[must_use]
    pub const fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Current activity counters.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        self.counters.snapshot(self.config.worker_count)
    }

    /// Stop accepting work, wait for in-flight requests, and join all threads.
    ///
    /// Requests still on the intake channel are answered with `Shutdown`.
    /// Calling this more than once is a no-op.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down dispatcher");

        // The coordinator may already be gone if every intake sender dropped.
        let _ = self.submitter.intake.send(Message::Shutdown);

        if let Some(coordinator) = self.coordinator.lock().take() {
            if coordinator.join().is_err() {
                warn!("Balancer thread panicked");
            }
        }

        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        for (idx, worker) in workers.drain(..).enumerate() {
            match worker.join() {
                Ok(()) => debug!(worker_id = idx, "Worker joined"),
                Err(_) => warn!(worker_id = idx, "Worker panicked"),
            }
        }

        info!(worker_count = worker_count, stats = ?self.stats(), "Dispatcher shut down");
    }
}

impl<R> Drop for Dispatcher<R> {
    fn drop(&mut self) {
        // Signal only; joining here could hang on long-running work.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            let _ = self.submitter.intake.send(Message::Shutdown);
            debug!("Dispatcher dropped without explicit shutdown - threads will be detached");
        }
    }
}
