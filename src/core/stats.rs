//! Load snapshots, statistics sinks and lock-free counters.
//!
//! After every handled event the balancer builds a [`LoadSnapshot`] of the
//! pool and hands it to a [`StatsSink`]. Sinks are fire-and-forget: they must
//! not block the coordinating loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::worker::WorkerId;

/// Pending-count of one worker at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerLoad {
    /// Worker identity.
    pub worker: WorkerId,
    /// Position in the heap when the snapshot was taken.
    pub position: usize,
    /// Requests assigned and not yet completed.
    pub pending: usize,
}

/// Pending-counts of the whole pool plus their mean and population variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    /// One entry per worker, in heap order.
    pub loads: Vec<WorkerLoad>,
    /// Mean pending-count.
    pub mean: f64,
    /// Population variance of the pending-counts.
    pub variance: f64,
}

impl LoadSnapshot {
    /// Build a snapshot and compute its aggregates.
    #[must_use]
    pub fn from_loads(loads: Vec<WorkerLoad>) -> Self {
        let (mean, variance) = mean_and_variance(loads.iter().map(|l| l.pending));
        Self {
            loads,
            mean,
            variance,
        }
    }

    /// Pending-counts in heap order.
    #[must_use]
    pub fn pending_counts(&self) -> Vec<usize> {
        self.loads.iter().map(|l| l.pending).collect()
    }

    /// Sum of all pending-counts.
    #[must_use]
    pub fn total_pending(&self) -> usize {
        self.loads.iter().map(|l| l.pending).sum()
    }

    /// Pending-count of one worker, if it is in the snapshot.
    #[must_use]
    pub fn pending_of(&self, worker: WorkerId) -> Option<usize> {
        self.loads
            .iter()
            .find(|l| l.worker == worker)
            .map(|l| l.pending)
    }
}

/// Mean and population variance (`Σx²/n − mean²`). Empty input yields zeros.
#[allow(clippy::cast_precision_loss)]
pub fn mean_and_variance<I>(counts: I) -> (f64, f64)
where
    I: IntoIterator<Item = usize>,
{
    let (n, sum, sum_sq) = counts
        .into_iter()
        .fold((0_usize, 0_usize, 0_usize), |(n, sum, sum_sq), x| {
            (n + 1, sum + x, sum_sq + x * x)
        });
    if n == 0 {
        return (0.0, 0.0);
    }
    let n = n as f64;
    let mean = sum as f64 / n;
    let variance = sum_sq as f64 / n - mean * mean;
    (mean, variance)
}

/// Outbound observation hook fed after every handled event.
pub trait StatsSink: Send {
    /// Receive a snapshot. Must return promptly.
    fn emit(&mut self, snapshot: &LoadSnapshot);
}

/// Logs each snapshot as a debug event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatsSink;

impl StatsSink for TracingStatsSink {
    fn emit(&mut self, snapshot: &LoadSnapshot) {
        let pending = snapshot
            .loads
            .iter()
            .map(|l| l.pending.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        debug!(
            pending = %pending,
            mean = %format!("{:.2}", snapshot.mean),
            variance = %format!("{:.2}", snapshot.variance),
            "Pool load"
        );
    }
}

/// Forwards snapshots over a channel, dropping them when the channel is full.
#[derive(Debug, Clone)]
pub struct ChannelStatsSink {
    tx: Sender<LoadSnapshot>,
}

impl ChannelStatsSink {
    /// Create a sink feeding `tx`.
    #[must_use]
    pub const fn new(tx: Sender<LoadSnapshot>) -> Self {
        Self { tx }
    }
}

impl StatsSink for ChannelStatsSink {
    fn emit(&mut self, snapshot: &LoadSnapshot) {
        match self.tx.try_send(snapshot.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                debug!("Stats receiver dropped");
            }
        }
    }
}

/// Keeps the most recent snapshots in a bounded buffer shared by its clones.
#[derive(Debug, Clone)]
pub struct InMemoryStatsSink {
    snapshots: Arc<Mutex<VecDeque<LoadSnapshot>>>,
    max_snapshots: usize,
}

impl InMemoryStatsSink {
    /// Create a sink retaining at most `max_snapshots` entries.
    #[must_use]
    pub fn new(max_snapshots: usize) -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(VecDeque::with_capacity(max_snapshots))),
            max_snapshots,
        }
    }

    /// Retained snapshots, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> Vec<LoadSnapshot> {
        self.snapshots.lock().iter().cloned().collect()
    }

    /// Most recent snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<LoadSnapshot> {
        self.snapshots.lock().back().cloned()
    }
}

impl StatsSink for InMemoryStatsSink {
    fn emit(&mut self, snapshot: &LoadSnapshot) {
        let mut snapshots = self.snapshots.lock();
        if snapshots.len() >= self.max_snapshots {
            snapshots.pop_front();
        }
        snapshots.push_back(snapshot.clone());
    }
}

/// Activity counters, readable from any thread without touching the pool.
#[derive(Debug, Default)]
pub struct BalancerCounters {
    /// Requests accepted onto the intake channel.
    pub submitted: AtomicU64,
    /// Requests handed to a worker.
    pub dispatched: AtomicU64,
    /// Completions processed.
    pub completed: AtomicU64,
    /// Requests answered with an error instead of a worker.
    pub rejected: AtomicU64,
}

impl BalancerCounters {
    /// Snapshot the counters.
    #[must_use]
    pub fn snapshot(&self, worker_count: usize) -> DispatcherStats {
        let dispatched = self.dispatched.load(Ordering::Relaxed);
        let completed = self.completed.load(Ordering::Relaxed);
        DispatcherStats {
            worker_count,
            submitted: self.submitted.load(Ordering::Relaxed),
            dispatched,
            completed,
            rejected: self.rejected.load(Ordering::Relaxed),
            in_flight: dispatched.saturating_sub(completed),
        }
    }
}

/// Point-in-time view of [`BalancerCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Number of workers.
    pub worker_count: usize,
    /// Requests accepted onto the intake channel.
    pub submitted: u64,
    /// Requests handed to a worker.
    pub dispatched: u64,
    /// Completions processed.
    pub completed: u64,
    /// Requests answered with an error.
    pub rejected: u64,
    /// Dispatched requests whose completion has not been processed.
    pub in_flight: u64,
}
