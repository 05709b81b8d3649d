//! Synthetic load: producers that submit on random timers and work that
//! sleeps for a random time.
//!
//! Each requester thread waits a random think time, submits one unit of
//! simulated work, blocks for the reply and repeats until told to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::core::{BalancerError, Submitter};

/// Upper bounds for the random delays of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTiming {
    /// Longest pause a requester takes between submissions.
    pub max_think_time: Duration,
    /// Longest a unit of simulated work runs.
    pub max_work_time: Duration,
}

impl SimulationTiming {
    /// Timing proportional to the pool size: think up to 2 s and work up to
    /// 1 s per worker, which keeps the pool busy without saturating it.
    #[must_use]
    pub fn scaled(worker_count: usize) -> Self {
        let workers = u32::try_from(worker_count).unwrap_or(u32::MAX);
        Self {
            max_think_time: Duration::from_secs(2).saturating_mul(workers),
            max_work_time: Duration::from_secs(1).saturating_mul(workers),
        }
    }
}

/// Uniform random duration in `[0, max)`; zero when `max` is zero.
pub fn random_duration<G: Rng>(rng: &mut G, max: Duration) -> Duration {
    let max_nanos = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
    if max_nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rng.random_range(0..max_nanos))
}

/// Sleep for a random time below `max` and report how long, in nanoseconds.
pub fn simulated_work<G: Rng>(rng: &mut G, max: Duration) -> u64 {
    let slept = random_duration(rng, max);
    thread::sleep(slept);
    u64::try_from(slept.as_nanos()).unwrap_or(u64::MAX)
}

/// Start `count` requester threads submitting through `submitter`.
///
/// Each thread returns the number of replies it received once `stop` is set
/// or the balancer shuts down.
///
/// # Errors
///
/// `Spawn` if a thread cannot be started.
pub fn spawn_requesters(
    submitter: &Submitter<u64>,
    count: usize,
    timing: SimulationTiming,
    stop: &Arc<AtomicBool>,
) -> Result<Vec<JoinHandle<u64>>, BalancerError> {
    (0..count)
        .map(|requester_id| {
            let submitter = submitter.clone();
            let stop = Arc::clone(stop);
            thread::Builder::new()
                .name(format!("lb-requester-{requester_id}"))
                .spawn(move || run_requester(requester_id, &submitter, timing, &stop))
                .map_err(|e| BalancerError::Spawn(e.to_string()))
        })
        .collect()
}

fn run_requester(
    requester_id: usize,
    submitter: &Submitter<u64>,
    timing: SimulationTiming,
    stop: &AtomicBool,
) -> u64 {
    let mut rng = rand::rng();
    let mut completed = 0;

    while !stop.load(Ordering::Acquire) {
        thread::sleep(random_duration(&mut rng, timing.max_think_time));
        if stop.load(Ordering::Acquire) {
            break;
        }

        let max_work = timing.max_work_time;
        match submitter.submit(move || simulated_work(&mut rand::rng(), max_work)) {
            Ok(_) => completed += 1,
            Err(BalancerError::Shutdown) => break,
            Err(e) => warn!(requester_id = requester_id, error = %e, "Request failed"),
        }
    }

    debug!(requester_id = requester_id, completed = completed, "Requester stopped");
    completed
}
