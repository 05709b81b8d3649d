//! Runs the balancer against synthetic requesters and logs pool load.
//!
//! Configuration comes from `BALANCER_*` environment variables (or a `.env`
//! file). `BALANCER_RUN_SECS` bounds the run; set `RUST_LOG=debug` to see the
//! per-event load line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tracing::{info, warn};

use least_loaded::config::BalancerConfig;
use least_loaded::core::{AppResult, Dispatcher};
use least_loaded::simulation::{spawn_requesters, SimulationTiming};
use least_loaded::util::init_tracing;

const ENV_RUN_SECS: &str = "BALANCER_RUN_SECS";
const DEFAULT_RUN_SECS: u64 = 30;

fn main() -> AppResult<()> {
    init_tracing();

    let config = BalancerConfig::from_env().map_err(|e| anyhow!(e))?;
    let run_for = std::env::var(ENV_RUN_SECS)
        .ok()
        .map(|raw| raw.parse::<u64>())
        .transpose()
        .with_context(|| format!("{ENV_RUN_SECS} must be a whole number of seconds"))?
        .map_or(Duration::from_secs(DEFAULT_RUN_SECS), Duration::from_secs);

    let dispatcher = Dispatcher::<u64>::new(config.clone()).context("starting dispatcher")?;
    let stop = Arc::new(AtomicBool::new(false));
    let timing = SimulationTiming::scaled(config.worker_count);
    let requesters = spawn_requesters(
        &dispatcher.submitter(),
        config.producer_count,
        timing,
        &stop,
    )
    .context("starting requesters")?;

    info!(
        requesters = requesters.len(),
        run_secs = run_for.as_secs(),
        "Simulation running"
    );
    thread::sleep(run_for);

    stop.store(true, Ordering::Release);
    let mut replies = 0;
    for requester in requesters {
        match requester.join() {
            Ok(count) => replies += count,
            Err(_) => warn!("Requester panicked"),
        }
    }
    dispatcher.shutdown();

    info!(replies = replies, stats = ?dispatcher.stats(), "Simulation finished");
    Ok(())
}
