//! # Least Loaded
//!
//! A single-process load-balancing dispatcher. Work items arrive from many
//! concurrent producers and each one is routed to the worker with the fewest
//! outstanding requests.
//!
//! ## How it works
//!
//! - **Pool**: an array-backed min-heap of workers keyed on their live
//!   pending-count. Each worker's heap position is cached in its slot, so a
//!   worker whose count changed mid-heap is re-homed in O(log n).
//! - **Balancer**: the only owner of the pool. One coordinating loop waits on
//!   the intake and completion channels, handles exactly one event at a time
//!   and publishes a load snapshot after each. Serializing every mutation
//!   through that loop is what lets the pool go without locks.
//! - **Workers**: one OS thread per pool slot, each draining its own bounded
//!   FIFO queue, replying to the producer, then reporting completion.
//!
//! ## Dispatcher
//!
//! ```rust,ignore
//! use least_loaded::config::BalancerConfig;
//! use least_loaded::core::Dispatcher;
//!
//! let dispatcher = Dispatcher::<u64>::new(
//!     BalancerConfig::new()
//!         .with_worker_count(4)
//!         .with_queue_capacity(64),
//! )?;
//!
//! // Blocking submit from any thread
//! let submitter = dispatcher.submitter();
//! let answer = submitter.submit(|| 6 * 7)?;
//!
//! // Async submit (default `tokio-runtime` feature)
//! let answer = dispatcher.submit_async(|| 6 * 7).await?;
//!
//! dispatcher.shutdown();
//! ```
//!
//! ## Limitations
//!
//! Work functions are trusted to terminate. There is no timeout or
//! cancellation: a work item that never returns pins its worker forever. A
//! work function that panics is caught; its producer gets
//! `BalancerError::WorkPanicked` and the worker carries on.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Worker heap, balancer, workers and the threaded dispatcher.
pub mod core;
/// Configuration models for the balancer.
pub mod config;
/// Synthetic producers and simulated work.
pub mod simulation;
/// Shared utilities.
pub mod util;
