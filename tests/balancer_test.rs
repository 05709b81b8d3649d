//! Balancer state-transition tests.
//!
//! These drive `dispatch` / `completed` directly, without worker threads, and
//! check the scheduling properties after every step:
//! - Heap ordering and cached positions stay consistent
//! - Dispatch always picks a least-loaded worker
//! - The pool never gains or loses workers

use least_loaded::config::BalancerConfig;
use least_loaded::core::{
    Balancer, BalancerError, Event, InMemoryStatsSink, Request, WorkerId, WorkerQueue,
};
use rand::Rng;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn make_balancer(workers: usize) -> (Balancer<u64>, Vec<WorkerQueue<u64>>) {
    let config = BalancerConfig::new()
        .with_worker_count(workers)
        .with_queue_capacity(4096);
    Balancer::new(&config, Box::new(InMemoryStatsSink::new(16))).expect("valid config")
}

fn make_request(id: u64) -> Request<u64> {
    Request::new(id, move || id).0
}

fn sorted_pending(balancer: &Balancer<u64>) -> Vec<usize> {
    let mut counts = balancer.snapshot().pending_counts();
    counts.sort_unstable();
    counts
}

fn assert_well_formed(balancer: &Balancer<u64>, workers: usize) {
    let pool = balancer.pool();
    assert!(pool.is_heap(), "heap ordering violated");
    assert!(pool.positions_consistent(), "cached positions diverged");
    assert_eq!(pool.len(), workers);
    assert_eq!(pool.slot_count(), workers);
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_three_dispatches_spread_evenly() {
    let (mut balancer, _queues) = make_balancer(3);

    for id in 0..3 {
        balancer.dispatch(make_request(id)).unwrap();
    }
    assert_eq!(sorted_pending(&balancer), vec![1, 1, 1]);

    balancer.dispatch(make_request(3)).unwrap();
    assert_eq!(sorted_pending(&balancer), vec![1, 1, 2]);
    assert_well_formed(&balancer, 3);
}

#[test]
fn test_dispatch_prefers_idle_worker_and_completion_reorders() {
    let (mut balancer, queues) = make_balancer(2);

    // Build the [3, 0] state: six dispatches alternate, then drain one worker.
    let busy = balancer.dispatch(make_request(0)).unwrap();
    for id in 1..6 {
        balancer.dispatch(make_request(id)).unwrap();
    }
    let idle = queues
        .iter()
        .map(|(id, _)| *id)
        .find(|id| *id != busy)
        .unwrap();
    for _ in 0..3 {
        balancer.completed(idle).unwrap();
    }
    assert_eq!(balancer.pending(busy), Some(3));
    assert_eq!(balancer.pending(idle), Some(0));

    let chosen = balancer.dispatch(make_request(6)).unwrap();
    assert_eq!(chosen, idle);
    assert_eq!(balancer.pending(busy), Some(3));
    assert_eq!(balancer.pending(idle), Some(1));

    balancer.completed(busy).unwrap();
    assert_eq!(balancer.pending(busy), Some(2));
    assert_eq!(balancer.pending(idle), Some(1));
    assert_eq!(balancer.pool().peek_min(), Some(idle));
    assert_well_formed(&balancer, 2);
}

#[test]
fn test_dispatched_requests_land_on_chosen_queue() {
    let (mut balancer, queues) = make_balancer(2);

    let first = balancer.dispatch(make_request(10)).unwrap();
    let second = balancer.dispatch(make_request(11)).unwrap();

    for (id, rx) in &queues {
        let request = rx.try_recv().expect("one request per worker");
        let expected = if *id == first { 10 } else { 11 };
        assert!(*id == first || *id == second);
        assert_eq!(request.id(), expected);
        assert!(rx.try_recv().is_err());
    }
}

#[test]
fn test_completion_for_idle_worker_is_refused() {
    let (mut balancer, queues) = make_balancer(3);
    let worker = queues[1].0;

    assert_eq!(
        balancer.completed(worker),
        Err(BalancerError::UnexpectedCompletion(worker))
    );
    assert_eq!(balancer.pending(worker), Some(0));
    assert_well_formed(&balancer, 3);
}

#[test]
fn test_handle_reports_errors_and_still_emits() {
    let sink = InMemoryStatsSink::new(8);
    let config = BalancerConfig::new().with_worker_count(2);
    let (mut balancer, _queues) =
        Balancer::<u64>::new(&config, Box::new(sink.clone())).unwrap();

    let err = balancer.handle(Event::Completed(WorkerId::new(0)));
    assert!(err.is_err());
    assert_eq!(sink.snapshots().len(), 1);

    balancer.handle(Event::Dispatch(make_request(1))).unwrap();
    let latest = sink.latest().unwrap();
    assert_eq!(latest.loads.len(), 2);
    assert_eq!(latest.total_pending(), 1);
    assert!((latest.mean - 0.5).abs() < 1e-12);
    assert!((latest.variance - 0.25).abs() < 1e-12);
}

// ============================================================================
// RANDOMIZED SEQUENCES
// ============================================================================

#[test]
fn test_random_interleavings_preserve_invariants() {
    const WORKERS: usize = 5;
    let (mut balancer, queues) = make_balancer(WORKERS);
    let ids: Vec<WorkerId> = queues.iter().map(|(id, _)| *id).collect();
    let mut model = vec![0_usize; WORKERS];
    let mut rng = rand::rng();

    for step in 0..2_000_u64 {
        let busy: Vec<usize> = (0..WORKERS).filter(|&i| model[i] > 0).collect();
        let complete = !busy.is_empty() && rng.random_bool(0.45);

        if complete {
            let i = busy[rng.random_range(0..busy.len())];
            balancer.completed(ids[i]).unwrap();
            model[i] -= 1;
        } else {
            let min_before = *model.iter().min().unwrap();
            let chosen = balancer.dispatch(make_request(step)).unwrap();
            let i = chosen.get();
            assert_eq!(model[i], min_before, "dispatch skipped a lighter worker");
            model[i] += 1;
        }

        for (i, id) in ids.iter().enumerate() {
            assert_eq!(balancer.pending(*id), Some(model[i]));
        }
        assert_eq!(balancer.in_flight(), model.iter().sum::<usize>());
        assert_well_formed(&balancer, WORKERS);
    }
}

#[test]
fn test_snapshot_positions_match_heap() {
    let (mut balancer, _queues) = make_balancer(4);
    for id in 0..7 {
        balancer.dispatch(make_request(id)).unwrap();
    }

    let snapshot = balancer.snapshot();
    for load in &snapshot.loads {
        assert_eq!(balancer.pool().position(load.worker), Some(load.position));
    }
    let min = snapshot.loads[0].pending;
    assert!(snapshot.loads.iter().all(|l| l.pending >= min));
}
