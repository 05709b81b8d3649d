//! Tests for load snapshots and statistics sinks

use least_loaded::core::{
    mean_and_variance, ChannelStatsSink, InMemoryStatsSink, LoadSnapshot, SlotId, StatsSink,
    WorkerLoad,
};

fn snapshot(pending: &[usize]) -> LoadSnapshot {
    LoadSnapshot::from_loads(
        pending
            .iter()
            .enumerate()
            .map(|(i, &pending)| WorkerLoad {
                worker: SlotId::new(i),
                position: i,
                pending,
            })
            .collect(),
    )
}

#[test]
fn test_statistics_for_two_zero_one() {
    let stats = snapshot(&[2, 0, 1]);
    assert!((stats.mean - 1.0).abs() < 1e-12);
    assert!((stats.variance - 0.666_666_666_666_666_6).abs() < 1e-12);
}

#[test]
fn test_variance_matches_two_pass_formula() {
    let counts = [5_usize, 1, 4, 4, 0, 9];
    let (mean, variance) = mean_and_variance(counts);
    let n = counts.len() as f64;
    let expected_mean = counts.iter().sum::<usize>() as f64 / n;
    let expected_variance = counts
        .iter()
        .map(|&x| (x as f64 - expected_mean).powi(2))
        .sum::<f64>()
        / n;
    assert!((mean - expected_mean).abs() < 1e-9);
    assert!((variance - expected_variance).abs() < 1e-9);
}

#[test]
fn test_snapshot_accessors() {
    let stats = snapshot(&[3, 1]);
    assert_eq!(stats.pending_counts(), vec![3, 1]);
    assert_eq!(stats.total_pending(), 4);
    assert_eq!(stats.pending_of(SlotId::new(1)), Some(1));
    assert_eq!(stats.pending_of(SlotId::new(7)), None);
}

#[test]
fn test_in_memory_sink_shared_between_clones() {
    let sink = InMemoryStatsSink::new(4);
    let mut writer = sink.clone();
    writer.emit(&snapshot(&[1, 1]));
    assert_eq!(sink.snapshots().len(), 1);
}

#[test]
fn test_channel_sink_forwards() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut sink = ChannelStatsSink::new(tx);
    sink.emit(&snapshot(&[0, 2]));
    let received = rx.try_recv().unwrap();
    assert_eq!(received.pending_counts(), vec![0, 2]);
}

#[test]
fn test_snapshot_serializes() {
    let json = serde_json::to_value(snapshot(&[1])).unwrap();
    assert_eq!(json["loads"][0]["worker"], 0);
    assert_eq!(json["loads"][0]["pending"], 1);
}
