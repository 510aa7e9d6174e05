use std::sync::Arc;

use chrono::Duration;

use rulegate::engine::{InterpretedEvaluator, Proposal, Status};
use rulegate::manifest::{ConstraintSpec, DomainManifest, ManifestBuilder, Operator};
use rulegate::state::{StateStoreConfig, TemporalStateStore};
use rulegate::time::ManualClock;

fn funding_manifest() -> Arc<DomainManifest> {
    Arc::new(
        ManifestBuilder::new("FUNDING")
            .entity("funding")
            .constraint(
                ConstraintSpec::new("AVG_FUNDING", "funding", Operator::Gt, 20_000)
                    .severity("WARNING")
                    .window("1h"),
            )
            .build()
            .unwrap(),
    )
}

#[test]
fn windowed_rule_reads_trailing_average() {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(TemporalStateStore::with_clock(&StateStoreConfig::default(), clock));
    store.push("funding", 5000.0).unwrap();
    store.push("funding", 5000.0).unwrap();

    let evaluator = InterpretedEvaluator::new(funding_manifest()).with_state(Arc::clone(&store));
    let decision = evaluator.trace_evaluate(&Proposal::new().with("funding", 10_000)).unwrap();

    assert_eq!(decision.status, Status::Rejected);
    let reason = &decision.violations[0].reason;
    assert!(reason.starts_with("Value 6666.66"), "{reason}");
    assert!((store.calculate_average("funding", 3600.0).unwrap() - 6666.67).abs() < 0.01);
}

#[test]
fn entries_outside_the_window_are_ignored() {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(TemporalStateStore::with_clock(&StateStoreConfig::default(), clock.clone()));
    store.push("funding", 1.0).unwrap();
    clock.advance(Duration::hours(2));

    let evaluator = InterpretedEvaluator::new(funding_manifest()).with_state(Arc::clone(&store));
    let decision = evaluator.trace_evaluate(&Proposal::new().with("funding", 30_000)).unwrap();
    assert_eq!(decision.status, Status::Certified);
    assert_eq!(store.calculate_frequency("funding", 3600.0).unwrap(), 1);
    assert_eq!(store.len("funding").unwrap(), 2);
}

#[test]
fn empty_window_counts_as_missing() {
    let store = Arc::new(TemporalStateStore::default());
    let evaluator = InterpretedEvaluator::new(funding_manifest()).with_state(store);
    let decision = evaluator.trace_evaluate(&Proposal::new()).unwrap();
    assert_eq!(decision.violations[0].reason, "Signal 'funding' not found in proposal");
}

#[test]
fn without_a_store_the_instantaneous_value_is_used() {
    let evaluator = InterpretedEvaluator::new(funding_manifest());
    let decision = evaluator.trace_evaluate(&Proposal::new().with("funding", 25_000)).unwrap();
    assert_eq!(decision.status, Status::Certified);
}

#[test]
fn concurrent_pushes_are_not_lost() {
    let store = Arc::new(TemporalStateStore::default());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..100 {
                    store.push("load", f64::from(t * 100 + i)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.len("load").unwrap(), 800);
}
