use std::sync::Arc;

use serde_json::json;

use rulegate::engine::{Decision, InterpretedEvaluator, Proposal, Status, VectorizedEvaluator};
use rulegate::manifest::DomainManifest;
use rulegate::ManifestCompiler;

const CLINICAL: &str = r#"{
    "domain_id": "CLINICAL",
    "domain_name": "Clinical dosing",
    "version": "1.2.0",
    "entities": ["age", "weight_kg", "dose_mg", "pregnant", "route", "allergy"],
    "constraints": [
        {"id": "ADULT", "entity": "age", "operator": "GTE", "value": 18, "severity": "IMPOSSIBLE",
         "evidence_source": "Label section 8.4"},
        {"id": "WEIGHT", "entity": "weight_kg", "operator": "RANGE", "value": [30, 250], "severity": "WARNING", "weight": 0.5},
        {"id": "DOSE", "entity": "dose_mg", "operator": "LTE", "value": 400, "severity": "TOXIC", "weight": 3,
         "conditional_on": ["ADULT", "WEIGHT"]},
        {"id": "NOT_PREGNANT", "entity": "pregnant", "operator": "EQ", "value": false},
        {"id": "ROUTE", "entity": "route", "operator": "IN", "value": ["oral", "iv"], "severity": "WARNING"},
        {"id": "NO_ALLERGY", "entity": "allergy", "operator": "NIN", "value": ["penicillin", "sulfa"]}
    ]
}"#;

fn evaluators() -> (InterpretedEvaluator, VectorizedEvaluator) {
    let manifest = DomainManifest::from_json_str(CLINICAL).unwrap();
    let compiled = ManifestCompiler::default().compile(&manifest, true).unwrap();
    (
        InterpretedEvaluator::new(Arc::new(manifest)),
        VectorizedEvaluator::new(Arc::new(compiled)),
    )
}

fn assert_same(a: &Decision, b: &Decision) {
    assert_eq!(a.status, b.status);
    assert_eq!(a.score, b.score);
    assert_eq!(a.violations, b.violations);
    assert_eq!(a.passes, b.passes);
    assert_eq!(a.pruned, b.pruned);
    assert_eq!(a.ungoverned_signals, b.ungoverned_signals);
    assert_eq!(a.invalid_signals, b.invalid_signals);
    assert_eq!(a.critical, b.critical);
}

#[test]
fn evaluators_agree_across_proposals() {
    let (interp, vec) = evaluators();
    let proposals = [
        json!({"age": 40, "weight_kg": 80, "dose_mg": 200, "pregnant": false, "route": "oral", "allergy": "none"}),
        json!({"age": 40, "weight_kg": 80, "dose_mg": 401, "pregnant": true, "route": "topical", "allergy": "sulfa"}),
        json!({"age": 12, "weight_kg": 20, "dose_mg": 900, "pregnant": 0, "route": "iv"}),
        json!({"age": "forty", "weight_kg": null, "dose_mg": [1], "notes": "ok"}),
        json!({"age": 18, "weight_kg": 250, "dose_mg": 400, "pregnant": false, "route": "iv", "allergy": 3}),
        json!({}),
    ];
    for raw in proposals {
        let proposal = Proposal::from_json(&raw).unwrap();
        let a = interp.trace_evaluate(&proposal).unwrap();
        let b = vec.trace_evaluate(&proposal).unwrap();
        assert_same(&a, &b);
    }
}

#[test]
fn violation_carries_rule_metadata() {
    let (_, vec) = evaluators();
    let proposal = Proposal::from_json(&json!({
        "age": 16, "weight_kg": 60, "dose_mg": 100, "pregnant": false, "route": "oral", "allergy": "none"
    }))
    .unwrap();
    let decision = vec.trace_evaluate(&proposal).unwrap();
    let violation = &decision.violations[0];
    assert_eq!(violation.id, "ADULT");
    assert_eq!(violation.severity, "IMPOSSIBLE");
    assert_eq!(violation.evidence.as_deref(), Some("Label section 8.4"));
    assert_eq!(violation.reason, "Value 16 not greater than or equal to 18");
    assert!(decision.critical);
    assert_eq!(decision.pruned, vec!["DOSE".to_string()]);
    // 1 of 4.5 weight in play deducted.
    assert_eq!(decision.score, 77.78);
}

#[test]
fn repeated_evaluation_is_idempotent() {
    let (interp, vec) = evaluators();
    let first = Proposal::from_json(&json!({"age": 30, "dose_mg": 9999, "route": "iv"})).unwrap();
    let second = Proposal::from_json(&json!({"age": 30, "weight_kg": 70, "dose_mg": 10})).unwrap();

    let a1 = vec.trace_evaluate(&first).unwrap();
    let _ = vec.trace_evaluate(&second).unwrap();
    let a2 = vec.trace_evaluate(&first).unwrap();
    assert_same(&a1, &a2);
    assert_ne!(a1.decision_id, a2.decision_id);

    let b1 = interp.trace_evaluate(&first).unwrap();
    let b2 = interp.trace_evaluate(&first).unwrap();
    assert_same(&b1, &b2);
}

#[test]
fn empty_manifest_always_certifies() {
    let manifest = DomainManifest::from_json_str(r#"{"domain_id": "EMPTY"}"#).unwrap();
    let compiled = ManifestCompiler::default().compile(&manifest, true).unwrap();
    let interp = InterpretedEvaluator::new(Arc::new(manifest));
    let vec = VectorizedEvaluator::new(Arc::new(compiled));

    let proposal = Proposal::new().with("anything", 1).with("else", "x");
    for decision in [interp.trace_evaluate(&proposal).unwrap(), vec.trace_evaluate(&proposal).unwrap()] {
        assert_eq!(decision.status, Status::Certified);
        assert_eq!(decision.score, 100.0);
        assert_eq!(decision.ungoverned_signals, vec!["anything".to_string(), "else".to_string()]);
    }
}

#[test]
fn decision_serializes_with_wire_field_names() {
    let (_, vec) = evaluators();
    let decision = vec.trace_evaluate(&Proposal::new().with("age", 50)).unwrap();
    let value = serde_json::to_value(&decision).unwrap();
    assert_eq!(value["status"], "REJECTED");
    for field in ["score", "violations", "passes", "pruned", "ungoverned_signals", "decision_id", "evaluated_at"] {
        assert!(value.get(field).is_some(), "missing {field}");
    }
}
