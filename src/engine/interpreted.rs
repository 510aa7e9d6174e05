//! Interpreted evaluator: walks the manifest rule by rule.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::EvaluationError;
use crate::manifest::{Constraint, DomainManifest};
use crate::state::TemporalStateStore;
use crate::value::Value;

use super::decision::{assemble, Decision, Outcome, RuleRef, Violation};
use super::judge::{invalid_reason, judge, missing_reason};
use super::proposal::Proposal;

/// Evaluates proposals directly against a [`DomainManifest`].
///
/// Rules are visited prerequisite-first. A rule is skipped, and reported as
/// pruned, unless every prerequisite passed. Rules with a temporal window
/// read the trailing average from the attached state store; every governed
/// entity's instantaneous value is pushed into the store once per call,
/// before any rule is tested.
#[derive(Debug, Clone)]
pub struct InterpretedEvaluator {
    manifest: Arc<DomainManifest>,
    state: Option<Arc<TemporalStateStore>>,
}

impl InterpretedEvaluator {
    /// Creates an evaluator without temporal state.
    #[must_use]
    pub const fn new(manifest: Arc<DomainManifest>) -> Self {
        Self { manifest, state: None }
    }

    /// Attaches a temporal state store.
    #[must_use]
    pub fn with_state(mut self, state: Arc<TemporalStateStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// The manifest being evaluated.
    pub fn manifest(&self) -> &DomainManifest {
        &self.manifest
    }

    fn record_signals(&self, proposal: &Proposal) -> Result<(), EvaluationError> {
        let Some(state) = &self.state else {
            return Ok(());
        };
        for (entity, value) in proposal.signals() {
            if !self.manifest.governs(entity) {
                continue;
            }
            if let Some(x) = value.as_number() {
                state.push(entity, x)?;
            }
        }
        Ok(())
    }

    fn resolve(&self, constraint: &Constraint, proposal: &Proposal) -> Result<Option<Value>, EvaluationError> {
        if let (Some(seconds), Some(state)) = (constraint.window_seconds(), &self.state) {
            return Ok(state.trailing_average(constraint.entity(), seconds)?.map(Value::Number));
        }
        Ok(proposal.get(constraint.entity()).cloned())
    }

    fn test(&self, constraint: &Constraint, proposal: &Proposal) -> Result<Outcome, EvaluationError> {
        if let Some(signal) = proposal.invalid_signal(constraint.entity()) {
            if constraint.window_seconds().is_none() || self.state.is_none() {
                return Ok(Outcome::Violated(invalid_reason(constraint.operator(), signal)));
            }
        }
        Ok(match self.resolve(constraint, proposal)? {
            None => Outcome::Violated(missing_reason(constraint.operator(), constraint.entity())),
            Some(value) => match judge(constraint, &value) {
                Ok(()) => Outcome::Pass,
                Err(reason) => Outcome::Violated(reason),
            },
        })
    }

    /// Evaluates a proposal and returns the full decision.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::State` if the temporal store's lock is
    /// poisoned. Per-rule problems are violations, not errors.
    pub fn trace_evaluate(&self, proposal: &Proposal) -> Result<Decision, EvaluationError> {
        for signal in proposal.invalid_signals() {
            if self.manifest.governs(&signal.entity) {
                warn!(entity = %signal.entity, raw = %signal.raw, "invalid proposal value");
            }
        }
        self.record_signals(proposal)?;

        let constraints = self.manifest.constraints();
        let mut outcomes: Vec<Option<Outcome>> = vec![None; constraints.len()];
        for &idx in self.manifest.dependency_order() {
            let constraint = &constraints[idx];
            let gated = constraint.conditional_on().iter().any(|dep| {
                self.manifest
                    .rule_index(dep)
                    .and_then(|i| outcomes[i].as_ref())
                    .map_or(true, |o| !o.passed())
            });
            let outcome = if gated {
                warn!(rule_id = %constraint.id(), "rule pruned: prerequisite did not pass");
                Outcome::Pruned
            } else {
                self.test(constraint, proposal)?
            };
            outcomes[idx] = Some(outcome);
        }

        let rules = constraints.iter().zip(outcomes).map(|(c, outcome)| {
            let rule = RuleRef {
                id: c.id(),
                entity: c.entity(),
                description: c.description(),
                severity_label: c.severity_label(),
                severity: c.severity(),
                weight: c.weight(),
                evidence: c.evidence_source(),
            };
            (rule, outcome.unwrap_or(Outcome::Pruned))
        });
        let decision = assemble(self.manifest.domain_id(), rules, proposal, |e| self.manifest.governs(e));

        debug!(
            domain_id = %decision.domain_id,
            violations = decision.violations.len(),
            pruned = decision.pruned.len(),
            score = decision.score,
            "interpreted evaluation complete"
        );
        Ok(decision)
    }

    /// Evaluates a proposal and returns only its violations.
    ///
    /// # Errors
    ///
    /// Same as [`trace_evaluate`](Self::trace_evaluate).
    pub fn evaluate(&self, proposal: &Proposal) -> Result<Vec<Violation>, EvaluationError> {
        Ok(self.trace_evaluate(proposal)?.violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Status;
    use crate::manifest::{ConstraintSpec, ManifestBuilder, Operator};
    use crate::state::StateStoreConfig;
    use crate::time::ManualClock;
    use serde_json::json;

    fn dag() -> Arc<DomainManifest> {
        Arc::new(
            ManifestBuilder::new("DAG_TEST")
                .entities(["a", "b", "c"])
                .constraint(ConstraintSpec::new("RULE_A", "a", Operator::Gt, 10).severity("CRITICAL"))
                .constraint(ConstraintSpec::new("RULE_B", "b", Operator::Gt, 5).severity("WARNING").depends_on("RULE_A"))
                .constraint(ConstraintSpec::new("RULE_C", "c", Operator::Gt, 0).severity("WARNING"))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_failed_prerequisite_prunes_dependent() {
        let eval = InterpretedEvaluator::new(dag());
        let p = Proposal::new().with("a", 5).with("b", 10).with("c", 5);
        let d = eval.trace_evaluate(&p).unwrap();
        assert_eq!(d.status, Status::Rejected);
        assert_eq!(d.violations.len(), 1);
        assert_eq!(d.violations[0].id, "RULE_A");
        assert_eq!(d.pruned, vec!["RULE_B".to_string()]);
        assert_eq!(d.passes, vec!["RULE_C".to_string()]);
        assert_eq!(d.score, 50.0);
        assert!(d.critical);
    }

    #[test]
    fn test_passing_prerequisite_enables_dependent() {
        let eval = InterpretedEvaluator::new(dag());
        let p = Proposal::new().with("a", 20).with("b", 2).with("c", 5);
        let d = eval.trace_evaluate(&p).unwrap();
        assert_eq!(d.violations[0].id, "RULE_B");
        assert_eq!(d.passes, vec!["RULE_A".to_string(), "RULE_C".to_string()]);
        assert_eq!(d.score, 66.67);
        assert!(d.is_safe());
    }

    #[test]
    fn test_missing_and_ungoverned_signals() {
        let eval = InterpretedEvaluator::new(dag());
        let p = Proposal::new().with("a", 20).with("c", 1).with("unknown", 1);
        let d = eval.trace_evaluate(&p).unwrap();
        assert_eq!(d.violations[0].reason, "Signal 'b' not found in proposal");
        assert_eq!(d.ungoverned_signals, vec!["unknown".to_string()]);
    }

    #[test]
    fn test_invalid_value_is_type_mismatch_violation() {
        let eval = InterpretedEvaluator::new(dag());
        let p = Proposal::from_json(&json!({"a": [1], "b": 10, "c": 1})).unwrap();
        let d = eval.trace_evaluate(&p).unwrap();
        assert_eq!(d.violations.len(), 1);
        assert!(d.violations[0].reason.starts_with("Type mismatch"));
        assert_eq!(d.invalid_signals.len(), 1);
        assert_eq!(d.pruned, vec!["RULE_B".to_string()]);
    }

    #[test]
    fn test_null_value_reads_as_missing() {
        let eval = InterpretedEvaluator::new(dag());
        let p = Proposal::from_json(&json!({"a": 20, "b": null, "c": 1})).unwrap();
        let d = eval.trace_evaluate(&p).unwrap();
        assert_eq!(d.violations.len(), 1);
        assert_eq!(d.violations[0].reason, "Signal 'b' not found in proposal");
        assert_eq!(d.invalid_signals.len(), 1);
        assert_eq!(d.invalid_signals[0].entity, "b");
    }

    #[test]
    fn test_empty_manifest_certifies() {
        let eval = InterpretedEvaluator::new(Arc::new(ManifestBuilder::new("EMPTY").build().unwrap()));
        let d = eval.trace_evaluate(&Proposal::new().with("x", 1)).unwrap();
        assert_eq!(d.status, Status::Certified);
        assert_eq!(d.score, 100.0);
    }

    #[test]
    fn test_temporal_rule_uses_trailing_average() {
        let manifest = Arc::new(
            ManifestBuilder::new("FUNDING")
                .entity("funding")
                .constraint(ConstraintSpec::new("AVG_FLOOR", "funding", Operator::Gt, 20_000).window("1h"))
                .build()
                .unwrap(),
        );
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(TemporalStateStore::with_clock(&StateStoreConfig::default(), clock));
        store.push("funding", 5000.0).unwrap();
        store.push("funding", 5000.0).unwrap();

        let eval = InterpretedEvaluator::new(manifest).with_state(Arc::clone(&store));
        let d = eval.trace_evaluate(&Proposal::new().with("funding", 10_000)).unwrap();
        assert_eq!(d.status, Status::Rejected);
        assert!(d.violations[0].reason.starts_with("Value 6666.66"));
        assert_eq!(store.len("funding").unwrap(), 3);
    }
}
