//! Vectorized evaluator over a [`CompiledManifest`].
//!
//! Evaluation runs in three passes over the dense arrays: gather one slot
//! per entity, compute a pass mask for every rule at once, then sweep the
//! dependency order clearing rules whose prerequisites did not pass.

use std::sync::Arc;

use tracing::debug;

use crate::compiler::{CompiledManifest, TestKind};
use crate::error::EvaluationError;
use crate::manifest::SeverityClass;
use crate::value::Value;

use super::decision::{assemble, Decision, Outcome, RuleRef, Violation};
use super::judge::{failure_reason, invalid_reason, missing_reason};
use super::proposal::{InvalidSignal, Proposal};

#[derive(Debug, Clone, Copy)]
enum Slot<'p> {
    Missing,
    Invalid(&'p InvalidSignal),
    Present(&'p Value),
}

/// Evaluates proposals against a compiled manifest.
///
/// Produces the same violations, passes, pruned set and score as
/// [`InterpretedEvaluator`](super::InterpretedEvaluator) for manifests
/// without temporal rules. Temporal windows are not consulted here; rules
/// see the instantaneous value.
///
/// Holds no per-call state and can be shared across threads.
#[derive(Debug, Clone)]
pub struct VectorizedEvaluator {
    compiled: Arc<CompiledManifest>,
}

impl VectorizedEvaluator {
    /// Wraps a compiled manifest.
    #[must_use]
    pub const fn new(compiled: Arc<CompiledManifest>) -> Self {
        Self { compiled }
    }

    /// The manifest being evaluated.
    pub fn compiled(&self) -> &CompiledManifest {
        &self.compiled
    }

    fn gather<'p>(&self, proposal: &'p Proposal) -> Vec<Slot<'p>> {
        self.compiled
            .entity_names()
            .iter()
            .map(|entity| {
                if let Some(value) = proposal.get(entity) {
                    Slot::Present(value)
                } else if let Some(signal) = proposal.invalid_signal(entity) {
                    Slot::Invalid(signal)
                } else {
                    Slot::Missing
                }
            })
            .collect()
    }

    fn passes(&self, rule: usize, value: &Value) -> bool {
        let c = &self.compiled;
        let [lo, hi] = c.bounds()[rule];
        let in_bounds = |v: &Value| v.as_number().is_some_and(|x| lo <= x && x <= hi);
        match &c.tests()[rule] {
            TestKind::Interval => in_bounds(value),
            TestKind::Required => match value {
                Value::Text(s) => !s.is_empty(),
                other => in_bounds(other),
            },
            TestKind::CategoryEq(code) => value
                .as_text()
                .and_then(|label| c.categories().code(label))
                .is_some_and(|found| found == *code),
            TestKind::Member { set, negated } => {
                c.members()[*set].contains(value, c.categories()) != *negated
            }
        }
    }

    /// Evaluates a proposal and returns the full decision.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::CorruptArtifact` if the compiled arrays
    /// disagree in length or reference entities that do not exist.
    pub fn trace_evaluate(&self, proposal: &Proposal) -> Result<Decision, EvaluationError> {
        let c = &self.compiled;
        let n = c.len();
        let lengths = [
            c.entity_of().len(),
            c.bounds().len(),
            c.tests().len(),
            c.weights().len(),
            c.severity_class().len(),
            c.metadata().len(),
        ];
        if lengths.iter().any(|&len| len != n) {
            return Err(EvaluationError::CorruptArtifact {
                reason: format!("rule arrays disagree in length for domain {}", c.domain_id()),
            });
        }

        let slots = self.gather(proposal);
        let mut outcomes = Vec::with_capacity(n);
        for (rule, &entity) in c.entity_of().iter().enumerate() {
            let slot = slots.get(entity).ok_or_else(|| EvaluationError::CorruptArtifact {
                reason: format!("rule {rule} references entity index {entity} of {}", slots.len()),
            })?;
            let meta = &c.metadata()[rule];
            let outcome = match slot {
                Slot::Missing => Outcome::Violated(missing_reason(meta.operator, &meta.entity)),
                Slot::Invalid(signal) => Outcome::Violated(invalid_reason(meta.operator, signal)),
                Slot::Present(value) if self.passes(rule, value) => Outcome::Pass,
                Slot::Present(value) => {
                    Outcome::Violated(failure_reason(&meta.entity, meta.operator, &meta.threshold, value))
                }
            };
            outcomes.push(outcome);
        }

        // Order is topological, so one sweep prunes transitively.
        for &j in c.order() {
            let gated = c.order().iter().any(|&i| c.depends_on(j, i) && !outcomes[i].passed());
            if gated {
                outcomes[j] = Outcome::Pruned;
            }
        }

        let rules = c.metadata().iter().zip(outcomes).enumerate().map(|(i, (meta, outcome))| {
            let rule = RuleRef {
                id: &meta.id,
                entity: &meta.entity,
                description: &meta.description,
                severity_label: &meta.severity_label,
                severity: if c.severity_class()[i] == SeverityClass::Critical.code() {
                    SeverityClass::Critical
                } else {
                    SeverityClass::Warning
                },
                weight: c.weights()[i],
                evidence: meta.evidence.as_deref(),
            };
            (rule, outcome)
        });
        let decision = assemble(c.domain_id(), rules, proposal, |e| c.entity_index().contains_key(e));

        debug!(
            domain_id = %decision.domain_id,
            violations = decision.violations.len(),
            pruned = decision.pruned.len(),
            score = decision.score,
            "vectorized evaluation complete"
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
