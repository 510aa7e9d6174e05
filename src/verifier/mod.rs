//! Formal verification of manifests.
//!
//! The verifier proves properties of a rule set that hold for every possible
//! proposal: the rules can be satisfied together, no rule is unreachable
//! behind its own prerequisites, and a given safety property holds across
//! every certified input. Each proof obligation runs under the configured
//! timeout and decision budget. Running out of either is reported as
//! *inconclusive*, never as a verdict.

mod encode;
mod formula;
mod property;
mod solver;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConfigError, GateResult};
use crate::manifest::DomainManifest;
use crate::value::Value;

use encode::Encoding;
use formula::Formula;
use solver::{solve, Budget, SatResult};

pub use property::{Comparison, PropertyParseError, SafetyProperty};

/// A concrete assignment of one value per declared entity.
pub type Witness = BTreeMap<String, Value>;

/// Verifier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Wall-clock limit per solver call, in milliseconds.
    pub timeout_ms: u64,
    /// Branching decisions allowed per solver call.
    pub max_decisions: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_decisions: 100_000,
        }
    }
}

impl VerifierConfig {
    /// Per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Checks the configuration for unusable values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when either limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "verifier.timeout_ms must be > 0".to_string(),
            });
        }
        if self.max_decisions == 0 {
            return Err(ConfigError::Invalid {
                reason: "verifier.max_decisions must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Result of a consistency check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ConsistencyOutcome {
    /// Some input satisfies every rule whose prerequisites hold.
    Consistent,
    /// No input can; `explanation` names a minimal conflicting rule set.
    Contradictory {
        /// Human-readable conflict description.
        explanation: String,
    },
    /// The solver ran out of time or decisions.
    Inconclusive {
        /// Why the check did not finish.
        reason: String,
    },
}

impl ConsistencyOutcome {
    /// Returns true only for a proven-consistent manifest.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }
}

/// Result of a satisfiability check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum SatisfiabilityOutcome {
    /// Every rule can hold at once; `witness` is one such input.
    Satisfiable {
        /// Example input.
        witness: Witness,
    },
    /// The rules cannot all hold at once.
    Unsatisfiable,
    /// The solver ran out of time or decisions.
    Inconclusive {
        /// Why the check did not finish.
        reason: String,
    },
}

impl SatisfiabilityOutcome {
    /// Returns the witness, if any.
    #[must_use]
    pub const fn witness(&self) -> Option<&Witness> {
        match self {
            Self::Satisfiable { witness } => Some(witness),
            _ => None,
        }
    }
}

/// Result of a property proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ProofOutcome {
    /// The property holds for every input the manifest certifies.
    Proven,
    /// A certified input violates the property.
    Refuted {
        /// The counterexample.
        witness: Witness,
    },
    /// The solver ran out of time or decisions.
    Inconclusive {
        /// Why the proof did not finish.
        reason: String,
    },
}

/// Rules that can never be evaluated to a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadCodeAnalysis {
    /// Rules contradicted by their own prerequisite chain.
    pub dead_rules: Vec<String>,
    /// Rules whose check did not finish.
    pub inconclusive_rules: Vec<String>,
}

/// Aggregated verification report for one manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Domain the report covers.
    pub domain_id: String,
    /// Proven consistent.
    pub consistent: bool,
    /// Conflict description when proven inconsistent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Proven satisfiable with every rule asserted.
    pub satisfiable: bool,
    /// One satisfying input, when satisfiable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_input: Option<Witness>,
    /// Unreachable rules.
    pub dead_rules: Vec<String>,
    /// Rules whose dead-code check did not finish.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inconclusive_rules: Vec<String>,
    /// Why the consistency or satisfiability check did not finish.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inconclusive_reason: Option<String>,
}

/// Solver-backed manifest verifier.
///
/// # Examples
///
/// ```
/// use rulegate::manifest::{ConstraintSpec, ManifestBuilder, Operator};
/// use rulegate::verifier::{ConsistencyOutcome, FormalVerifier};
///
/// let manifest = ManifestBuilder::new("PARADOX")
///     .entity("amount")
///     .constraint(ConstraintSpec::new("MIN", "amount", Operator::Gt, 10))
///     .constraint(ConstraintSpec::new("MAX", "amount", Operator::Lt, 5))
///     .build()
///     .unwrap();
///
/// let outcome = FormalVerifier::default().verify_consistency(&manifest).unwrap();
/// assert!(matches!(outcome, ConsistencyOutcome::Contradictory { .. }));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FormalVerifier {
    config: VerifierConfig,
}

impl FormalVerifier {
    /// Creates a verifier.
    #[must_use]
    pub const fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &VerifierConfig {
        &self.config
    }

    fn budget(&self) -> Budget {
        Budget {
            timeout: self.config.timeout(),
            max_decisions: self.config.max_decisions,
        }
    }

    fn check(&self, encoding: &Encoding<'_>, assertions: &[&Formula]) -> SatResult {
        solve(encoding.sorts(), assertions, self.budget())
    }

    /// Checks that the rules, with prerequisites modelled as implications,
    /// admit at least one input.
    ///
    /// # Errors
    ///
    /// Returns a compile error when a threshold's type does not fit its operator.
    pub fn verify_consistency(&self, manifest: &DomainManifest) -> GateResult<ConsistencyOutcome> {
        let encoding = Encoding::new(manifest)?;
        let guarded: Vec<Formula> = (0..encoding.rule_count()).map(|i| encoding.guarded(i)).collect();
        let refs: Vec<&Formula> = guarded.iter().collect();

        let outcome = match self.check(&encoding, &refs) {
            SatResult::Sat(_) => ConsistencyOutcome::Consistent,
            SatResult::Unsat => ConsistencyOutcome::Contradictory {
                explanation: self.explain(manifest, &encoding, &guarded),
            },
            SatResult::Unknown(reason) => {
                warn!(domain_id = %manifest.domain_id(), %reason, "consistency check inconclusive");
                ConsistencyOutcome::Inconclusive { reason }
            }
        };
        info!(
            domain_id = %manifest.domain_id(),
            consistent = outcome.is_consistent(),
            "consistency check complete"
        );
        Ok(outcome)
    }

    /// Shrinks an unsatisfiable assertion set to a minimal one by deletion
    /// and names the surviving rules.
    fn explain(&self, manifest: &DomainManifest, encoding: &Encoding<'_>, assertions: &[Formula]) -> String {
        let mut core: Vec<usize> = (0..assertions.len()).collect();
        let mut i = 0;
        while i < core.len() {
            let trial: Vec<usize> = core.iter().copied().filter(|&j| j != core[i]).collect();
            let refs: Vec<&Formula> = trial.iter().map(|&j| &assertions[j]).collect();
            if self.check(encoding, &refs) == SatResult::Unsat {
                core = trial;
            } else {
                i += 1;
            }
        }
        let ids: Vec<&str> = core.iter().map(|&j| manifest.constraints()[j].id()).collect();
        format!("contradictory constraints: {}", ids.join(", "))
    }

    /// Checks that every rule can hold at once and extracts a witness.
    ///
    /// # Errors
    ///
    /// Returns a compile error when a threshold's type does not fit its operator.
    pub fn verify_satisfiable(&self, manifest: &DomainManifest) -> GateResult<SatisfiabilityOutcome> {
        let encoding = Encoding::new(manifest)?;
        let refs: Vec<&Formula> = (0..encoding.rule_count()).map(|i| encoding.rule(i)).collect();

        let outcome = match self.check(&encoding, &refs) {
            SatResult::Sat(model) => SatisfiabilityOutcome::Satisfiable {
                witness: encoding.witness(&model),
            },
            SatResult::Unsat => SatisfiabilityOutcome::Unsatisfiable,
            SatResult::Unknown(reason) => {
                warn!(domain_id = %manifest.domain_id(), %reason, "satisfiability check inconclusive");
                SatisfiabilityOutcome::Inconclusive { reason }
            }
        };
        info!(
            domain_id = %manifest.domain_id(),
            satisfiable = outcome.witness().is_some(),
            "satisfiability check complete"
        );
        Ok(outcome)
    }

    /// Flags rules that contradict their own transitive prerequisites.
    ///
    /// # Errors
    ///
    /// Returns a compile error when a threshold's type does not fit its operator.
    pub fn detect_dead_code(&self, manifest: &DomainManifest) -> GateResult<DeadCodeAnalysis> {
        let encoding = Encoding::new(manifest)?;
        let mut analysis = DeadCodeAnalysis::default();

        for (idx, constraint) in manifest.constraints().iter().enumerate() {
            let mut refs: Vec<&Formula> = manifest.ancestors(idx).into_iter().map(|i| encoding.rule(i)).collect();
            refs.push(encoding.rule(idx));
            match self.check(&encoding, &refs) {
                SatResult::Sat(_) => {}
                SatResult::Unsat => analysis.dead_rules.push(constraint.id().to_string()),
                SatResult::Unknown(reason) => {
                    warn!(rule_id = %constraint.id(), %reason, "dead code check inconclusive");
                    analysis.inconclusive_rules.push(constraint.id().to_string());
                }
            }
        }
        info!(
            domain_id = %manifest.domain_id(),
            dead = analysis.dead_rules.len(),
            "dead code analysis complete"
        );
        Ok(analysis)
    }

    fn prove(&self, manifest: &DomainManifest, given: &[SafetyProperty], goal: &SafetyProperty) -> GateResult<ProofOutcome> {
        let encoding = Encoding::new(manifest)?;
        let mut assertions: Vec<Formula> = given.iter().map(|p| encoding.property(p)).collect::<GateResult<_>>()?;
        assertions.push(encoding.property(goal)?.negate());

        let mut refs: Vec<&Formula> = (0..encoding.rule_count()).map(|i| encoding.rule(i)).collect();
        refs.extend(assertions.iter());

        Ok(match self.check(&encoding, &refs) {
            SatResult::Unsat => ProofOutcome::Proven,
            SatResult::Sat(model) => ProofOutcome::Refuted {
                witness: encoding.witness(&model),
            },
            SatResult::Unknown(reason) => {
                warn!(domain_id = %manifest.domain_id(), property = %goal, %reason, "proof inconclusive");
                ProofOutcome::Inconclusive { reason }
            }
        })
    }

    /// Searches for a certified input that violates `property`.
    ///
    /// `Proven` means no such input exists.
    ///
    /// # Errors
    ///
    /// Fails on threshold type mismatches, or when the property names an
    /// undeclared entity.
    pub fn find_counterexample(&self, manifest: &DomainManifest, property: &SafetyProperty) -> GateResult<ProofOutcome> {
        self.prove(manifest, &[], property)
    }

    /// Proves that `given` together with the manifest implies `goal`.
    ///
    /// # Errors
    ///
    /// Same as [`find_counterexample`](Self::find_counterexample).
    pub fn prove_implication(
        &self,
        manifest: &DomainManifest,
        given: &[SafetyProperty],
        goal: &SafetyProperty,
    ) -> GateResult<ProofOutcome> {
        self.prove(manifest, given, goal)
    }

    /// Runs consistency, satisfiability and dead-code checks.
    ///
    /// # Errors
    ///
    /// Returns a compile error when a threshold's type does not fit its operator.
    pub fn verify(&self, manifest: &DomainManifest) -> GateResult<VerificationReport> {
        let consistency = self.verify_consistency(manifest)?;
        let satisfiability = self.verify_satisfiable(manifest)?;
        let dead = self.detect_dead_code(manifest)?;

        let mut inconclusive_reason = None;
        let (consistent, explanation) = match consistency {
            ConsistencyOutcome::Consistent => (true, None),
            ConsistencyOutcome::Contradictory { explanation } => (false, Some(explanation)),
            ConsistencyOutcome::Inconclusive { reason } => {
                inconclusive_reason = Some(reason);
                (false, None)
            }
        };
        let (satisfiable, example_input) = match satisfiability {
            SatisfiabilityOutcome::Satisfiable { witness } => (true, Some(witness)),
            SatisfiabilityOutcome::Unsatisfiable => (false, None),
            SatisfiabilityOutcome::Inconclusive { reason } => {
                inconclusive_reason.get_or_insert(reason);
                (false, None)
            }
        };

        Ok(VerificationReport {
            domain_id: manifest.domain_id().to_string(),
            consistent,
            explanation,
            satisfiable,
            example_input,
            dead_rules: dead.dead_rules,
            inconclusive_rules: dead.inconclusive_rules,
            inconclusive_reason,
        })
    }
}
