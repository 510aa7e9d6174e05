//! Decision records produced by both evaluators.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::manifest::SeverityClass;

use super::proposal::{InvalidSignal, Proposal};

/// Unique identifier for a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(Uuid);

impl DecisionId {
    /// Creates a new random decision ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DecisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// No violations.
    Certified,
    /// At least one violation.
    Rejected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Certified => "CERTIFIED",
            Self::Rejected => "REJECTED",
        })
    }
}

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Rule id.
    pub id: String,
    /// Governed entity.
    pub entity: String,
    /// Rule description.
    pub description: String,
    /// Severity label as authored.
    pub severity: String,
    /// Two-level severity class.
    pub severity_class: SeverityClass,
    /// Why the rule failed.
    pub reason: String,
    /// Citation backing the rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// The outcome of evaluating one proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique id of this decision.
    pub decision_id: DecisionId,
    /// When the decision was made.
    pub evaluated_at: DateTime<Utc>,
    /// Domain the proposal was judged against.
    pub domain_id: String,
    /// Verdict.
    pub status: Status,
    /// Weighted health score, `0.0..=100.0`, two decimals.
    pub score: f64,
    /// Failed rules, in manifest order.
    pub violations: Vec<Violation>,
    /// Passed rule ids, in manifest order.
    pub passes: Vec<String>,
    /// Rules skipped because a prerequisite did not pass, in manifest order.
    pub pruned: Vec<String>,
    /// Supplied entities the manifest does not declare, sorted.
    pub ungoverned_signals: Vec<String>,
    /// Supplied values that were not usable scalars.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_signals: Vec<InvalidSignal>,
    /// Any violation is critical-class.
    pub critical: bool,
}

impl Decision {
    /// True when no critical-class rule failed.
    #[must_use]
    pub const fn is_safe(&self) -> bool {
        !self.critical
    }

    /// True when certified.
    #[must_use]
    pub fn is_certified(&self) -> bool {
        self.status == Status::Certified
    }
}

/// Per-rule result before assembly.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Pass,
    Violated(String),
    Pruned,
}

impl Outcome {
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Borrowed view of the rule fields a decision reports.
pub(crate) struct RuleRef<'a> {
    pub id: &'a str,
    pub entity: &'a str,
    pub description: &'a str,
    pub severity_label: &'a str,
    pub severity: SeverityClass,
    pub weight: f64,
    pub evidence: Option<&'a str>,
}

/// `max(0, 100 * (1 - deducted / total))`, or 100 with no weight in play,
/// rounded to two decimals.
pub(crate) fn health_score(deducted: f64, total: f64) -> f64 {
    let score = if total > 0.0 {
        (100.0 * (1.0 - deducted / total)).max(0.0)
    } else {
        100.0
    };
    (score * 100.0).round() / 100.0
}

/// Builds a decision from per-rule outcomes given in manifest order.
pub(crate) fn assemble<'a>(
    domain_id: &str,
    rules: impl Iterator<Item = (RuleRef<'a>, Outcome)>,
    proposal: &Proposal,
    is_governed: impl Fn(&str) -> bool,
) -> Decision {
    let mut total = 0.0;
    let mut deducted = 0.0;
    let mut violations = Vec::new();
    let mut passes = Vec::new();
    let mut pruned = Vec::new();
    let mut critical = false;

    for (rule, outcome) in rules {
        match outcome {
            Outcome::Pass => {
                total += rule.weight;
                passes.push(rule.id.to_string());
            }
            Outcome::Violated(reason) => {
                total += rule.weight;
                deducted += rule.weight;
                critical |= rule.severity == SeverityClass::Critical;
                violations.push(Violation {
                    id: rule.id.to_string(),
                    entity: rule.entity.to_string(),
                    description: rule.description.to_string(),
                    severity: rule.severity_label.to_string(),
                    severity_class: rule.severity,
                    reason,
                    evidence: rule.evidence.map(str::to_string),
                });
            }
            Outcome::Pruned => pruned.push(rule.id.to_string()),
        }
    }

    let mut ungoverned_signals: Vec<String> = proposal
        .entities()
        .filter(|&e| !is_governed(e))
        .map(str::to_string)
        .collect();
    ungoverned_signals.sort();
    ungoverned_signals.dedup();

    Decision {
        decision_id: DecisionId::new(),
        evaluated_at: Utc::now(),
        domain_id: domain_id.to_string(),
        status: if violations.is_empty() {
            Status::Certified
        } else {
            Status::Rejected
        },
        score: health_score(deducted, total),
        violations,
        passes,
        pruned,
        ungoverned_signals,
        invalid_signals: proposal.invalid_signals().to_vec(),
        critical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_score() {
        assert_eq!(health_score(0.0, 0.0), 100.0);
        assert_eq!(health_score(1.0, 2.0), 50.0);
        assert_eq!(health_score(1.0, 3.0), 66.67);
        assert_eq!(health_score(5.0, 3.0), 0.0);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Status::Certified).unwrap(), "\"CERTIFIED\"");
        assert_eq!(serde_json::to_string(&Status::Rejected).unwrap(), "\"REJECTED\"");
    }

    #[test]
    fn test_assemble_orders_and_counts() {
        let rule = |id: &'static str, severity| RuleRef {
            id,
            entity: "x",
            description: "",
            severity_label: "LABEL",
            severity,
            weight: 1.0,
            evidence: None,
        };
        let proposal = Proposal::new().with("x", 1.0).with("zeta", 2.0).with("alpha", 3.0);
        let decision = assemble(
            "D",
            vec![
                (rule("A", SeverityClass::Warning), Outcome::Violated("bad".to_string())),
                (rule("B", SeverityClass::Critical), Outcome::Pruned),
                (rule("C", SeverityClass::Warning), Outcome::Pass),
            ]
            .into_iter(),
            &proposal,
            |e| e == "x",
        );
        assert_eq!(decision.status, Status::Rejected);
        assert_eq!(decision.score, 50.0);
        assert_eq!(decision.pruned, vec!["B".to_string()]);
        assert_eq!(decision.passes, vec!["C".to_string()]);
        assert_eq!(decision.ungoverned_signals, vec!["alpha".to_string(), "zeta".to_string()]);
        assert!(decision.is_safe());
    }
}
