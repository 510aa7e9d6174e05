//! Declarative manifest documents.
//!
//! These are the raw, serde-facing shapes of a manifest. They carry no
//! guarantees; [`DomainManifest`](super::DomainManifest) is the validated form.

use serde::{Deserialize, Deserializer, Serialize};

use super::constraint::Operator;

fn default_severity() -> String {
    "CRITICAL".to_string()
}

const fn default_weight() -> f64 {
    1.0
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One rule as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    /// Unique rule id.
    pub id: String,
    /// Governed entity.
    pub entity: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Threshold: a scalar, a `[low, high]` pair or a member list.
    #[serde(default)]
    pub value: serde_json::Value,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Severity label, mapped onto a class at load.
    #[serde(default = "default_severity")]
    pub severity: String,
    /// Health-score weight.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Prerequisite rule ids.
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "Vec::is_empty")]
    pub conditional_on: Vec<String>,
    /// Trailing window such as `"30d"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_window: Option<String>,
    /// Citation backing the rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_source: Option<String>,
}

impl ConstraintSpec {
    /// Starts a rule with the default severity (`CRITICAL`) and weight (`1.0`).
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        entity: impl Into<String>,
        operator: Operator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            entity: entity.into(),
            operator,
            value: value.into(),
            description: String::new(),
            severity: default_severity(),
            weight: default_weight(),
            conditional_on: Vec::new(),
            temporal_window: None,
            evidence_source: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the severity label.
    #[must_use]
    pub fn severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = severity.into();
        self
    }

    /// Sets the weight.
    #[must_use]
    pub const fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Adds a prerequisite rule id.
    #[must_use]
    pub fn depends_on(mut self, rule_id: impl Into<String>) -> Self {
        self.conditional_on.push(rule_id.into());
        self
    }

    /// Sets the trailing window.
    #[must_use]
    pub fn window(mut self, window: impl Into<String>) -> Self {
        self.temporal_window = Some(window.into());
        self
    }

    /// Sets the evidence citation.
    #[must_use]
    pub fn evidence(mut self, source: impl Into<String>) -> Self {
        self.evidence_source = Some(source.into());
        self
    }
}

/// A manifest as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSpec {
    /// Unique domain id.
    pub domain_id: String,
    /// Human-readable name.
    #[serde(default)]
    pub domain_name: String,
    /// Author-assigned version string.
    #[serde(default)]
    pub version: String,
    /// Governed entity names.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Rules.
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
}
