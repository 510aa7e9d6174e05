//! Rule types: operators, thresholds, severities and validated constraints.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ManifestValidationError, TypeMismatchError};
use crate::value::Value;

/// Comparison operator of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    /// Strictly greater than a number.
    Gt,
    /// Strictly less than a number.
    Lt,
    /// Greater than or equal to a number.
    Gte,
    /// Less than or equal to a number.
    Lte,
    /// Equal to a scalar.
    Eq,
    /// Member of a set.
    In,
    /// Not a member of a set.
    Nin,
    /// Inside an inclusive `[low, high]` pair.
    Range,
    /// Present and truthy.
    Required,
}

impl Operator {
    /// All operators, in wire order.
    pub const ALL: [Self; 9] = [
        Self::Gt,
        Self::Lt,
        Self::Gte,
        Self::Lte,
        Self::Eq,
        Self::In,
        Self::Nin,
        Self::Range,
        Self::Required,
    ];

    /// Wire label of this operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gt => "GT",
            Self::Lt => "LT",
            Self::Gte => "GTE",
            Self::Lte => "LTE",
            Self::Eq => "EQ",
            Self::In => "IN",
            Self::Nin => "NIN",
            Self::Range => "RANGE",
            Self::Required => "REQUIRED",
        }
    }

    /// Threshold shape this operator expects.
    #[must_use]
    pub const fn shape(self) -> ThresholdShape {
        match self {
            Self::Gt | Self::Lt | Self::Gte | Self::Lte | Self::Eq => ThresholdShape::Scalar,
            Self::In | Self::Nin => ThresholdShape::Set,
            Self::Range => ThresholdShape::Pair,
            Self::Required => ThresholdShape::None,
        }
    }

    /// Returns true for the four ordered numeric comparisons.
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Lt | Self::Gte | Self::Lte)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a rule threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdShape {
    /// A single scalar.
    Scalar,
    /// A two-element `[low, high]` array.
    Pair,
    /// An array of scalars.
    Set,
    /// No threshold.
    None,
}

impl fmt::Display for ThresholdShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scalar => "a scalar",
            Self::Pair => "a [low, high] pair",
            Self::Set => "a set of scalars",
            Self::None => "no value",
        })
    }
}

/// A validated rule threshold.
#[derive(Debug, Clone, PartialEq)]
pub enum Threshold {
    /// `REQUIRED` carries no threshold.
    None,
    /// `GT`/`LT`/`GTE`/`LTE`/`EQ`.
    Scalar(Value),
    /// `RANGE`.
    Pair(Value, Value),
    /// `IN`/`NIN`.
    Set(Vec<Value>),
}

fn json_kind(raw: &serde_json::Value) -> &'static str {
    match raw {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl Threshold {
    /// Checks a raw JSON threshold against the operator's shape.
    ///
    /// # Errors
    ///
    /// Returns `ManifestValidationError::OperatorValueMismatch` when the shape
    /// does not fit, e.g. `RANGE` given a scalar.
    pub fn parse(
        rule_id: &str,
        operator: Operator,
        raw: &serde_json::Value,
    ) -> Result<Self, ManifestValidationError> {
        let mismatch = |found: String| ManifestValidationError::OperatorValueMismatch {
            rule_id: rule_id.to_string(),
            operator: operator.as_str().to_string(),
            expected: operator.shape().to_string(),
            found,
        };

        match operator.shape() {
            ThresholdShape::None => Ok(Self::None),
            ThresholdShape::Scalar => Value::from_json(raw)
                .map(Self::Scalar)
                .ok_or_else(|| mismatch(json_kind(raw).to_string())),
            ThresholdShape::Pair => {
                let serde_json::Value::Array(items) = raw else {
                    return Err(mismatch(json_kind(raw).to_string()));
                };
                if items.len() != 2 {
                    return Err(mismatch(format!("an array of {} elements", items.len())));
                }
                let low = Value::from_json(&items[0]).ok_or_else(|| mismatch(json_kind(&items[0]).to_string()))?;
                let high = Value::from_json(&items[1]).ok_or_else(|| mismatch(json_kind(&items[1]).to_string()))?;
                Ok(Self::Pair(low, high))
            }
            ThresholdShape::Set => {
                let serde_json::Value::Array(items) = raw else {
                    return Err(mismatch(json_kind(raw).to_string()));
                };
                items
                    .iter()
                    .map(|item| Value::from_json(item).ok_or_else(|| mismatch(format!("a set containing {}", json_kind(item)))))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Self::Set)
            }
        }
    }

    /// Converts this threshold back into its JSON form.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::None => serde_json::Value::Null,
            Self::Scalar(v) => v.to_json(),
            Self::Pair(a, b) => serde_json::Value::Array(vec![a.to_json(), b.to_json()]),
            Self::Set(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    /// Iterates every scalar in this threshold.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        let slice: &[Value] = match self {
            Self::None => &[],
            Self::Scalar(v) => std::slice::from_ref(v),
            Self::Pair(a, _) => std::slice::from_ref(a),
            Self::Set(items) => items,
        };
        let tail = match self {
            Self::Pair(_, b) => Some(b),
            _ => None,
        };
        slice.iter().chain(tail)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("-"),
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Pair(a, b) => write!(f, "[{a}, {b}]"),
            Self::Set(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Two-level severity used for fast masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeverityClass {
    /// Degrades the score but is not a hard stop.
    Warning = 1,
    /// A hard stop.
    Critical = 2,
}

impl SeverityClass {
    /// Labels that map to the critical class.
    pub const CRITICAL_ALIASES: [&'static str; 4] = ["CRITICAL", "TOXIC", "IMPOSSIBLE", "FATAL"];

    /// Maps a free-text severity label onto its class.
    ///
    /// `CRITICAL`, `TOXIC`, `IMPOSSIBLE` and `FATAL` (any case) are critical;
    /// everything else is a warning.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if Self::CRITICAL_ALIASES.iter().any(|alias| alias.eq_ignore_ascii_case(label)) {
            Self::Critical
        } else {
            Self::Warning
        }
    }

    /// Dense numeric code (`1` warning, `2` critical).
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// A validated rule.
///
/// Constraints are only constructed through manifest validation and are
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub(crate) id: String,
    pub(crate) entity: String,
    pub(crate) operator: Operator,
    pub(crate) threshold: Threshold,
    pub(crate) description: String,
    pub(crate) severity_label: String,
    pub(crate) severity: SeverityClass,
    pub(crate) weight: f64,
    pub(crate) conditional_on: Vec<String>,
    pub(crate) temporal_window: Option<String>,
    pub(crate) window_seconds: Option<f64>,
    pub(crate) evidence_source: Option<String>,
}

impl Constraint {
    /// Rule id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Governed entity.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Comparison operator.
    pub const fn operator(&self) -> Operator {
        self.operator
    }

    /// Threshold the entity is compared against.
    pub const fn threshold(&self) -> &Threshold {
        &self.threshold
    }

    /// Free-text description, possibly empty.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Severity label as authored (e.g. `"TOXIC"`).
    pub fn severity_label(&self) -> &str {
        &self.severity_label
    }

    /// Severity class derived from the label.
    pub const fn severity(&self) -> SeverityClass {
        self.severity
    }

    /// Health-score weight.
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    /// Prerequisite rule ids, in declaration order.
    pub fn conditional_on(&self) -> &[String] {
        &self.conditional_on
    }

    /// Window string as authored (e.g. `"30d"`).
    pub fn temporal_window(&self) -> Option<&str> {
        self.temporal_window.as_deref()
    }

    /// Parsed temporal window in seconds.
    pub const fn window_seconds(&self) -> Option<f64> {
        self.window_seconds
    }

    /// Citation backing the rule.
    pub fn evidence_source(&self) -> Option<&str> {
        self.evidence_source.as_deref()
    }

    fn type_mismatch(&self, expected: &str, found: &Value) -> TypeMismatchError {
        let found = match found {
            Value::Number(n) if !n.is_finite() => "non-finite number".to_string(),
            other => other.type_name().to_string(),
        };
        TypeMismatchError {
            rule_id: self.id.clone(),
            operator: self.operator.as_str().to_string(),
            expected: expected.to_string(),
            found,
        }
    }

    fn finite_number(&self, v: &Value) -> Result<f64, TypeMismatchError> {
        match v {
            Value::Number(n) if n.is_finite() => Ok(*n),
            other => Err(self.type_mismatch("a finite number", other)),
        }
    }

    /// Numeric threshold of an ordering operator (`GT`, `LT`, `GTE`, `LTE`).
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatchError` when the threshold is not a finite number.
    pub fn ordering_threshold(&self) -> Result<f64, TypeMismatchError> {
        match &self.threshold {
            Threshold::Scalar(v) => self.finite_number(v),
            _ => Err(TypeMismatchError {
                rule_id: self.id.clone(),
                operator: self.operator.as_str().to_string(),
                expected: "a scalar".to_string(),
                found: self.threshold.to_string(),
            }),
        }
    }

    /// Numeric bounds of a `RANGE` rule.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatchError` when either end is not a finite number.
    pub fn range_bounds(&self) -> Result<(f64, f64), TypeMismatchError> {
        match &self.threshold {
            Threshold::Pair(a, b) => Ok((self.finite_number(a)?, self.finite_number(b)?)),
            _ => Err(TypeMismatchError {
                rule_id: self.id.clone(),
                operator: self.operator.as_str().to_string(),
                expected: "a [low, high] pair".to_string(),
                found: self.threshold.to_string(),
            }),
        }
    }

    /// Scalar operand of `EQ`, rejecting non-finite numbers.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatchError` for non-finite numbers or a non-scalar threshold.
    pub fn equality_operand(&self) -> Result<&Value, TypeMismatchError> {
        match &self.threshold {
            Threshold::Scalar(v @ Value::Number(n)) if !n.is_finite() => Err(self.type_mismatch("a finite scalar", v)),
            Threshold::Scalar(v) => Ok(v),
            _ => Err(TypeMismatchError {
                rule_id: self.id.clone(),
                operator: self.operator.as_str().to_string(),
                expected: "a scalar".to_string(),
                found: self.threshold.to_string(),
            }),
        }
    }

    /// Members of an `IN`/`NIN` set, rejecting non-finite numbers.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatchError` for non-finite members or a non-set threshold.
    pub fn set_members(&self) -> Result<&[Value], TypeMismatchError> {
        match &self.threshold {
            Threshold::Set(items) => {
                if let Some(bad) = items.iter().find(|v| matches!(v, Value::Number(n) if !n.is_finite())) {
                    return Err(self.type_mismatch("finite scalars", bad));
                }
                Ok(items)
            }
            _ => Err(TypeMismatchError {
                rule_id: self.id.clone(),
                operator: self.operator.as_str().to_string(),
                expected: "a set of scalars".to_string(),
                found: self.threshold.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_wire_labels() {
        let json = serde_json::to_string(&Operator::Gte).unwrap();
        assert_eq!(json, "\"GTE\"");
        let op: Operator = serde_json::from_str("\"NIN\"").unwrap();
        assert_eq!(op, Operator::Nin);
        for op in Operator::ALL {
            let back: Operator = serde_json::from_str(&format!("\"{op}\"")).unwrap();
            assert_eq!(back, op);
        }
    }

    #[test]
    fn test_severity_aliases() {
        assert_eq!(SeverityClass::from_label("TOXIC"), SeverityClass::Critical);
        assert_eq!(SeverityClass::from_label("impossible"), SeverityClass::Critical);
        assert_eq!(SeverityClass::from_label("FATAL"), SeverityClass::Critical);
        assert_eq!(SeverityClass::from_label("CRITICAL"), SeverityClass::Critical);
        assert_eq!(SeverityClass::from_label("WARNING"), SeverityClass::Warning);
        assert_eq!(SeverityClass::from_label("advisory"), SeverityClass::Warning);
        assert_eq!(SeverityClass::Critical.code(), 2);
    }

    #[test]
    fn test_range_rejects_scalar() {
        let err = Threshold::parse("R", Operator::Range, &serde_json::json!(5)).unwrap_err();
        assert!(matches!(err, ManifestValidationError::OperatorValueMismatch { .. }));
        assert!(err.to_string().contains("RANGE"));
    }

    #[test]
    fn test_range_rejects_wrong_arity() {
        let err = Threshold::parse("R", Operator::Range, &serde_json::json!([1, 2, 3])).unwrap_err();
        assert!(err.to_string().contains("3 elements"));
    }

    #[test]
    fn test_set_parses_mixed_scalars() {
        let t = Threshold::parse("R", Operator::In, &serde_json::json!(["a", 2, true])).unwrap();
        assert_eq!(
            t,
            Threshold::Set(vec![Value::from("a"), Value::Number(2.0), Value::Bool(true)])
        );
        assert_eq!(t.values().count(), 3);
    }

    #[test]
    fn test_set_rejects_nested_arrays() {
        assert!(Threshold::parse("R", Operator::Nin, &serde_json::json!([[1]])).is_err());
        assert!(Threshold::parse("R", Operator::In, &serde_json::json!("a")).is_err());
    }

    #[test]
    fn test_required_ignores_value() {
        let t = Threshold::parse("R", Operator::Required, &serde_json::json!({"x": 1})).unwrap();
        assert_eq!(t, Threshold::None);
    }

    #[test]
    fn test_pair_values_iterates_both_ends() {
        let t = Threshold::Pair(Value::Number(1.0), Value::Number(2.0));
        let v: Vec<_> = t.values().cloned().collect();
        assert_eq!(v, vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(t.to_string(), "[1, 2]");
    }
}
