//! Operator semantics and violation wording shared by both evaluators.
//!
//! The vectorized path decides pass/fail from compiled bounds but words its
//! failures through [`failure_reason`], so both paths report identical
//! reasons for identical inputs.

use crate::manifest::{Constraint, Operator, Threshold};
use crate::value::Value;

use super::proposal::InvalidSignal;

/// Reason for a rule whose entity has no usable value.
pub(crate) fn missing_reason(operator: Operator, entity: &str) -> String {
    if operator == Operator::Required {
        "Missing required entity".to_string()
    } else {
        format!("Signal '{entity}' not found in proposal")
    }
}

/// Reason for a rule whose entity was supplied with an unusable value.
///
/// An explicit `null` reads as an absent signal.
pub(crate) fn invalid_reason(operator: Operator, signal: &InvalidSignal) -> String {
    if signal.is_null() {
        return missing_reason(operator, &signal.entity);
    }
    format!(
        "Type mismatch: expected compatible type for '{}', got {}",
        signal.entity, signal.raw
    )
}

fn mismatch_reason(entity: &str, value: &Value) -> String {
    format!(
        "Type mismatch: expected compatible type for '{entity}', got {}",
        value.type_name()
    )
}

/// `REQUIRED`: positive number, `true`, or non-empty text.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => *n > 0.0,
        Value::Text(s) => !s.is_empty(),
    }
}

/// Words a failed test.
pub(crate) fn failure_reason(entity: &str, operator: Operator, threshold: &Threshold, value: &Value) -> String {
    let numeric = operator.is_ordering() || operator == Operator::Range;
    if numeric && value.as_number().is_none() {
        return mismatch_reason(entity, value);
    }
    match operator {
        Operator::Gt => format!("Value {value} not greater than {threshold}"),
        Operator::Lt => format!("Value {value} not less than {threshold}"),
        Operator::Gte => format!("Value {value} not greater than or equal to {threshold}"),
        Operator::Lte => format!("Value {value} not less than or equal to {threshold}"),
        Operator::Eq => format!("Value {value} does not equal {threshold}"),
        Operator::In => format!("Value {value} not in allowed set {threshold}"),
        Operator::Nin => format!("Value {value} in excluded set {threshold}"),
        Operator::Range => format!("Value {value} outside allowed range {threshold}"),
        Operator::Required => format!("Required value {value} is empty or false"),
    }
}

/// Tests one rule against a resolved value.
///
/// A threshold whose type does not fit its operator fails the rule with
/// the mismatch as its reason.
pub(crate) fn judge(constraint: &Constraint, value: &Value) -> Result<(), String> {
    let pass = match constraint.operator() {
        op @ (Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte) => {
            let t = constraint.ordering_threshold().map_err(|e| e.to_string())?;
            value.as_number().is_some_and(|x| match op {
                Operator::Gt => x > t,
                Operator::Lt => x < t,
                Operator::Gte => x >= t,
                _ => x <= t,
            })
        }
        Operator::Range => {
            let (lo, hi) = constraint.range_bounds().map_err(|e| e.to_string())?;
            value.as_number().is_some_and(|x| lo <= x && x <= hi)
        }
        Operator::Eq => constraint.equality_operand().map_err(|e| e.to_string())?.matches(value),
        Operator::In => constraint
            .set_members()
            .map_err(|e| e.to_string())?
            .iter()
            .any(|m| m.matches(value)),
        Operator::Nin => !constraint
            .set_members()
            .map_err(|e| e.to_string())?
            .iter()
            .any(|m| m.matches(value)),
        Operator::Required => is_truthy(value),
    };
    if pass {
        Ok(())
    } else {
        Err(failure_reason(
            constraint.entity(),
            constraint.operator(),
            constraint.threshold(),
            value,
        ))
    }
}
