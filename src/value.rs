//! Scalar values carried by proposals and rule thresholds.
//!
//! A signal is numeric, boolean or categorical text. Booleans coerce to
//! `0.0`/`1.0` wherever a number is expected; text never coerces.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar signal or threshold value.
///
/// # Examples
///
/// ```
/// use rulegate::Value;
///
/// assert_eq!(Value::Bool(true).as_number(), Some(1.0));
/// assert_eq!(Value::Number(2.5).as_number(), Some(2.5));
/// assert_eq!(Value::from("gold").as_number(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A categorical label.
    Text(String),
}

impl Value {
    /// Converts a JSON scalar into a value.
    ///
    /// Returns `None` for null, arrays, objects and numbers that do not fit
    /// a finite `f64`.
    #[must_use]
    pub fn from_json(raw: &serde_json::Value) -> Option<Self> {
        match raw {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(Self::Number),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Converts this value back into JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// True for booleans.
    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    /// True for numbers.
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// True for text.
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Numeric view of this value; booleans coerce to 0/1.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Bool(true) => Some(1.0),
            Self::Bool(false) => Some(0.0),
            Self::Text(_) => None,
        }
    }

    /// Text view; `None` for numbers and booleans.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
        }
    }

    /// Loose equality used by `EQ`, `IN` and `NIN`.
    ///
    /// Numbers and booleans compare numerically; text compares only with text.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Text(_), _) | (_, Self::Text(_)) => false,
            _ => self.as_number() == other.as_number(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Smallest `f64` strictly greater than `x`. NaN and `+inf` map to themselves.
pub(crate) fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

/// Largest `f64` strictly less than `x`. NaN and `-inf` map to themselves.
pub(crate) fn next_down(x: f64) -> f64 {
    -next_up(-x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(Value::from_json(&serde_json::json!(3)), Some(Value::Number(3.0)));
        assert_eq!(Value::from_json(&serde_json::json!(true)), Some(Value::Bool(true)));
        assert_eq!(
            Value::from_json(&serde_json::json!("gold")),
            Some(Value::Text("gold".to_string()))
        );
    }

    #[test]
    fn test_from_json_rejects_non_scalars() {
        assert_eq!(Value::from_json(&serde_json::Value::Null), None);
        assert_eq!(Value::from_json(&serde_json::json!([1, 2])), None);
        assert_eq!(Value::from_json(&serde_json::json!({"a": 1})), None);
    }

    #[test]
    fn test_matches_is_type_aware() {
        assert!(Value::Bool(true).matches(&Value::Number(1.0)));
        assert!(Value::Number(0.0).matches(&Value::Bool(false)));
        assert!(!Value::from("1").matches(&Value::Number(1.0)));
        assert!(Value::from("a").matches(&Value::from("a")));
    }

    #[test]
    fn test_untagged_serialization() {
        let json = serde_json::to_string(&Value::Number(2.5)).unwrap();
        assert_eq!(json, "2.5");
        let v: Value = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(v, Value::from("x"));
        let v: Value = serde_json::from_str("false").unwrap();
        assert_eq!(v, Value::Bool(false));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("gold").to_string(), "\"gold\"");
        assert_eq!(Value::Number(10.0).to_string(), "10");
    }

    #[test]
    fn test_next_up_and_down() {
        assert!(next_up(10.0) > 10.0);
        assert!(next_down(10.0) < 10.0);
        assert_eq!(next_down(next_up(10.0)), 10.0);
        assert!(next_up(0.0) > 0.0);
        assert!(next_up(-1.0) > -1.0);
        assert!(next_down(0.0) < 0.0);
        assert_eq!(next_up(f64::INFINITY), f64::INFINITY);
        assert_eq!(next_up(f64::MAX), f64::INFINITY);
    }
}
