//! Safety properties checked against a manifest's certified region.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric comparison used by safety properties and solver atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    /// Less than.
    #[serde(rename = "<")]
    Lt,
    /// At most.
    #[serde(rename = "<=")]
    Le,
    /// Greater than.
    #[serde(rename = ">")]
    Gt,
    /// At least.
    #[serde(rename = ">=")]
    Ge,
    /// Equal.
    #[serde(rename = "==")]
    Eq,
    /// Not equal.
    #[serde(rename = "!=")]
    Ne,
}

impl Comparison {
    /// Textual symbol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    /// The comparison that holds exactly when this one does not.
    #[must_use]
    pub const fn negate(self) -> Self {
        match self {
            Self::Lt => Self::Ge,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Ge => Self::Lt,
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
        }
    }

    /// Applies the comparison.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparison {
    type Err = PropertyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            other => {
                return Err(PropertyParseError {
                    input: s.to_string(),
                    reason: format!("unknown comparison '{other}'"),
                })
            }
        })
    }
}

/// A property failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid safety property '{input}': {reason}")]
pub struct PropertyParseError {
    /// The text that was parsed.
    pub input: String,
    /// What was wrong with it.
    pub reason: String,
}

/// `<entity> <comparison> <number>`, e.g. `loan_amount <= 50000`.
///
/// # Examples
///
/// ```
/// use rulegate::verifier::{Comparison, SafetyProperty};
///
/// let p: SafetyProperty = "age >= 18".parse().unwrap();
/// assert_eq!(p.entity, "age");
/// assert_eq!(p.comparison, Comparison::Ge);
/// assert_eq!(p.bound, 18.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyProperty {
    /// Entity the property constrains.
    pub entity: String,
    /// Comparison against the bound.
    pub comparison: Comparison,
    /// Finite numeric bound.
    pub bound: f64,
}

impl SafetyProperty {
    /// Creates a property.
    #[must_use]
    pub fn new(entity: impl Into<String>, comparison: Comparison, bound: f64) -> Self {
        Self {
            entity: entity.into(),
            comparison,
            bound,
        }
    }
}

impl fmt::Display for SafetyProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.entity, self.comparison, self.bound)
    }
}

impl FromStr for SafetyProperty {
    type Err = PropertyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| PropertyParseError {
            input: s.to_string(),
            reason: reason.to_string(),
        };
        let tokens: Vec<&str> = s.split_whitespace().collect();
        let [entity, comparison, bound] = tokens.as_slice() else {
            return Err(err("expected '<entity> <op> <number>'"));
        };
        let comparison: Comparison = comparison.parse().map_err(|e: PropertyParseError| err(&e.reason))?;
        let bound: f64 = bound.parse().map_err(|_| err("bound is not a number"))?;
        if !bound.is_finite() {
            return Err(err("bound must be finite"));
        }
        Ok(Self::new(*entity, comparison, bound))
    }
}
