//! Proposals: the entity → value maps being judged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;
use crate::value::Value;

/// A signal that could not be read as a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidSignal {
    /// Entity name as supplied.
    pub entity: String,
    /// Raw value as supplied, rendered as text.
    pub raw: String,
}

impl InvalidSignal {
    /// The entity was supplied as JSON `null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.raw == "null"
    }
}

/// An evaluation request.
///
/// Every entity is either a usable scalar or an explicit [`InvalidSignal`];
/// nothing is silently dropped.
///
/// # Examples
///
/// ```
/// use rulegate::engine::Proposal;
///
/// let p = Proposal::from_json_str(r#"{"age": 30, "tier": "gold", "notes": null}"#).unwrap();
/// assert_eq!(p.len(), 2);
/// assert_eq!(p.invalid_signals()[0].entity, "notes");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    signals: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    invalid: Vec<InvalidSignal>,
}

impl Proposal {
    /// Creates an empty proposal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON object of entity → scalar.
    ///
    /// Null, arrays, objects and numbers outside `f64` are kept as
    /// [`InvalidSignal`]s.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::MalformedProposal` when `raw` is not an object.
    pub fn from_json(raw: &serde_json::Value) -> Result<Self, EvaluationError> {
        let serde_json::Value::Object(map) = raw else {
            return Err(EvaluationError::MalformedProposal {
                reason: format!("expected an object, got {raw}"),
            });
        };
        let mut proposal = Self::new();
        for (entity, value) in map {
            match Value::from_json(value) {
                Some(v) => {
                    proposal.insert(entity.clone(), v);
                }
                None => proposal.reject(entity.clone(), value.to_string()),
            }
        }
        Ok(proposal)
    }

    /// Parses a JSON object from text.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::MalformedProposal` for invalid JSON or a non-object.
    pub fn from_json_str(s: &str) -> Result<Self, EvaluationError> {
        let raw: serde_json::Value = serde_json::from_str(s).map_err(|e| EvaluationError::MalformedProposal {
            reason: e.to_string(),
        })?;
        Self::from_json(&raw)
    }

    /// Sets a signal. Non-finite numbers are recorded as invalid instead.
    pub fn insert(&mut self, entity: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let entity = entity.into();
        match value.into() {
            Value::Number(n) if !n.is_finite() => self.reject(entity, n.to_string()),
            value => {
                self.invalid.retain(|s| s.entity != entity);
                self.signals.insert(entity, value);
            }
        }
        self
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, entity: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(entity, value);
        self
    }

    fn reject(&mut self, entity: String, raw: String) {
        self.signals.remove(&entity);
        self.invalid.retain(|s| s.entity != entity);
        self.invalid.push(InvalidSignal { entity, raw });
    }

    /// The usable value of `entity`.
    #[must_use]
    pub fn get(&self, entity: &str) -> Option<&Value> {
        self.signals.get(entity)
    }

    /// The invalid record for `entity`, if its value was unusable.
    #[must_use]
    pub fn invalid_signal(&self, entity: &str) -> Option<&InvalidSignal> {
        self.invalid.iter().find(|s| s.entity == entity)
    }

    /// Every unusable signal, in the order supplied.
    pub fn invalid_signals(&self) -> &[InvalidSignal] {
        &self.invalid
    }

    /// Usable signals, sorted by entity.
    pub fn signals(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.signals.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every supplied entity name, valid or not.
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.signals
            .keys()
            .map(String::as_str)
            .chain(self.invalid.iter().map(|s| s.entity.as_str()))
    }

    /// Number of usable signals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// No signal was supplied, valid or not.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty() && self.invalid.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Proposal {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut proposal = Self::new();
        for (k, v) in iter {
            proposal.insert(k, v);
        }
        proposal
    }
}
