//! Manifest model: the validated rule set of one governance domain.
//!
//! A [`DomainManifest`] is immutable once constructed. Re-verification or
//! re-compilation after a change requires building a new instance.

mod category;
mod constraint;
mod document;
mod validation;

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

pub use category::CategoryTable;
pub use constraint::{Constraint, Operator, SeverityClass, Threshold, ThresholdShape};
pub use document::{ConstraintSpec, ManifestSpec};
pub use validation::MAX_IDENT_LEN;

use crate::error::ManifestValidationError;

/// A validated, immutable manifest.
///
/// # Examples
///
/// ```
/// use rulegate::manifest::{ConstraintSpec, ManifestBuilder, Operator};
///
/// let manifest = ManifestBuilder::new("LENDING")
///     .entity("credit_score")
///     .constraint(ConstraintSpec::new("MIN_SCORE", "credit_score", Operator::Gte, 620))
///     .build()
///     .unwrap();
/// assert_eq!(manifest.constraints().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct DomainManifest {
    spec: ManifestSpec,
    constraints: Vec<Constraint>,
    order: Vec<usize>,
    rule_index: HashMap<String, usize>,
    fingerprint: String,
}

impl DomainManifest {
    /// Validates a manifest document.
    ///
    /// # Errors
    ///
    /// Returns `ManifestValidationError` on any schema or referential problem:
    /// undeclared entities, unresolvable or cyclic prerequisites, operator/value
    /// shape mismatches, invalid weights or windows.
    pub fn from_spec(spec: ManifestSpec) -> Result<Self, ManifestValidationError> {
        let (constraints, order) = validation::validate(&spec)?;
        let rule_index = constraints
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        let canonical = serde_json::to_vec(&spec).map_err(|e| ManifestValidationError::Malformed {
            message: format!("serialize manifest: {e}"),
        })?;
        let fingerprint = blake3::hash(&canonical).to_hex().to_string();

        Ok(Self {
            spec,
            constraints,
            order,
            rule_index,
            fingerprint,
        })
    }

    /// Parses and validates a JSON manifest.
    ///
    /// # Errors
    ///
    /// Returns `ManifestValidationError::Malformed` for invalid JSON, or any
    /// validation error.
    pub fn from_json_str(s: &str) -> Result<Self, ManifestValidationError> {
        let spec: ManifestSpec = serde_json::from_str(s).map_err(|e| ManifestValidationError::Malformed {
            message: format!("deserialize manifest: {e}"),
        })?;
        Self::from_spec(spec)
    }

    /// Parses and validates a JSON manifest from a reader.
    ///
    /// # Errors
    ///
    /// Returns `ManifestValidationError::Malformed` for I/O or JSON failures.
    pub fn from_reader(mut reader: impl Read) -> Result<Self, ManifestValidationError> {
        let mut buf = String::new();
        reader
            .read_to_string(&mut buf)
            .map_err(|e| ManifestValidationError::Malformed {
                message: format!("read manifest: {e}"),
            })?;
        Self::from_json_str(&buf)
    }

    /// Loads and validates a JSON manifest file.
    ///
    /// # Errors
    ///
    /// Returns `ManifestValidationError::Malformed` if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestValidationError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| ManifestValidationError::Malformed {
            message: format!("open {}: {e}", path.display()),
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Unique domain id.
    pub fn domain_id(&self) -> &str {
        &self.spec.domain_id
    }

    /// Human-readable name.
    pub fn domain_name(&self) -> &str {
        &self.spec.domain_name
    }

    /// Author-assigned version string.
    pub fn version(&self) -> &str {
        &self.spec.version
    }

    /// Declared entities, in declaration order.
    pub fn entities(&self) -> &[String] {
        &self.spec.entities
    }

    /// Constraints, in declaration order.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Constraint indices in a stable, prerequisite-first order.
    pub fn dependency_order(&self) -> &[usize] {
        &self.order
    }

    /// Index of a rule by id.
    #[must_use]
    pub fn rule_index(&self, id: &str) -> Option<usize> {
        self.rule_index.get(id).copied()
    }

    /// A rule by id.
    #[must_use]
    pub fn constraint(&self, id: &str) -> Option<&Constraint> {
        self.rule_index(id).map(|i| &self.constraints[i])
    }

    /// Returns true if the entity is declared.
    #[must_use]
    pub fn governs(&self, entity: &str) -> bool {
        self.spec.entities.iter().any(|e| e == entity)
    }

    /// Indices of every transitive prerequisite of rule `idx`, ascending.
    #[must_use]
    pub fn ancestors(&self, idx: usize) -> Vec<usize> {
        let mut seen = vec![false; self.constraints.len()];
        let mut stack: Vec<usize> = self.direct_prerequisites(idx).collect();
        while let Some(i) = stack.pop() {
            if seen[i] {
                continue;
            }
            seen[i] = true;
            stack.extend(self.direct_prerequisites(i));
        }
        seen.iter().enumerate().filter_map(|(i, &s)| s.then_some(i)).collect()
    }

    fn direct_prerequisites(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.constraints[idx]
            .conditional_on
            .iter()
            .filter_map(|dep| self.rule_index(dep))
    }

    /// Returns true if no rule has prerequisites.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.constraints.iter().all(|c| c.conditional_on.is_empty())
    }

    /// Returns true if any rule reads a temporal window.
    #[must_use]
    pub fn has_temporal_rules(&self) -> bool {
        self.constraints.iter().any(|c| c.temporal_window.is_some())
    }

    /// Content fingerprint (BLAKE3 of the canonical JSON document).
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The authored document this manifest was validated from.
    pub const fn spec(&self) -> &ManifestSpec {
        &self.spec
    }
}

impl PartialEq for DomainManifest {
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

/// Programmatic manifest construction.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    spec: ManifestSpec,
}

impl ManifestBuilder {
    /// Starts a manifest for `domain_id` at version `1.0.0`.
    #[must_use]
    pub fn new(domain_id: impl Into<String>) -> Self {
        let domain_id = domain_id.into();
        Self {
            spec: ManifestSpec {
                domain_name: domain_id.clone(),
                domain_id,
                version: "1.0.0".to_string(),
                entities: Vec::new(),
                constraints: Vec::new(),
            },
        }
    }

    /// Sets the human-readable name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.spec.domain_name = name.into();
        self
    }

    /// Sets the version string.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.spec.version = version.into();
        self
    }

    /// Declares an entity.
    #[must_use]
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.spec.entities.push(entity.into());
        self
    }

    /// Declares several entities.
    #[must_use]
    pub fn entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.entities.extend(entities.into_iter().map(Into::into));
        self
    }

    /// Appends a rule.
    #[must_use]
    pub fn constraint(mut self, constraint: ConstraintSpec) -> Self {
        self.spec.constraints.push(constraint);
        self
    }

    /// Validates and builds the manifest.
    ///
    /// # Errors
    ///
    /// Returns `ManifestValidationError` exactly as [`DomainManifest::from_spec`].
    pub fn build(self) -> Result<DomainManifest, ManifestValidationError> {
        DomainManifest::from_spec(self.spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAG_JSON: &str = r#"{
        "domain_id": "DAG_TEST",
        "domain_name": "DAG Dependency Test",
        "version": "1.0.0",
        "entities": ["a", "b", "c"],
        "constraints": [
            {"id": "RULE_A", "entity": "a", "operator": "GT", "value": 10,
             "description": "Rule A", "severity": "TOXIC", "weight": 1.0},
            {"id": "RULE_B", "entity": "b", "operator": "GT", "value": 5,
             "description": "Rule B depends on A", "severity": "WARNING",
             "weight": 1.0, "conditional_on": ["RULE_A"]},
            {"id": "RULE_C", "entity": "c", "operator": "GT", "value": 0,
             "description": "Rule C generic", "severity": "WARNING", "weight": 1.0}
        ]
    }"#;

    #[test]
    fn test_parse_json_manifest() {
        let m = DomainManifest::from_json_str(DAG_JSON).unwrap();
        assert_eq!(m.domain_id(), "DAG_TEST");
        assert_eq!(m.entities().len(), 3);
        assert_eq!(m.constraints()[0].severity(), SeverityClass::Critical);
        assert_eq!(m.constraints()[1].severity(), SeverityClass::Warning);
        assert_eq!(m.rule_index("RULE_C"), Some(2));
        assert!(!m.is_flat());
        assert!(!m.has_temporal_rules());
    }

    #[test]
    fn test_malformed_json() {
        let err = DomainManifest::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ManifestValidationError::Malformed { .. }));
    }

    #[test]
    fn test_fingerprint_stable_and_content_sensitive() {
        let a = DomainManifest::from_json_str(DAG_JSON).unwrap();
        let b = DomainManifest::from_json_str(DAG_JSON).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let changed = DAG_JSON.replace("\"value\": 10", "\"value\": 11");
        let c = DomainManifest::from_json_str(&changed).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_ancestors_are_transitive() {
        let m = ManifestBuilder::new("CHAIN")
            .entity("x")
            .constraint(ConstraintSpec::new("A", "x", Operator::Gt, 10))
            .constraint(ConstraintSpec::new("B", "x", Operator::Gt, 20).depends_on("A"))
            .constraint(ConstraintSpec::new("C", "x", Operator::Lt, 15).depends_on("B"))
            .build()
            .unwrap();
        assert_eq!(m.ancestors(2), vec![0, 1]);
        assert_eq!(m.ancestors(1), vec![0]);
        assert!(m.ancestors(0).is_empty());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dag.json");
        std::fs::write(&path, DAG_JSON).unwrap();
        let m = DomainManifest::from_path(&path).unwrap();
        assert_eq!(m.constraints().len(), 3);

        let missing = DomainManifest::from_path(dir.path().join("nope.json")).unwrap_err();
        assert!(missing.to_string().contains("nope.json"));
    }
}
