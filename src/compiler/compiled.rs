//! The dense, index-addressed form of a manifest.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{GateError, GateResult};
use crate::manifest::{CategoryTable, DomainManifest, Operator, Threshold};
use crate::value::{next_down, next_up, Value};

/// How a rule's live value is tested beyond its bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestKind {
    /// `low <= value <= high` on the numeric view.
    Interval,
    /// Numeric view in bounds, or non-empty text.
    Required,
    /// Text equal to the category with this code.
    CategoryEq(u32),
    /// Membership in `members[set]`, inverted for `NIN`.
    Member {
        /// Index into the compiled member sets.
        set: usize,
        /// True for `NIN`.
        negated: bool,
    },
}

/// Compiled `IN`/`NIN` set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberSet {
    /// Numeric members; booleans stored as `0.0`/`1.0`.
    pub numbers: Vec<f64>,
    /// Category codes of text members.
    pub codes: Vec<u32>,
}

impl MemberSet {
    /// Membership under the same loose equality the interpreted path uses.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn contains(&self, value: &Value, categories: &CategoryTable) -> bool {
        match value {
            Value::Text(label) => categories.code(label).is_some_and(|c| self.codes.contains(&c)),
            other => other.as_number().is_some_and(|x| self.numbers.iter().any(|&n| n == x)),
        }
    }
}

/// Per-rule presentation data carried alongside the numeric arrays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstraintMeta {
    /// Rule id.
    pub id: String,
    /// Governed entity.
    pub entity: String,
    /// Free-text description.
    pub description: String,
    /// Severity label as authored.
    pub severity_label: String,
    /// Citation.
    pub evidence: Option<String>,
    /// Operator.
    pub operator: Operator,
    /// Threshold as authored.
    #[serde(serialize_with = "serialize_threshold")]
    pub threshold: Threshold,
    /// Temporal window as authored.
    pub temporal_window: Option<String>,
}

fn serialize_threshold<S: serde::Serializer>(threshold: &Threshold, s: S) -> Result<S::Ok, S::Error> {
    threshold.to_json().serialize(s)
}

/// Immutable compiled manifest, safe to share across threads.
///
/// Arrays are parallel and indexed by constraint position in the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledManifest {
    domain_id: String,
    fingerprint: String,
    verified: bool,
    entity_index: BTreeMap<String, usize>,
    entity_names: Vec<String>,
    entity_of: Vec<usize>,
    bounds: Vec<[f64; 2]>,
    severity_class: Vec<u8>,
    weight: Vec<f64>,
    dependency_matrix: Vec<bool>,
    order: Vec<usize>,
    tests: Vec<TestKind>,
    members: Vec<MemberSet>,
    categories: CategoryTable,
    metadata: Vec<ConstraintMeta>,
}

impl CompiledManifest {
    /// Lowers a validated manifest. Verification is the compiler's concern;
    /// this only translates.
    ///
    /// # Errors
    ///
    /// Returns a compile error when a threshold's type does not fit its operator.
    pub(crate) fn build(manifest: &DomainManifest, verified: bool) -> GateResult<Self> {
        let n = manifest.constraints().len();
        let entity_names: Vec<String> = manifest.entities().to_vec();
        let entity_index: BTreeMap<String, usize> =
            entity_names.iter().enumerate().map(|(i, e)| (e.clone(), i)).collect();
        let categories = CategoryTable::from_manifest(manifest);

        let mut compiled = Self {
            domain_id: manifest.domain_id().to_string(),
            fingerprint: manifest.fingerprint().to_string(),
            verified,
            entity_index,
            entity_names,
            entity_of: Vec::with_capacity(n),
            bounds: Vec::with_capacity(n),
            severity_class: Vec::with_capacity(n),
            weight: Vec::with_capacity(n),
            dependency_matrix: vec![false; n * n],
            order: manifest.dependency_order().to_vec(),
            tests: Vec::with_capacity(n),
            members: Vec::new(),
            categories,
            metadata: Vec::with_capacity(n),
        };

        for (j, c) in manifest.constraints().iter().enumerate() {
            let entity = compiled.entity_index.get(c.entity()).copied().ok_or_else(|| {
                GateError::internal(format!("constraint {} references unindexed entity {}", c.id(), c.entity()))
            })?;

            let (test, bounds) = match c.operator() {
                Operator::Gt => (TestKind::Interval, [next_up(c.ordering_threshold()?), f64::INFINITY]),
                Operator::Lt => (TestKind::Interval, [f64::NEG_INFINITY, next_down(c.ordering_threshold()?)]),
                Operator::Gte => (TestKind::Interval, [c.ordering_threshold()?, f64::INFINITY]),
                Operator::Lte => (TestKind::Interval, [f64::NEG_INFINITY, c.ordering_threshold()?]),
                Operator::Range => {
                    let (lo, hi) = c.range_bounds()?;
                    (TestKind::Interval, [lo, hi])
                }
                Operator::Eq => match c.equality_operand()? {
                    Value::Text(label) => {
                        let code = compiled.categories.code(label).ok_or_else(|| {
                            GateError::internal(format!("category '{label}' missing from table"))
                        })?;
                        (TestKind::CategoryEq(code), [f64::NEG_INFINITY, f64::INFINITY])
                    }
                    other => {
                        let x = other.as_number().unwrap_or(f64::NAN);
                        (TestKind::Interval, [x, x])
                    }
                },
                Operator::In | Operator::Nin => {
                    let mut set = MemberSet::default();
                    for member in c.set_members()? {
                        match member {
                            Value::Text(label) => set.codes.extend(compiled.categories.code(label)),
                            other => set.numbers.extend(other.as_number()),
                        }
                    }
                    compiled.members.push(set);
                    let test = TestKind::Member {
                        set: compiled.members.len() - 1,
                        negated: c.operator() == Operator::Nin,
                    };
                    (test, [f64::NEG_INFINITY, f64::INFINITY])
                }
                Operator::Required => (TestKind::Required, [next_up(0.0), f64::INFINITY]),
            };

            for dep in c.conditional_on() {
                if let Some(i) = manifest.rule_index(dep) {
                    compiled.dependency_matrix[i * n + j] = true;
                }
            }

            compiled.entity_of.push(entity);
            compiled.tests.push(test);
            compiled.bounds.push(bounds);
            compiled.severity_class.push(c.severity().code());
            compiled.weight.push(c.weight());
            compiled.metadata.push(ConstraintMeta {
                id: c.id().to_string(),
                entity: c.entity().to_string(),
                description: c.description().to_string(),
                severity_label: c.severity_label().to_string(),
                evidence: c.evidence_source().map(str::to_string),
                operator: c.operator(),
                threshold: c.threshold().clone(),
                temporal_window: c.temporal_window().map(str::to_string),
            });
        }

        Ok(compiled)
    }

    /// Domain id of the source manifest.
    pub fn domain_id(&self) -> &str {
        &self.domain_id
    }

    /// Fingerprint of the manifest this was compiled from.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// True if compiled after a successful consistency proof.
    pub const fn is_verified(&self) -> bool {
        self.verified
    }

    /// Number of constraints.
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    /// True if the manifest has no constraints.
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Entity name → dense position, in declaration order.
    pub const fn entity_index(&self) -> &BTreeMap<String, usize> {
        &self.entity_index
    }

    /// Entity names by dense position.
    pub fn entity_names(&self) -> &[String] {
        &self.entity_names
    }

    /// Entity position of each constraint.
    pub fn entity_of(&self) -> &[usize] {
        &self.entity_of
    }

    /// `[low, high]` per constraint.
    pub fn bounds(&self) -> &[[f64; 2]] {
        &self.bounds
    }

    /// `1` warning, `2` critical, per constraint.
    pub fn severity_class(&self) -> &[u8] {
        &self.severity_class
    }

    /// Health-score weight per constraint.
    pub fn weights(&self) -> &[f64] {
        &self.weight
    }

    /// Row-major `N×N`; cell `[i][j]` is true iff constraint `j` directly
    /// depends on constraint `i`.
    pub fn dependency_matrix(&self) -> &[bool] {
        &self.dependency_matrix
    }

    /// Reads one dependency cell.
    #[must_use]
    pub fn depends_on(&self, dependent: usize, prerequisite: usize) -> bool {
        let n = self.len();
        dependent < n && prerequisite < n && self.dependency_matrix[prerequisite * n + dependent]
    }

    /// Prerequisite-first constraint order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// How each constraint decides pass or fail.
    pub fn tests(&self) -> &[TestKind] {
        &self.tests
    }

    /// Member sets referenced by [`TestKind::Member`].
    pub fn members(&self) -> &[MemberSet] {
        &self.members
    }

    /// Text label codes.
    pub const fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    /// Reporting fields per constraint.
    pub fn metadata(&self) -> &[ConstraintMeta] {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ConstraintSpec, ManifestBuilder, SeverityClass};
    use serde_json::json;

    fn dag() -> DomainManifest {
        ManifestBuilder::new("DAG_TEST")
            .entities(["a", "b", "c"])
            .constraint(ConstraintSpec::new("RULE_A", "a", Operator::Gt, 10).severity("TOXIC"))
            .constraint(ConstraintSpec::new("RULE_B", "b", Operator::Gt, 5).severity("WARNING").depends_on("RULE_A"))
            .constraint(ConstraintSpec::new("RULE_C", "c", Operator::Gt, 0).severity("WARNING"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_dependency_matrix_orientation() {
        let compiled = CompiledManifest::build(&dag(), false).unwrap();
        assert!(compiled.depends_on(1, 0));
        assert!(!compiled.depends_on(0, 1));
        assert_eq!(compiled.dependency_matrix().iter().filter(|&&c| c).count(), 1);
        assert_eq!(compiled.severity_class(), [SeverityClass::Critical.code(), 1, 1]);
    }

    #[test]
    fn test_exclusive_bounds_are_exact() {
        let m = ManifestBuilder::new("B")
            .entity("x")
            .constraint(ConstraintSpec::new("GT", "x", Operator::Gt, 10))
            .constraint(ConstraintSpec::new("LT", "x", Operator::Lt, 10))
            .constraint(ConstraintSpec::new("GTE", "x", Operator::Gte, 10))
            .constraint(ConstraintSpec::new("EQ", "x", Operator::Eq, 3))
            .constraint(ConstraintSpec::new("R", "x", Operator::Range, json!([1, 2])))
            .constraint(ConstraintSpec::new("REQ", "x", Operator::Required, json!(null)))
            .build()
            .unwrap();
        let c = CompiledManifest::build(&m, false).unwrap();
        let b = c.bounds();
        assert!(b[0][0] > 10.0 && b[0][0] < 10.000_001);
        assert!(b[1][1] < 10.0 && b[1][1] > 9.999_999);
        assert_eq!(b[2], [10.0, f64::INFINITY]);
        assert_eq!(b[3], [3.0, 3.0]);
        assert_eq!(b[4], [1.0, 2.0]);
        assert!(b[5][0] > 0.0);
        assert_eq!(c.tests()[5], TestKind::Required);
    }

    #[test]
    fn test_categorical_tests() {
        let m = ManifestBuilder::new("CAT")
            .entity("tier")
            .constraint(ConstraintSpec::new("EQ", "tier", Operator::Eq, "gold"))
            .constraint(ConstraintSpec::new("NIN", "tier", Operator::Nin, json!(["mars", 4, true])))
            .build()
            .unwrap();
        let c = CompiledManifest::build(&m, false).unwrap();
        assert_eq!(c.tests()[0], TestKind::CategoryEq(1));
        assert_eq!(c.tests()[1], TestKind::Member { set: 0, negated: true });
        let set = &c.members()[0];
        assert_eq!(set.codes, vec![2]);
        assert_eq!(set.numbers, vec![4.0, 1.0]);
        assert!(set.contains(&Value::from("mars"), c.categories()));
        assert!(set.contains(&Value::Bool(true), c.categories()));
        assert!(!set.contains(&Value::from("venus"), c.categories()));
    }

    #[test]
    fn test_text_threshold_on_ordering_rejected() {
        let m = ManifestBuilder::new("BAD")
            .entity("x")
            .constraint(ConstraintSpec::new("R", "x", Operator::Lte, "high"))
            .build()
            .unwrap();
        let err = CompiledManifest::build(&m, false).unwrap_err();
        assert!(err.is_compile());
        assert!(err.to_string().contains("R"));
    }
}
