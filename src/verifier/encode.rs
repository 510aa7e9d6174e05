//! Manifest → formula encoding.
//!
//! A signal is either numeric (booleans read as 0 and 1) or text, so each
//! declared entity gets three solver variables: a selector that is 1 when
//! the value is text, a real-valued number, and a category code. Numeric
//! tests constrain the number under `selector == 0`; text equality
//! constrains the code under `selector == 1`. Every rule on the entity
//! reuses the same three variables.

use std::collections::{BTreeMap, HashMap};

use super::formula::Formula;
use super::property::{Comparison, SafetyProperty};
use super::solver::Sort;
use crate::error::{GateResult, ManifestValidationError, TypeMismatchError};
use crate::manifest::{CategoryTable, Constraint, DomainManifest, Operator};
use crate::value::Value;

const SORTS: [Sort; 3] = [Sort::Bool, Sort::Real, Sort::Category];

#[derive(Debug, Clone, Copy)]
struct EntityVars {
    is_text: usize,
    num: usize,
    code: usize,
    /// Every threshold on the entity is a boolean.
    bool_only: bool,
}

impl EntityVars {
    fn text(&self, mut parts: Vec<Formula>) -> Formula {
        parts.insert(0, Formula::atom(self.is_text, Comparison::Eq, 1.0));
        Formula::and(parts)
    }

    fn number(&self, mut parts: Vec<Formula>) -> Formula {
        parts.insert(0, Formula::atom(self.is_text, Comparison::Eq, 0.0));
        Formula::and(parts)
    }
}

pub(crate) struct Encoding<'m> {
    manifest: &'m DomainManifest,
    categories: CategoryTable,
    sorts: Vec<Sort>,
    vars: Vec<EntityVars>,
    var_of: HashMap<&'m str, usize>,
    rules: Vec<Formula>,
}

impl<'m> Encoding<'m> {
    /// Encodes every rule of the manifest.
    pub fn new(manifest: &'m DomainManifest) -> Result<Self, TypeMismatchError> {
        let var_of: HashMap<&str, usize> = manifest
            .entities()
            .iter()
            .enumerate()
            .map(|(i, e)| (e.as_str(), i))
            .collect();

        let mut bool_only = vec![None; manifest.entities().len()];
        for c in manifest.constraints() {
            if let Some(&i) = var_of.get(c.entity()) {
                for v in c.threshold().values() {
                    let all = bool_only[i].unwrap_or(true) && v.is_bool();
                    bool_only[i] = Some(all);
                }
            }
        }
        let vars = bool_only
            .into_iter()
            .enumerate()
            .map(|(i, flag)| EntityVars {
                is_text: 3 * i,
                num: 3 * i + 1,
                code: 3 * i + 2,
                bool_only: flag.unwrap_or(false),
            })
            .collect();

        let mut encoding = Self {
            manifest,
            categories: CategoryTable::from_manifest(manifest),
            sorts: SORTS.repeat(manifest.entities().len()),
            vars,
            var_of,
            rules: Vec::with_capacity(manifest.constraints().len()),
        };
        for c in manifest.constraints() {
            let formula = encoding.encode_rule(c)?;
            encoding.rules.push(formula);
        }
        Ok(encoding)
    }

    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    pub fn rule(&self, idx: usize) -> &Formula {
        &self.rules[idx]
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// `AND(direct prerequisites) ⇒ rule`, or the bare rule when it has none.
    pub fn guarded(&self, idx: usize) -> Formula {
        let prerequisites: Vec<Formula> = self.manifest.constraints()[idx]
            .conditional_on()
            .iter()
            .filter_map(|id| self.manifest.rule_index(id))
            .map(|i| self.rules[i].clone())
            .collect();
        Formula::implies(Formula::and(prerequisites), self.rules[idx].clone())
    }

    fn vars_for(&self, entity: &str) -> Option<EntityVars> {
        self.var_of.get(entity).map(|&i| self.vars[i])
    }

    fn encode_rule(&self, c: &Constraint) -> Result<Formula, TypeMismatchError> {
        let Some(v) = self.vars_for(c.entity()) else {
            return Ok(Formula::False);
        };

        Ok(match c.operator() {
            Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte => {
                let t = c.ordering_threshold()?;
                let cmp = match c.operator() {
                    Operator::Gt => Comparison::Gt,
                    Operator::Lt => Comparison::Lt,
                    Operator::Gte => Comparison::Ge,
                    _ => Comparison::Le,
                };
                v.number(vec![Formula::atom(v.num, cmp, t)])
            }
            Operator::Range => {
                let (lo, hi) = c.range_bounds()?;
                v.number(vec![
                    Formula::atom(v.num, Comparison::Ge, lo),
                    Formula::atom(v.num, Comparison::Le, hi),
                ])
            }
            Operator::Eq => self.equals(v, c.equality_operand()?),
            Operator::In => Formula::or(c.set_members()?.iter().map(|m| self.equals(v, m)).collect()),
            Operator::Nin => {
                let members = c.set_members()?;
                let codes = members
                    .iter()
                    .filter_map(|m| m.as_text().and_then(|label| self.categories.code(label)))
                    .map(|code| Formula::atom(v.code, Comparison::Ne, f64::from(code)))
                    .collect();
                let numbers = members
                    .iter()
                    .filter_map(Value::as_number)
                    .map(|n| Formula::atom(v.num, Comparison::Ne, n))
                    .collect();
                Formula::or(vec![v.text(codes), v.number(numbers)])
            }
            Operator::Required => {
                let non_empty = self
                    .categories
                    .code("")
                    .map(|empty| Formula::atom(v.code, Comparison::Ne, f64::from(empty)));
                Formula::or(vec![
                    v.number(vec![Formula::atom(v.num, Comparison::Gt, 0.0)]),
                    v.text(non_empty.into_iter().collect()),
                ])
            }
        })
    }

    fn equals(&self, v: EntityVars, value: &Value) -> Formula {
        match value {
            Value::Text(label) => self.categories.code(label).map_or(Formula::False, |code| {
                v.text(vec![Formula::atom(v.code, Comparison::Eq, f64::from(code))])
            }),
            other => other
                .as_number()
                .map_or(Formula::False, |n| v.number(vec![Formula::atom(v.num, Comparison::Eq, n)])),
        }
    }

    /// Encodes a safety property over the same variables.
    ///
    /// Properties speak about numeric values; a text value satisfies any
    /// property vacuously, so counterexamples are always numeric.
    ///
    /// # Errors
    ///
    /// Fails if the property names an undeclared entity.
    pub fn property(&self, property: &SafetyProperty) -> GateResult<Formula> {
        let Some(v) = self.vars_for(&property.entity) else {
            return Err(ManifestValidationError::UndeclaredEntity {
                rule_id: property.to_string(),
                entity: property.entity.clone(),
            }
            .into());
        };
        Ok(Formula::implies(
            Formula::atom(v.is_text, Comparison::Eq, 0.0),
            Formula::atom(v.num, property.comparison, property.bound),
        ))
    }

    fn text_label(&self, code: u32) -> Value {
        if let Some(label) = self.categories.label(code) {
            return Value::from(label);
        }
        let mut label = format!("unlisted-{code}");
        while self.categories.code(&label).is_some() {
            label.push('~');
        }
        Value::Text(label)
    }

    /// Converts a solver model into host values keyed by entity.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn witness(&self, model: &[f64]) -> BTreeMap<String, Value> {
        self.manifest
            .entities()
            .iter()
            .zip(&self.vars)
            .map(|(entity, v)| {
                let x = model[v.num];
                let value = if model[v.is_text] != 0.0 {
                    self.text_label(model[v.code] as u32)
                } else if v.bool_only && (x == 0.0 || x == 1.0) {
                    Value::Bool(x == 1.0)
                } else {
                    Value::Number(x)
                };
                (entity.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ConstraintSpec, ManifestBuilder};
    use serde_json::json;

    #[test]
    fn test_three_variables_per_entity() {
        let m = ManifestBuilder::new("SORTS")
            .entities(["age", "tier"])
            .constraint(ConstraintSpec::new("A", "age", Operator::Gte, 18))
            .constraint(ConstraintSpec::new("T", "tier", Operator::In, json!(["gold", "silver"])))
            .build()
            .unwrap();
        let enc = Encoding::new(&m).unwrap();
        assert_eq!(
            enc.sorts(),
            [Sort::Bool, Sort::Real, Sort::Category, Sort::Bool, Sort::Real, Sort::Category]
        );
        let age = Formula::and(vec![
            Formula::atom(0, Comparison::Eq, 0.0),
            Formula::atom(1, Comparison::Ge, 18.0),
        ]);
        assert_eq!(enc.rule(0), &age);
    }

    #[test]
    fn test_text_threshold_on_ordering_is_type_mismatch() {
        let m = ManifestBuilder::new("BAD")
            .entity("age")
            .constraint(ConstraintSpec::new("A", "age", Operator::Gt, "eighteen"))
            .build()
            .unwrap();
        let err = Encoding::new(&m).err().unwrap();
        assert_eq!(err.rule_id, "A");
    }

    #[test]
    fn test_numeric_rule_holds_only_for_numbers() {
        let m = ManifestBuilder::new("MIXED")
            .entity("score")
            .constraint(ConstraintSpec::new("NA", "score", Operator::Nin, json!(["N/A"])))
            .constraint(ConstraintSpec::new("FLOOR", "score", Operator::Gte, 300))
            .build()
            .unwrap();
        let enc = Encoding::new(&m).unwrap();
        // [is_text, num, code]
        assert!(enc.rule(0).eval(&[0.0, 700.0, 1.0]));
        assert!(enc.rule(1).eval(&[0.0, 700.0, 1.0]));
        assert!(!enc.rule(0).eval(&[1.0, 700.0, 1.0]));
        assert!(!enc.rule(1).eval(&[1.0, 700.0, 2.0]));
        assert!(enc.rule(0).eval(&[1.0, 0.0, 2.0]));
    }

    #[test]
    fn test_required_excludes_empty_label() {
        let m = ManifestBuilder::new("EMPTY")
            .entity("tier")
            .constraint(ConstraintSpec::new("BLANK", "tier", Operator::Eq, ""))
            .constraint(ConstraintSpec::new("SET", "tier", Operator::Required, json!(null)))
            .build()
            .unwrap();
        let enc = Encoding::new(&m).unwrap();
        let empty = f64::from(CategoryTable::from_manifest(&m).code("").unwrap());
        assert!(!enc.rule(1).eval(&[1.0, 0.0, empty]));
        assert!(enc.rule(1).eval(&[1.0, 0.0, empty + 1.0]));
        assert!(enc.rule(1).eval(&[0.0, 2.0, empty]));
        assert!(!enc.rule(1).eval(&[0.0, 0.0, empty]));
    }

    #[test]
    fn test_witness_follows_selector() {
        let m = ManifestBuilder::new("W")
            .entities(["tier", "verified", "count"])
            .constraint(ConstraintSpec::new("T", "tier", Operator::Eq, "gold"))
            .constraint(ConstraintSpec::new("V", "verified", Operator::Eq, true))
            .constraint(ConstraintSpec::new("C", "count", Operator::Required, json!(null)))
            .build()
            .unwrap();
        let enc = Encoding::new(&m).unwrap();
        let w = enc.witness(&[1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 3.0, 1.0]);
        assert_eq!(w["tier"], Value::from("gold"));
        assert_eq!(w["verified"], Value::Bool(true));
        assert_eq!(w["count"], Value::Number(3.0));

        let w = enc.witness(&[1.0, 0.0, 7.0, 0.0, 2.0, 1.0, 1.0, 0.0, 1.0]);
        assert_eq!(w["tier"], Value::from("unlisted-7"));
        assert_eq!(w["verified"], Value::Number(2.0));
        assert_eq!(w["count"], Value::from("gold"));
    }

    #[test]
    fn test_property_on_unknown_entity() {
        let m = ManifestBuilder::new("P").entity("x").build().unwrap();
        let enc = Encoding::new(&m).unwrap();
        let err = enc.property(&"y > 1".parse().unwrap()).unwrap_err();
        assert!(err.is_validation());
    }
}
