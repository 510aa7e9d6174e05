//! Structural manifest validation.
//!
//! Validation is purely structural: entity references, threshold shapes,
//! weights, windows and the prerequisite graph. It does not reason about
//! satisfiability; that is the formal verifier's job.

use std::collections::{HashMap, HashSet};

use crate::error::ManifestValidationError;
use crate::time::parse_window;

use super::constraint::{Constraint, SeverityClass, Threshold};
use super::document::{ConstraintSpec, ManifestSpec};

/// Upper bound for identifiers and labels.
pub const MAX_IDENT_LEN: usize = 256;

fn validate_ident(field: &str, value: &str) -> Result<(), ManifestValidationError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ManifestValidationError::MissingField {
            field: field.to_string(),
        });
    }
    if v.len() > MAX_IDENT_LEN {
        return Err(ManifestValidationError::Malformed {
            message: format!("{field} exceeds maximum length of {MAX_IDENT_LEN}"),
        });
    }
    Ok(())
}

fn validate_constraint(
    spec: &ConstraintSpec,
    entities: &HashSet<&str>,
) -> Result<Constraint, ManifestValidationError> {
    validate_ident("constraint.id", &spec.id)?;
    validate_ident("constraint.entity", &spec.entity)?;

    if !entities.contains(spec.entity.as_str()) {
        return Err(ManifestValidationError::UndeclaredEntity {
            rule_id: spec.id.clone(),
            entity: spec.entity.clone(),
        });
    }

    if !spec.weight.is_finite() || spec.weight <= 0.0 {
        return Err(ManifestValidationError::InvalidWeight {
            rule_id: spec.id.clone(),
            weight: spec.weight,
        });
    }

    let threshold = Threshold::parse(&spec.id, spec.operator, &spec.value)?;

    let window_seconds = match &spec.temporal_window {
        None => None,
        Some(window) => {
            let seconds = parse_window(window);
            if seconds <= 0.0 {
                return Err(ManifestValidationError::InvalidTemporalWindow {
                    rule_id: spec.id.clone(),
                    window: window.clone(),
                });
            }
            Some(seconds)
        }
    };

    if spec.conditional_on.iter().any(|dep| dep == &spec.id) {
        return Err(ManifestValidationError::SelfDependency {
            rule_id: spec.id.clone(),
        });
    }

    let mut conditional_on = Vec::with_capacity(spec.conditional_on.len());
    for dep in &spec.conditional_on {
        if !conditional_on.contains(dep) {
            conditional_on.push(dep.clone());
        }
    }

    Ok(Constraint {
        id: spec.id.clone(),
        entity: spec.entity.clone(),
        operator: spec.operator,
        threshold,
        description: spec.description.clone(),
        severity_label: spec.severity.clone(),
        severity: SeverityClass::from_label(&spec.severity),
        weight: spec.weight,
        conditional_on,
        temporal_window: spec.temporal_window.clone(),
        window_seconds,
        evidence_source: spec.evidence_source.clone(),
    })
}

/// Validates a manifest document, returning its constraints and a stable
/// dependency-respecting evaluation order.
pub(crate) fn validate(spec: &ManifestSpec) -> Result<(Vec<Constraint>, Vec<usize>), ManifestValidationError> {
    validate_ident("domain_id", &spec.domain_id)?;

    let mut entities = HashSet::with_capacity(spec.entities.len());
    for entity in &spec.entities {
        validate_ident("entities[]", entity)?;
        if !entities.insert(entity.as_str()) {
            return Err(ManifestValidationError::DuplicateEntity {
                entity: entity.clone(),
            });
        }
    }

    let mut constraints = Vec::with_capacity(spec.constraints.len());
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(spec.constraints.len());
    for (i, c) in spec.constraints.iter().enumerate() {
        let constraint = validate_constraint(c, &entities)?;
        if index.insert(c.id.as_str(), i).is_some() {
            return Err(ManifestValidationError::DuplicateRule {
                rule_id: c.id.clone(),
            });
        }
        constraints.push(constraint);
    }

    for c in &constraints {
        if let Some(missing) = c.conditional_on.iter().find(|dep| !index.contains_key(dep.as_str())) {
            return Err(ManifestValidationError::UnresolvedDependency {
                rule_id: c.id.clone(),
                missing: missing.clone(),
            });
        }
    }

    let order = dependency_order(&constraints, &index)?;
    Ok((constraints, order))
}

/// Stable topological order: a rule appears after all of its prerequisites,
/// ties broken by declaration order.
fn dependency_order(
    constraints: &[Constraint],
    index: &HashMap<&str, usize>,
) -> Result<Vec<usize>, ManifestValidationError> {
    let n = constraints.len();
    let mut indegree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (j, c) in constraints.iter().enumerate() {
        for dep in &c.conditional_on {
            let i = index[dep.as_str()];
            dependents[i].push(j);
            indegree[j] += 1;
        }
    }

    // Smallest ready index first keeps the order stable.
    let mut ready: std::collections::BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &j in &dependents[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.insert(j);
            }
        }
    }

    if order.len() == n {
        return Ok(order);
    }

    let stuck: Vec<usize> = (0..n).filter(|&i| indegree[i] > 0).collect();
    Err(ManifestValidationError::DependencyCycle {
        cycle: find_cycle(constraints, index, &stuck),
    })
}

/// Walks prerequisite edges from a rule left over by Kahn's algorithm until a
/// rule repeats. Every leftover rule has at least one leftover prerequisite,
/// so the walk always closes a cycle.
fn find_cycle(constraints: &[Constraint], index: &HashMap<&str, usize>, stuck: &[usize]) -> Vec<String> {
    let stuck_set: HashSet<usize> = stuck.iter().copied().collect();
    let Some(&start) = stuck.first() else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut seen_at: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;
    loop {
        let next = constraints[current]
            .conditional_on
            .iter()
            .map(|dep| index[dep.as_str()])
            .find(|i| stuck_set.contains(i));
        let Some(next) = next else {
            break;
        };
        if let Some(&pos) = seen_at.get(&next) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|&i| constraints[i].id.clone()).collect();
            cycle.push(constraints[next].id.clone());
            return cycle;
        }
        seen_at.insert(next, path.len());
        path.push(next);
        current = next;
    }
    path.iter().map(|&i| constraints[i].id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::constraint::Operator;

    fn manifest(constraints: Vec<ConstraintSpec>) -> ManifestSpec {
        ManifestSpec {
            domain_id: "TEST".to_string(),
            domain_name: "Test".to_string(),
            version: "1.0.0".to_string(),
            entities: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            constraints,
        }
    }

    #[test]
    fn test_valid_manifest_orders_prerequisites_first() {
        let spec = manifest(vec![
            ConstraintSpec::new("C", "c", Operator::Gt, 0).depends_on("B"),
            ConstraintSpec::new("A", "a", Operator::Gt, 10),
            ConstraintSpec::new("B", "b", Operator::Gt, 5).depends_on("A"),
        ]);
        let (constraints, order) = validate(&spec).unwrap();
        assert_eq!(constraints.len(), 3);
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_independent_rules_keep_declaration_order() {
        let spec = manifest(vec![
            ConstraintSpec::new("X", "a", Operator::Gt, 0),
            ConstraintSpec::new("Y", "b", Operator::Gt, 0),
            ConstraintSpec::new("Z", "c", Operator::Gt, 0),
        ]);
        let (_, order) = validate(&spec).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_undeclared_entity() {
        let spec = manifest(vec![ConstraintSpec::new("A", "zzz", Operator::Gt, 1)]);
        let err = validate(&spec).unwrap_err();
        assert_eq!(
            err,
            ManifestValidationError::UndeclaredEntity {
                rule_id: "A".to_string(),
                entity: "zzz".to_string()
            }
        );
    }

    #[test]
    fn test_unresolved_dependency() {
        let spec = manifest(vec![ConstraintSpec::new("A", "a", Operator::Gt, 1).depends_on("GHOST")]);
        let err = validate(&spec).unwrap_err();
        assert!(matches!(err, ManifestValidationError::UnresolvedDependency { ref missing, .. } if missing == "GHOST"));
    }

    #[test]
    fn test_self_dependency() {
        let spec = manifest(vec![ConstraintSpec::new("A", "a", Operator::Gt, 1).depends_on("A")]);
        assert!(matches!(
            validate(&spec).unwrap_err(),
            ManifestValidationError::SelfDependency { .. }
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let spec = manifest(vec![
            ConstraintSpec::new("A", "a", Operator::Gt, 1).depends_on("C"),
            ConstraintSpec::new("B", "b", Operator::Gt, 1).depends_on("A"),
            ConstraintSpec::new("C", "c", Operator::Gt, 1).depends_on("B"),
            ConstraintSpec::new("D", "c", Operator::Gt, 1),
        ]);
        let err = validate(&spec).unwrap_err();
        let ManifestValidationError::DependencyCycle { cycle } = err else {
            panic!("expected cycle, got {err:?}");
        };
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);
        assert!(!cycle.contains(&"D".to_string()));
    }

    #[test]
    fn test_duplicate_rule_and_entity() {
        let spec = manifest(vec![
            ConstraintSpec::new("A", "a", Operator::Gt, 1),
            ConstraintSpec::new("A", "b", Operator::Gt, 1),
        ]);
        assert!(matches!(validate(&spec).unwrap_err(), ManifestValidationError::DuplicateRule { .. }));

        let mut spec = manifest(vec![]);
        spec.entities.push("a".to_string());
        assert!(matches!(validate(&spec).unwrap_err(), ManifestValidationError::DuplicateEntity { .. }));
    }

    #[test]
    fn test_bad_weight_and_window() {
        let spec = manifest(vec![ConstraintSpec::new("A", "a", Operator::Gt, 1).weight(0.0)]);
        assert!(matches!(validate(&spec).unwrap_err(), ManifestValidationError::InvalidWeight { .. }));

        let spec = manifest(vec![ConstraintSpec::new("A", "a", Operator::Gt, 1).window("3 fortnights")]);
        assert!(matches!(
            validate(&spec).unwrap_err(),
            ManifestValidationError::InvalidTemporalWindow { .. }
        ));
    }

    #[test]
    fn test_duplicate_prerequisites_collapse() {
        let spec = manifest(vec![
            ConstraintSpec::new("A", "a", Operator::Gt, 1),
            ConstraintSpec::new("B", "b", Operator::Gt, 1).depends_on("A").depends_on("A"),
        ]);
        let (constraints, _) = validate(&spec).unwrap();
        assert_eq!(constraints[1].conditional_on(), ["A".to_string()]);
    }

    #[test]
    fn test_empty_domain_id() {
        let mut spec = manifest(vec![]);
        spec.domain_id = "  ".to_string();
        assert!(matches!(validate(&spec).unwrap_err(), ManifestValidationError::MissingField { .. }));
    }
}
