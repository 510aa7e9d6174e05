//! Quantifier-free formulas over unary comparison atoms.

use super::property::Comparison;

/// `var cmp rhs`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Atom {
    pub var: usize,
    pub cmp: Comparison,
    pub rhs: f64,
}

impl Atom {
    fn holds(&self, model: &[f64]) -> bool {
        model.get(self.var).is_some_and(|&x| self.cmp.holds(x, self.rhs))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Formula {
    True,
    False,
    Atom(Atom),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Implies(Box<Formula>, Box<Formula>),
}

impl Formula {
    pub fn atom(var: usize, cmp: Comparison, rhs: f64) -> Self {
        Self::Atom(Atom { var, cmp, rhs })
    }

    /// Conjunction, flattening trivial cases.
    pub fn and(parts: Vec<Self>) -> Self {
        if parts.iter().any(|p| *p == Self::False) {
            return Self::False;
        }
        let mut parts: Vec<Self> = parts.into_iter().filter(|p| *p != Self::True).collect();
        match parts.len() {
            0 => Self::True,
            1 => parts.remove(0),
            _ => Self::And(parts),
        }
    }

    /// Disjunction, flattening trivial cases.
    pub fn or(parts: Vec<Self>) -> Self {
        if parts.iter().any(|p| *p == Self::True) {
            return Self::True;
        }
        let mut parts: Vec<Self> = parts.into_iter().filter(|p| *p != Self::False).collect();
        match parts.len() {
            0 => Self::False,
            1 => parts.remove(0),
            _ => Self::Or(parts),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    pub fn implies(premise: Self, conclusion: Self) -> Self {
        match premise {
            Self::True => conclusion,
            Self::False => Self::True,
            premise => Self::Implies(Box::new(premise), Box::new(conclusion)),
        }
    }

    /// Negation normal form: only atoms, `And` and `Or` remain.
    pub fn nnf(&self) -> Self {
        self.nnf_signed(true)
    }

    fn nnf_signed(&self, positive: bool) -> Self {
        match (self, positive) {
            (Self::True, true) | (Self::False, false) => Self::True,
            (Self::True, false) | (Self::False, true) => Self::False,
            (Self::Atom(a), true) => Self::Atom(*a),
            (Self::Atom(a), false) => Self::atom(a.var, a.cmp.negate(), a.rhs),
            (Self::Not(inner), _) => inner.nnf_signed(!positive),
            (Self::And(parts), true) | (Self::Or(parts), false) => {
                Self::and(parts.iter().map(|p| p.nnf_signed(positive)).collect())
            }
            (Self::Or(parts), true) | (Self::And(parts), false) => {
                Self::or(parts.iter().map(|p| p.nnf_signed(positive)).collect())
            }
            (Self::Implies(a, b), true) => Self::or(vec![a.nnf_signed(false), b.nnf_signed(true)]),
            (Self::Implies(a, b), false) => Self::and(vec![a.nnf_signed(true), b.nnf_signed(false)]),
        }
    }

    /// Evaluates the formula under a total assignment.
    pub fn eval(&self, model: &[f64]) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Atom(a) => a.holds(model),
            Self::Not(inner) => !inner.eval(model),
            Self::And(parts) => parts.iter().all(|p| p.eval(model)),
            Self::Or(parts) => parts.iter().any(|p| p.eval(model)),
            Self::Implies(a, b) => !a.eval(model) || b.eval(model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simplification() {
        let x = Formula::atom(0, Comparison::Gt, 1.0);
        assert_eq!(Formula::and(vec![]), Formula::True);
        assert_eq!(Formula::or(vec![]), Formula::False);
        assert_eq!(Formula::and(vec![Formula::True, x.clone()]), x);
        assert_eq!(Formula::or(vec![x.clone(), Formula::True]), Formula::True);
        assert_eq!(Formula::implies(Formula::True, x.clone()), x);
    }

    #[test]
    fn test_nnf_pushes_negation_into_atoms() {
        let f = Formula::implies(
            Formula::atom(0, Comparison::Gt, 18.0),
            Formula::atom(0, Comparison::Lt, 10.0),
        )
        .negate();
        let n = f.nnf();
        assert_eq!(
            n,
            Formula::And(vec![
                Formula::atom(0, Comparison::Gt, 18.0),
                Formula::atom(0, Comparison::Ge, 10.0),
            ])
        );
        for x in [5.0, 15.0, 20.0] {
            assert_eq!(f.eval(&[x]), n.eval(&[x]));
        }
    }
}
