//! Bounded decision procedure for formulas over unary comparison atoms.
//!
//! Every atom compares one variable against a constant, so a conjunction of
//! atoms describes, per variable, an interval with a finite set of excluded
//! points. The search propagates atoms and single-choice disjunctions into
//! those domains and branches on the remaining disjunctions. Each call runs
//! against a wall-clock deadline and a decision budget; exhausting either
//! yields [`SatResult::Unknown`], never a verdict.

use std::time::{Duration, Instant};

use super::formula::Formula;
use super::property::Comparison;
use crate::value::{next_down, next_up};

/// Variable sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sort {
    /// Unbounded real.
    Real,
    /// Integer in `{0, 1}`.
    Bool,
    /// Integer code `>= 1` of a categorical label.
    Category,
}

/// Per-call resource limits.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Budget {
    pub timeout: Duration,
    pub max_decisions: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SatResult {
    /// A satisfying assignment, one value per variable.
    Sat(Vec<f64>),
    Unsat,
    Unknown(String),
}

#[derive(Debug, Clone)]
struct Domain {
    lo: f64,
    lo_strict: bool,
    hi: f64,
    hi_strict: bool,
    excluded: Vec<f64>,
    integral: bool,
}

impl Domain {
    fn for_sort(sort: Sort) -> Self {
        let (lo, hi, integral) = match sort {
            Sort::Real => (f64::NEG_INFINITY, f64::INFINITY, false),
            Sort::Bool => (0.0, 1.0, true),
            Sort::Category => (1.0, f64::INFINITY, true),
        };
        Self {
            lo,
            lo_strict: false,
            hi,
            hi_strict: false,
            excluded: Vec::new(),
            integral,
        }
    }

    fn raise_lo(&mut self, c: f64, strict: bool) {
        if c > self.lo || (c == self.lo && strict && !self.lo_strict) {
            self.lo = c;
            self.lo_strict = strict;
        }
    }

    fn lower_hi(&mut self, c: f64, strict: bool) {
        if c < self.hi || (c == self.hi && strict && !self.hi_strict) {
            self.hi = c;
            self.hi_strict = strict;
        }
    }

    /// Narrows the domain; returns false when it becomes empty.
    fn restrict(&mut self, cmp: Comparison, c: f64) -> bool {
        match cmp {
            Comparison::Gt => self.raise_lo(c, true),
            Comparison::Ge => self.raise_lo(c, false),
            Comparison::Lt => self.lower_hi(c, true),
            Comparison::Le => self.lower_hi(c, false),
            Comparison::Eq => {
                self.raise_lo(c, false);
                self.lower_hi(c, false);
            }
            Comparison::Ne => {
                if !self.excluded.contains(&c) {
                    self.excluded.push(c);
                }
            }
        }
        if self.integral {
            self.normalize_integral();
        }
        !self.is_empty()
    }

    fn normalize_integral(&mut self) {
        if self.lo.is_finite() {
            self.lo = if self.lo_strict { self.lo.floor() + 1.0 } else { self.lo.ceil() };
            self.lo_strict = false;
        }
        if self.hi.is_finite() {
            self.hi = if self.hi_strict { self.hi.ceil() - 1.0 } else { self.hi.floor() };
            self.hi_strict = false;
        }
    }

    fn admits(&self, x: f64) -> bool {
        let above = if self.lo_strict { x > self.lo } else { x >= self.lo };
        let below = if self.hi_strict { x < self.hi } else { x <= self.hi };
        above && below && !self.excluded.contains(&x) && (!self.integral || x.fract() == 0.0)
    }

    #[allow(clippy::cast_precision_loss)]
    fn is_empty(&self) -> bool {
        if self.lo > self.hi {
            return true;
        }
        if self.lo == self.hi {
            return !self.admits(self.lo);
        }
        if self.integral && self.lo.is_finite() && self.hi.is_finite() {
            let span = self.hi - self.lo + 1.0;
            let blocked = self
                .excluded
                .iter()
                .filter(|x| x.fract() == 0.0 && **x >= self.lo && **x <= self.hi)
                .count();
            return span <= blocked as f64;
        }
        false
    }

    /// Picks a concrete member, preferring round, boundary-near values.
    fn pick(&self) -> f64 {
        let attempts = self.excluded.len() + 2;
        if self.lo == self.hi {
            return self.lo;
        }
        if self.integral {
            let (mut x, step) = if self.lo.is_finite() {
                (self.lo, 1.0)
            } else if self.hi.is_finite() {
                (self.hi.min(0.0), -1.0)
            } else {
                (0.0, 1.0)
            };
            for _ in 0..attempts {
                if self.admits(x) {
                    return x;
                }
                x += step;
            }
            return x;
        }

        let mut candidates = Vec::with_capacity(attempts + 2);
        match (self.lo.is_finite(), self.hi.is_finite()) {
            (true, true) => {
                if !self.lo_strict {
                    candidates.push(self.lo);
                }
                if !self.hi_strict {
                    candidates.push(self.hi);
                }
                let mut mid = self.lo + (self.hi - self.lo) / 2.0;
                for _ in 0..attempts {
                    candidates.push(mid);
                    mid = self.lo + (mid - self.lo) / 2.0;
                }
            }
            (true, false) => {
                let mut x = if self.lo_strict { step_up(self.lo) } else { self.lo };
                for _ in 0..attempts {
                    candidates.push(x);
                    x = step_up(x);
                }
            }
            (false, true) => {
                let mut x = if self.hi_strict { step_down(self.hi) } else { self.hi };
                for _ in 0..attempts {
                    candidates.push(x);
                    x = step_down(x);
                }
            }
            (false, false) => {
                let mut x = 0.0;
                for _ in 0..attempts {
                    candidates.push(x);
                    x += 1.0;
                }
            }
        }
        let fallback = candidates.last().copied().unwrap_or(0.0);
        candidates.into_iter().find(|&x| self.admits(x)).unwrap_or(fallback)
    }
}

fn step_up(x: f64) -> f64 {
    let y = x + 1.0;
    if y > x {
        y
    } else {
        next_up(x)
    }
}

fn step_down(x: f64) -> f64 {
    let y = x - 1.0;
    if y < x {
        y
    } else {
        next_down(x)
    }
}

enum Goal<'f> {
    One(&'f Formula),
    AnyOf(Vec<&'f Formula>),
}

struct Search {
    decisions: u64,
    budget: Budget,
    deadline: Instant,
}

impl Search {
    fn tick(&mut self) -> Result<(), String> {
        self.decisions += 1;
        if self.decisions > self.budget.max_decisions {
            return Err(format!("decision budget of {} exhausted", self.budget.max_decisions));
        }
        if Instant::now() >= self.deadline {
            return Err(format!("solver timeout after {}ms", self.budget.timeout.as_millis()));
        }
        Ok(())
    }

    fn viable(formula: &Formula, domains: &[Domain]) -> bool {
        match formula {
            Formula::False => false,
            Formula::Atom(a) => {
                let mut d = domains[a.var].clone();
                d.restrict(a.cmp, a.rhs)
            }
            _ => true,
        }
    }

    fn run<'f>(&mut self, mut goals: Vec<Goal<'f>>, mut domains: Vec<Domain>) -> Result<Option<Vec<Domain>>, String> {
        self.tick()?;

        let mut open: Vec<Vec<&'f Formula>> = Vec::new();
        loop {
            while let Some(goal) = goals.pop() {
                match goal {
                    Goal::AnyOf(parts) => open.push(parts),
                    Goal::One(Formula::True) => {}
                    Goal::One(Formula::False) => return Ok(None),
                    Goal::One(Formula::Atom(a)) => {
                        if !domains[a.var].restrict(a.cmp, a.rhs) {
                            return Ok(None);
                        }
                    }
                    Goal::One(Formula::And(parts)) => goals.extend(parts.iter().map(Goal::One)),
                    Goal::One(Formula::Or(parts)) => open.push(parts.iter().collect()),
                    Goal::One(Formula::Not(_) | Formula::Implies(..)) => {
                        return Err("formula is not in negation normal form".to_string());
                    }
                }
            }

            // Drop disjuncts the current domains already refute.
            let mut forced = false;
            let mut still_open = Vec::with_capacity(open.len());
            for parts in open.drain(..) {
                let live: Vec<&Formula> = parts.into_iter().filter(|p| Self::viable(p, &domains)).collect();
                match live.len() {
                    0 => return Ok(None),
                    1 => {
                        goals.push(Goal::One(live[0]));
                        forced = true;
                    }
                    _ => still_open.push(live),
                }
            }
            open = still_open;
            if !forced {
                break;
            }
        }

        let Some(choices) = open.pop() else {
            return Ok(Some(domains));
        };
        for choice in choices {
            let mut branch: Vec<Goal<'f>> = open.iter().cloned().map(Goal::AnyOf).collect();
            branch.push(Goal::One(choice));
            if let Some(found) = self.run(branch, domains.clone())? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

/// Decides the conjunction of `assertions` over variables of the given sorts.
pub(crate) fn solve(sorts: &[Sort], assertions: &[&Formula], budget: Budget) -> SatResult {
    let normalized: Vec<Formula> = assertions.iter().map(|f| f.nnf()).collect();
    let domains: Vec<Domain> = sorts.iter().copied().map(Domain::for_sort).collect();
    let mut search = Search {
        decisions: 0,
        budget,
        deadline: Instant::now() + budget.timeout,
    };

    match search.run(normalized.iter().map(Goal::One).collect(), domains) {
        Err(reason) => SatResult::Unknown(reason),
        Ok(None) => SatResult::Unsat,
        Ok(Some(domains)) => {
            let model: Vec<f64> = domains.iter().map(Domain::pick).collect();
            if assertions.iter().all(|f| f.eval(&model)) {
                SatResult::Sat(model)
            } else {
                SatResult::Unknown("could not extract a concrete witness".to_string())
            }
        }
    }
}
