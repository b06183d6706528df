/*!

  A limit problem is a finite set of expressions, each tagged with a
  direction. It is solved when every remaining expression is a plain
  variable; the solution then maps each variable to a linear function of a
  single fresh symbol `n`. The transformation rules (removing constants,
  trimming polynomials, reducing powers, applying limit vectors,
  substituting) each preserve solvability.

  The underlying set ignores directions: adding an expression that is
  already present merges the directions or marks the problem contradictory.

*/

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::expr::{Expr, Guard, Relation, Substitution};
use crate::{VariableIdx};

use super::limit_vector::{trivially_unsatisfiable, Direction, LimitVector};

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct InftyExpression {
  pub expr: Expr,
  pub dir : Direction,
}

impl InftyExpression {
  pub fn new(expr: Expr, dir: Direction) -> InftyExpression {
    InftyExpression { expr, dir }
  }
}

impl Display for InftyExpression {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} ({})", self.expr, self.dir)
  }
}

#[derive(Clone, Debug)]
pub struct LimitProblem {
  set          : BTreeMap<Expr, Direction>,
  variable_n   : VariableIdx,
  substitutions: Vec<usize>,
  unsolvable   : bool,
  log          : Vec<String>,
}

impl LimitProblem {
  /// The initial problem: every normalized guard constraint `t > 0` yields
  /// `(t, Pos)`; the cost, if present, is driven to infinity.
  pub fn new(normalized_guard: &Guard, cost: Option<&Expr>, variable_n: VariableIdx) -> LimitProblem {
    let mut problem = LimitProblem {
      set          : BTreeMap::new(),
      variable_n,
      substitutions: Vec::new(),
      unsolvable   : false,
      log          : Vec::new(),
    };
    for relation in normalized_guard {
      debug_assert!(*relation.rhs() == Expr::zero());
      problem.add_expression(InftyExpression::new(relation.lhs().expand(), Direction::Pos));
    }
    if let Some(cost) = cost {
      problem.add_expression(InftyExpression::new(cost.expand(), Direction::PosInf));
    }
    problem
  }

  pub fn add_expression(&mut self, ex: InftyExpression) {
    match self.set.get(&ex.expr).copied() {
      None            => {
        self.set.insert(ex.expr.clone(), ex.dir);
      }
      Some(existing)  => {
        if existing != ex.dir {
          if existing == Direction::Pos
              && (ex.dir == Direction::PosInf || ex.dir == Direction::PosCons)
          {
            // fix direction
            self.set.insert(ex.expr.clone(), ex.dir);
          } else if !(ex.dir == Direction::Pos
              && (existing == Direction::PosInf || existing == Direction::PosCons))
          {
            // the limit problem is contradictory
            self.unsolvable = true;
          }
        }
      }
    }
    if trivially_unsatisfiable(&ex.expr, ex.dir) {
      self.unsolvable = true;
    }
  }

  pub fn direction_of(&self, expr: &Expr) -> Option<Direction> {
    self.set.get(expr).copied()
  }

  pub fn expressions(&self) -> Vec<InftyExpression> {
    self
        .set
        .iter()
        .map(|(expr, dir)| InftyExpression::new(expr.clone(), *dir))
        .collect()
  }

  pub fn size(&self) -> usize {
    self.set.len()
  }

  pub fn n(&self) -> VariableIdx {
    self.variable_n
  }

  pub fn substitution_indices(&self) -> &[usize] {
    &self.substitutions
  }

  pub fn is_unsolvable(&self) -> bool {
    self.unsolvable
  }

  pub fn set_unsolvable(&mut self) {
    self.unsolvable = true;
  }

  pub fn is_solved(&self) -> bool {
    !self.unsolvable && self.set.keys().all(Expr::is_var)
  }

  /// The solution of a solved problem: `Pos`/`PosInf` variables become `n`,
  /// `NegInf` becomes `-n`, the constant directions become `1` and `-1`.
  pub fn solution(&self) -> Substitution {
    debug_assert!(self.is_solved());
    let n = Expr::var(self.variable_n);
    let mut solution = Substitution::new();
    for (expr, dir) in &self.set {
      let var = expr.as_var().unwrap();
      let value = match dir {
        Direction::Pos | Direction::PosInf => n.clone(),
        Direction::NegInf                  => -n.clone(),
        Direction::PosCons                 => Expr::one(),
        Direction::NegCons                 => -Expr::one(),
      };
      solution.put(var, value);
    }
    solution
  }

  pub fn variables(&self) -> BTreeSet<VariableIdx> {
    let mut result = BTreeSet::new();
    for expr in self.set.keys() {
      expr.collect_variables(&mut result);
    }
    result
  }

  /// The problem as a conjunctive guard, for satisfiability filtering.
  pub fn query(&self) -> Guard {
    let mut guard = Guard::empty();
    for (expr, dir) in &self.set {
      let relation = match dir {
        Direction::NegInf | Direction::NegCons => Relation::lt(expr.clone(), Expr::zero()),
        _                                      => Relation::gt(expr.clone(), Expr::zero()),
      };
      guard.push(relation);
    }
    guard
  }

  pub fn is_linear(&self) -> bool {
    self.set.keys().all(|expr| expr.is_linear(None))
  }

  pub fn is_polynomial(&self) -> bool {
    self.set.keys().all(Expr::is_polynomial)
  }

  pub fn proof_log(&self) -> &[String] {
    &self.log
  }

  // region Transformation rules

  /// (A) replaces an expression by two operands with the vector's
  /// directions.
  pub fn apply_limit_vector(&mut self, expr: &Expr, l: Expr, r: Expr, lv: &LimitVector) {
    debug_assert!(self.set.contains_key(expr));
    self.log.push(format!(
      "applying rule (A), replacing {} by {} ({}) and {} ({})",
      expr,
      l,
      lv.first(),
      r,
      lv.second()
    ));
    self.set.remove(expr);
    self.add_expression(InftyExpression::new(l.expand(), lv.first()));
    self.add_expression(InftyExpression::new(r.expand(), lv.second()));
  }

  pub fn remove_constant_is_applicable(&self, ex: &InftyExpression) -> bool {
    match ex.expr.as_number() {
      Some(value) => {
        use num_traits::Signed;
        (value.is_positive() && (ex.dir == Direction::PosCons || ex.dir == Direction::Pos))
            || (value.is_negative() && ex.dir == Direction::NegCons)
      }
      None        => false,
    }
  }

  /// (B) drops a constant whose sign matches its direction.
  pub fn remove_constant(&mut self, ex: &InftyExpression) {
    debug_assert!(self.remove_constant_is_applicable(ex));
    self.log.push(format!("applying rule (B), deleting {}", ex));
    self.set.remove(&ex.expr);
  }

  /// (C) applies a substitution; the index refers to the caller's list.
  pub fn substitute(&mut self, sub: &Substitution, substitution_index: usize) {
    self.log.push(format!("applying rule (C) using substitution {}", sub));
    let old = std::mem::take(&mut self.set);
    for (expr, dir) in old {
      self.add_expression(InftyExpression::new(expr.subs(sub).expand(), dir));
    }
    self.substitutions.push(substitution_index);
  }

  pub fn trim_polynomial_is_applicable(&self, ex: &InftyExpression) -> bool {
    if !matches!(ex.dir, Direction::Pos | Direction::PosInf | Direction::NegInf) {
      return false;
    }
    if !ex.expr.is_polynomial() {
      return false;
    }
    // only proper sums of at least two monomials can be trimmed
    matches!(ex.expr.expand(), Expr::Add(_)) && ex.expr.has_exactly_one_variable()
  }

  /// (D) discards all but the leading term of a univariate polynomial.
  pub fn trim_polynomial(&mut self, ex: &InftyExpression) {
    debug_assert!(self.trim_polynomial_is_applicable(ex));
    let var = ex.expr.get_a_variable().unwrap();
    let expanded = ex.expr.expand();
    let degree = expanded.degree(var);
    let leading = expanded.coeff(var, degree)
        * Expr::pow(Expr::var(var), Expr::int(degree as i64));

    // a positive direction is fixed towards infinity
    let dir = if ex.dir == Direction::Pos { Direction::PosInf } else { ex.dir };
    self.log.push(format!(
      "applying rule (D), replacing {} by its leading term {}",
      ex, leading
    ));
    self.set.remove(&ex.expr);
    self.add_expression(InftyExpression::new(leading.expand(), dir));
  }

  /// Looks for a power summand whose exponent mentions the variable.
  fn find_power(expr: &Expr, var: VariableIdx) -> Option<Expr> {
    let summands: Vec<Expr> = match expr {
      Expr::Add(terms) => terms.clone(),
      other            => vec![other.clone()],
    };
    summands.into_iter().find(|summand| {
      matches!(summand, Expr::Pow(_, exponent) if exponent.contains_var(var))
    })
  }

  pub fn reduce_exp_is_applicable(&self, ex: &InftyExpression) -> bool {
    if !matches!(ex.dir, Direction::Pos | Direction::PosInf) {
      return false;
    }
    if !ex.expr.has_exactly_one_variable() {
      return false;
    }
    let var = ex.expr.get_a_variable().unwrap();
    let power = match Self::find_power(&ex.expr, var) {
      Some(power) => power,
      None        => return false,
    };
    let rest = (ex.expr.clone() - power.clone()).expand();
    if !rest.is_polynomial_in(var) {
      return false;
    }
    if let Expr::Pow(base, exponent) = &power {
      base.is_polynomial_in(var) && exponent.is_polynomial_in(var) && exponent.contains_var(var)
    } else {
      false
    }
  }

  /// (E) replaces `b^e + r` by the pair `(b - 1, Pos)` and `(e, PosInf)`.
  pub fn reduce_exp(&mut self, ex: &InftyExpression) {
    debug_assert!(self.reduce_exp_is_applicable(ex));
    let var = ex.expr.get_a_variable().unwrap();
    let power = Self::find_power(&ex.expr, var).unwrap();
    let (base, exponent) = match &power {
      Expr::Pow(base, exponent) => (base.as_ref().clone(), exponent.as_ref().clone()),
      _                         => unreachable!(),
    };
    self.log.push(format!("applying rule (E), reducing the power in {}", ex));
    self.set.remove(&ex.expr);
    self.add_expression(InftyExpression::new((base - Expr::one()).expand(), Direction::Pos));
    self.add_expression(InftyExpression::new(exponent.expand(), Direction::PosInf));
  }

  /// Looks for a power whose exponent is not polynomial or which spans
  /// several variables.
  fn find_general_power(expr: &Expr) -> Option<Expr> {
    let summands: Vec<Expr> = match expr {
      Expr::Add(terms) => terms.clone(),
      other            => vec![other.clone()],
    };
    summands.into_iter().find(|summand| match summand {
      Expr::Pow(_, exponent) => {
        !exponent.is_polynomial() || summand.has_at_least_two_variables()
      }
      _                      => false,
    })
  }

  pub fn reduce_general_exp_is_applicable(&self, ex: &InftyExpression) -> bool {
    matches!(ex.dir, Direction::Pos | Direction::PosInf)
        && Self::find_general_power(&ex.expr).is_some()
  }

  /// Unstacks a general power: `b^e + r` becomes `(b - 1, Pos)` and
  /// `(e + r, PosInf)`.
  pub fn reduce_general_exp(&mut self, ex: &InftyExpression) {
    debug_assert!(self.reduce_general_exp_is_applicable(ex));
    let power = Self::find_general_power(&ex.expr).unwrap();
    let rest = (ex.expr.clone() - power.clone()).expand();
    let (base, exponent) = match &power {
      Expr::Pow(base, exponent) => (base.as_ref().clone(), exponent.as_ref().clone()),
      _                         => unreachable!(),
    };
    self.log.push(format!("reducing the general power in {}", ex));
    self.set.remove(&ex.expr);
    self.add_expression(InftyExpression::new((base - Expr::one()).expand(), Direction::Pos));
    self.add_expression(InftyExpression::new((exponent + rest).expand(), Direction::PosInf));
  }

  /// Clears the problem; used when an SMT encoding solved it wholesale.
  pub fn remove_all_constraints(&mut self) {
    self.log.push("removing all constraints (solved by SMT)".to_string());
    self.set.clear();
  }

  // endregion
}

impl Display for LimitProblem {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    if self.set.is_empty() {
      write!(f, "{{}}")
    } else {
      write!(
        f,
        "{{{}}}",
        self.set.iter().map(|(e, d)| format!("{} ({})", e, d)).join(", ")
      )
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const X: VariableIdx = 0;
  const N: VariableIdx = 7;

  fn guard_x_pos() -> Guard {
    Guard::new(vec![Relation::gt(Expr::var(X), Expr::zero())]).normalized()
  }

  #[test]
  fn initial_problem_and_solution() {
    // x > 0 with cost x: {x (+), x (+)} merges into a single entry
    let problem = LimitProblem::new(&guard_x_pos(), Some(&Expr::var(X)), N);
    assert_eq!(problem.size(), 1);
    assert!(problem.is_solved());
    let solution = problem.solution();
    assert_eq!(solution.get(X).unwrap().clone(), Expr::var(N));
  }

  #[test]
  fn contradictory_directions() {
    let mut problem = LimitProblem::new(&Guard::empty(), None, N);
    problem.add_expression(InftyExpression::new(Expr::var(X), Direction::PosInf));
    problem.add_expression(InftyExpression::new(Expr::var(X), Direction::NegInf));
    assert!(problem.is_unsolvable());
  }

  #[test]
  fn constant_removal() {
    let mut problem = LimitProblem::new(&Guard::empty(), None, N);
    problem.add_expression(InftyExpression::new(Expr::int(3), Direction::PosCons));
    let ex = problem.expressions().pop().unwrap();
    assert!(problem.remove_constant_is_applicable(&ex));
    problem.remove_constant(&ex);
    assert_eq!(problem.size(), 0);
    assert!(problem.is_solved());
  }

  #[test]
  fn trimming_keeps_the_leading_term() {
    let mut problem = LimitProblem::new(&Guard::empty(), None, N);
    let poly = (Expr::pow(Expr::var(X), Expr::int(2)) + Expr::var(X) - Expr::int(7)).expand();
    problem.add_expression(InftyExpression::new(poly, Direction::PosInf));
    let ex = problem.expressions().pop().unwrap();
    assert!(problem.trim_polynomial_is_applicable(&ex));
    problem.trim_polynomial(&ex);
    let remaining = problem.expressions().pop().unwrap();
    assert_eq!(remaining.expr, Expr::pow(Expr::var(X), Expr::int(2)));
    assert_eq!(remaining.dir, Direction::PosInf);
  }

  #[test]
  fn exponential_reduction() {
    // 2^x (+infinity) becomes 1 (+) and x (+infinity)
    let mut problem = LimitProblem::new(&Guard::empty(), None, N);
    problem.add_expression(InftyExpression::new(
      Expr::pow(Expr::int(2), Expr::var(X)),
      Direction::PosInf,
    ));
    let ex = problem.expressions().pop().unwrap();
    assert!(problem.reduce_exp_is_applicable(&ex));
    problem.reduce_exp(&ex);
    assert_eq!(problem.direction_of(&Expr::var(X)), Some(Direction::PosInf));
    assert_eq!(problem.direction_of(&Expr::one()), Some(Direction::Pos));
  }

  #[test]
  fn substitution_is_recorded() {
    let mut problem = LimitProblem::new(&guard_x_pos(), None, N);
    let sub = Substitution::single(X, Expr::int(5));
    problem.substitute(&sub, 0);
    assert_eq!(problem.substitution_indices(), &[0]);
    // the entry x became the constant 5
    assert!(problem.expressions().iter().any(|e| e.expr.is_rational_constant()));
  }
}
