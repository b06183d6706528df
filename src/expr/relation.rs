/*!

  A `Relation` is a pair of expressions joined by a comparison operator. The
  normal form for inequalities is `t > 0`; since all program variables range
  over the integers, non-strict comparisons are normalised by shifting
  (`l >= r` becomes `l - r + 1 > 0`).

*/

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use num_traits::Zero;

use crate::expr::{Expr, Substitution};
use crate::VariableIdx;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum RelOp {
  Eq,
  Neq,
  Lt,
  Le,
  Gt,
  Ge,
}

impl RelOp {
  pub fn negated(self) -> RelOp {
    match self {
      RelOp::Eq  => RelOp::Neq,
      RelOp::Neq => RelOp::Eq,
      RelOp::Lt  => RelOp::Ge,
      RelOp::Le  => RelOp::Gt,
      RelOp::Gt  => RelOp::Le,
      RelOp::Ge  => RelOp::Lt,
    }
  }

  pub fn is_inequality(self) -> bool {
    !matches!(self, RelOp::Eq | RelOp::Neq)
  }
}

impl Display for RelOp {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let symbol = match self {
      RelOp::Eq  => "==",
      RelOp::Neq => "!=",
      RelOp::Lt  => "<",
      RelOp::Le  => "<=",
      RelOp::Gt  => ">",
      RelOp::Ge  => ">=",
    };
    write!(f, "{}", symbol)
  }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Relation {
  lhs: Expr,
  op : RelOp,
  rhs: Expr,
}

impl Relation {
  pub fn new(lhs: Expr, op: RelOp, rhs: Expr) -> Relation {
    Relation { lhs, op, rhs }
  }

  pub fn eq(lhs: Expr, rhs: Expr) -> Relation {
    Relation::new(lhs, RelOp::Eq, rhs)
  }

  pub fn lt(lhs: Expr, rhs: Expr) -> Relation {
    Relation::new(lhs, RelOp::Lt, rhs)
  }

  pub fn le(lhs: Expr, rhs: Expr) -> Relation {
    Relation::new(lhs, RelOp::Le, rhs)
  }

  pub fn gt(lhs: Expr, rhs: Expr) -> Relation {
    Relation::new(lhs, RelOp::Gt, rhs)
  }

  pub fn ge(lhs: Expr, rhs: Expr) -> Relation {
    Relation::new(lhs, RelOp::Ge, rhs)
  }

  pub fn lhs(&self) -> &Expr {
    &self.lhs
  }

  pub fn rhs(&self) -> &Expr {
    &self.rhs
  }

  pub fn op(&self) -> RelOp {
    self.op
  }

  pub fn is_equality(&self) -> bool {
    self.op == RelOp::Eq
  }

  pub fn negated(&self) -> Relation {
    Relation::new(self.lhs.clone(), self.op.negated(), self.rhs.clone())
  }

  /// Brings an inequality into the normal form `t > 0`, strengthening
  /// non-strict comparisons over the integers. Idempotent. Must not be
  /// called on (dis)equalities.
  pub fn normalize_inequality(&self) -> Relation {
    debug_assert!(self.op.is_inequality());
    let term = match self.op {
      RelOp::Gt => self.lhs.clone() - self.rhs.clone(),
      RelOp::Ge => self.lhs.clone() - self.rhs.clone() + Expr::one(),
      RelOp::Lt => self.rhs.clone() - self.lhs.clone(),
      RelOp::Le => self.rhs.clone() - self.lhs.clone() + Expr::one(),
      _         => unreachable!("normalize_inequality on equality"),
    };
    Relation::gt(term.expand(), Expr::zero())
  }

  /// The term `t` such that this inequality is equivalent to `t <= 0`
  /// (integer semantics). Must not be called on (dis)equalities.
  pub fn to_leq_zero_term(&self) -> Expr {
    debug_assert!(self.op.is_inequality());
    let term = match self.op {
      RelOp::Le => self.lhs.clone() - self.rhs.clone(),
      RelOp::Lt => self.lhs.clone() - self.rhs.clone() + Expr::one(),
      RelOp::Ge => self.rhs.clone() - self.lhs.clone(),
      RelOp::Gt => self.rhs.clone() - self.lhs.clone() + Expr::one(),
      _         => unreachable!("to_leq_zero_term on equality"),
    };
    term.expand()
  }

  /// Splits an equality into the two non-strict inequalities.
  pub fn split_equality(&self) -> (Relation, Relation) {
    debug_assert!(self.is_equality());
    (
      Relation::ge(self.lhs.clone(), self.rhs.clone()),
      Relation::le(self.lhs.clone(), self.rhs.clone()),
    )
  }

  /// Evaluates the relation if both sides are rational constants.
  pub fn trivial_truth(&self) -> Option<bool> {
    let difference = (self.lhs.clone() - self.rhs.clone()).expand();
    let value = difference.as_number()?;
    let result = match self.op {
      RelOp::Eq  => value.is_zero(),
      RelOp::Neq => !value.is_zero(),
      RelOp::Lt  => *value < Zero::zero(),
      RelOp::Le  => *value <= Zero::zero(),
      RelOp::Gt  => *value > Zero::zero(),
      RelOp::Ge  => *value >= Zero::zero(),
    };
    Some(result)
  }

  pub fn is_trivially_true(&self) -> bool {
    self.trivial_truth() == Some(true)
  }

  pub fn is_trivially_false(&self) -> bool {
    self.trivial_truth() == Some(false)
  }

  pub fn subs(&self, sigma: &Substitution) -> Relation {
    Relation::new(self.lhs.subs(sigma), self.op, self.rhs.subs(sigma))
  }

  pub fn collect_variables(&self, result: &mut BTreeSet<VariableIdx>) {
    self.lhs.collect_variables(result);
    self.rhs.collect_variables(result);
  }

  pub fn variables(&self) -> BTreeSet<VariableIdx> {
    let mut result = BTreeSet::new();
    self.collect_variables(&mut result);
    result
  }

  pub fn is_linear(&self) -> bool {
    self.lhs.is_linear(None) && self.rhs.is_linear(None)
  }

  pub fn is_polynomial(&self) -> bool {
    self.lhs.is_polynomial() && self.rhs.is_polynomial()
  }
}

impl Display for Relation {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalization_is_idempotent() {
    let rel = Relation::ge(Expr::var(0), Expr::var(1));
    let once = rel.normalize_inequality();
    let twice = once.normalize_inequality();
    assert_eq!(once, twice);
    assert_eq!(*once.rhs(), Expr::zero());
    assert_eq!(once.op(), RelOp::Gt);
  }

  #[test]
  fn integer_strengthening() {
    // x >= y over the integers is x - y + 1 > 0
    let rel = Relation::ge(Expr::var(0), Expr::var(1)).normalize_inequality();
    let expected = (Expr::var(0) - Expr::var(1) + Expr::one()).expand();
    assert_eq!(*rel.lhs(), expected);
  }

  #[test]
  fn trivial_detection() {
    assert!(Relation::gt(Expr::int(3), Expr::int(2)).is_trivially_true());
    assert!(Relation::gt(Expr::int(2), Expr::int(3)).is_trivially_false());
    assert!(Relation::gt(Expr::var(0), Expr::int(3)).trivial_truth().is_none());
    // x + 1 > x is trivially true
    assert!(Relation::gt(Expr::var(0) + Expr::one(), Expr::var(0)).is_trivially_true());
  }

  #[test]
  fn negation() {
    let rel = Relation::gt(Expr::var(0), Expr::zero());
    assert_eq!(rel.negated().op(), RelOp::Le);
    assert_eq!(rel.negated().negated(), rel);
  }
}
