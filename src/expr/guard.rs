/*!

  Guards. The common normalized form is the conjunctive `Guard`, a list of
  relations. `BoolExpr` is the Boolean layer used at the parser boundary and
  for DNF conversion; rules themselves always carry conjunctive guards.

*/

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::ops::Index;

use itertools::Itertools;

use crate::expr::{Expr, Relation, Substitution};
use crate::VariableIdx;

// region Guard

/// A conjunction of relations. The empty guard is `True`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Default)]
pub struct Guard {
  relations: Vec<Relation>,
}

impl Guard {
  pub fn new(relations: Vec<Relation>) -> Guard {
    Guard { relations }
  }

  pub fn empty() -> Guard {
    Guard::default()
  }

  pub fn push(&mut self, relation: Relation) {
    self.relations.push(relation);
  }

  pub fn len(&self) -> usize {
    self.relations.len()
  }

  pub fn is_empty(&self) -> bool {
    self.relations.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Relation> {
    self.relations.iter()
  }

  pub fn relations(&self) -> &[Relation] {
    &self.relations
  }

  pub fn contains(&self, relation: &Relation) -> bool {
    self.relations.contains(relation)
  }

  pub fn remove(&mut self, index: usize) -> Relation {
    self.relations.remove(index)
  }

  pub fn retain<F: FnMut(&Relation) -> bool>(&mut self, f: F) {
    self.relations.retain(f);
  }

  pub fn extend(&mut self, other: Guard) {
    self.relations.extend(other.relations);
  }

  pub fn subs(&self, sigma: &Substitution) -> Guard {
    Guard::new(self.relations.iter().map(|r| r.subs(sigma)).collect())
  }

  pub fn collect_variables(&self, result: &mut BTreeSet<VariableIdx>) {
    for relation in &self.relations {
      relation.collect_variables(result);
    }
  }

  pub fn variables(&self) -> BTreeSet<VariableIdx> {
    let mut result = BTreeSet::new();
    self.collect_variables(&mut result);
    result
  }

  pub fn is_linear(&self) -> bool {
    self.relations.iter().all(Relation::is_linear)
  }

  pub fn is_polynomial(&self) -> bool {
    self.relations.iter().all(Relation::is_polynomial)
  }

  /// Splits equalities and brings every inequality into the `t > 0` form.
  pub fn normalized(&self) -> Guard {
    let mut result = Guard::empty();
    for relation in &self.relations {
      if relation.is_equality() {
        let (ge, le) = relation.split_equality();
        result.push(ge.normalize_inequality());
        result.push(le.normalize_inequality());
      } else {
        result.push(relation.normalize_inequality());
      }
    }
    result
  }
}

impl Index<usize> for Guard {
  type Output = Relation;

  fn index(&self, index: usize) -> &Relation {
    &self.relations[index]
  }
}

impl IntoIterator for Guard {
  type Item = Relation;
  type IntoIter = std::vec::IntoIter<Relation>;

  fn into_iter(self) -> Self::IntoIter {
    self.relations.into_iter()
  }
}

impl<'a> IntoIterator for &'a Guard {
  type Item = &'a Relation;
  type IntoIter = std::slice::Iter<'a, Relation>;

  fn into_iter(self) -> Self::IntoIter {
    self.relations.iter()
  }
}

impl std::iter::FromIterator<Relation> for Guard {
  fn from_iter<I: IntoIterator<Item = Relation>>(iter: I) -> Guard {
    Guard::new(iter.into_iter().collect())
  }
}

impl Display for Guard {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    if self.relations.is_empty() {
      write!(f, "TRUE")
    } else {
      write!(f, "{}", self.relations.iter().join(" && "))
    }
  }
}

// endregion

// region BoolExpr

/// A finite Boolean combination of relations.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum BoolExpr {
  True,
  False,
  Rel(Relation),
  And(Vec<BoolExpr>),
  Or(Vec<BoolExpr>),
}

impl BoolExpr {
  /// Conjunction with constant folding and flattening.
  pub fn and(operands: Vec<BoolExpr>) -> BoolExpr {
    let mut flat = Vec::new();
    for operand in operands {
      match operand {
        BoolExpr::True       => {}
        BoolExpr::False      => return BoolExpr::False,
        BoolExpr::And(inner) => flat.extend(inner),
        other                => flat.push(other),
      }
    }
    match flat.len() {
      0 => BoolExpr::True,
      1 => flat.pop().unwrap(),
      _ => BoolExpr::And(flat),
    }
  }

  /// Disjunction with constant folding and flattening.
  pub fn or(operands: Vec<BoolExpr>) -> BoolExpr {
    let mut flat = Vec::new();
    for operand in operands {
      match operand {
        BoolExpr::False     => {}
        BoolExpr::True      => return BoolExpr::True,
        BoolExpr::Or(inner) => flat.extend(inner),
        other               => flat.push(other),
      }
    }
    match flat.len() {
      0 => BoolExpr::False,
      1 => flat.pop().unwrap(),
      _ => BoolExpr::Or(flat),
    }
  }

  pub fn from_guard(guard: &Guard) -> BoolExpr {
    BoolExpr::and(guard.iter().cloned().map(BoolExpr::Rel).collect())
  }

  /// All literals of this formula, regardless of polarity or nesting.
  pub fn literals(&self) -> Vec<Relation> {
    let mut result = Vec::new();
    self.collect_literals(&mut result);
    result
  }

  fn collect_literals(&self, result: &mut Vec<Relation>) {
    match self {
      BoolExpr::Rel(rel)   => result.push(rel.clone()),
      BoolExpr::And(inner) | BoolExpr::Or(inner) => {
        for operand in inner {
          operand.collect_literals(result);
        }
      }
      _                    => {}
    }
  }

  /// Disjunctive normal form, as a list of conjunctive guards. `False`
  /// yields the empty list, `True` a single empty guard.
  pub fn dnf(&self) -> Vec<Guard> {
    match self {
      BoolExpr::True     => vec![Guard::empty()],
      BoolExpr::False    => vec![],
      BoolExpr::Rel(rel) => vec![Guard::new(vec![rel.clone()])],
      BoolExpr::And(inner) => {
        let mut result = vec![Guard::empty()];
        for operand in inner {
          let operand_dnf = operand.dnf();
          let mut next = Vec::new();
          for prefix in &result {
            for disjunct in &operand_dnf {
              let mut combined = prefix.clone();
              combined.extend(disjunct.clone());
              next.push(combined);
            }
          }
          result = next;
        }
        result
      }
      BoolExpr::Or(inner) => inner.iter().flat_map(|operand| operand.dnf()).collect(),
    }
  }

  pub fn subs(&self, sigma: &Substitution) -> BoolExpr {
    match self {
      BoolExpr::Rel(rel)   => BoolExpr::Rel(rel.subs(sigma)),
      BoolExpr::And(inner) => BoolExpr::and(inner.iter().map(|b| b.subs(sigma)).collect()),
      BoolExpr::Or(inner)  => BoolExpr::or(inner.iter().map(|b| b.subs(sigma)).collect()),
      other                => other.clone(),
    }
  }

  /// The number of literal occurrences.
  pub fn size(&self) -> usize {
    match self {
      BoolExpr::Rel(_)     => 1,
      BoolExpr::And(inner) | BoolExpr::Or(inner) => inner.iter().map(BoolExpr::size).sum(),
      _                    => 0,
    }
  }

  pub fn collect_variables(&self, result: &mut BTreeSet<VariableIdx>) {
    for literal in self.literals() {
      literal.collect_variables(result);
    }
  }
}

impl Display for BoolExpr {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      BoolExpr::True       => write!(f, "TRUE"),
      BoolExpr::False      => write!(f, "FALSE"),
      BoolExpr::Rel(rel)   => write!(f, "{}", rel),
      BoolExpr::And(inner) => {
        write!(f, "({})", inner.iter().map(|b| b.to_string()).join(" && "))
      }
      BoolExpr::Or(inner)  => {
        write!(f, "({})", inner.iter().map(|b| b.to_string()).join(" || "))
      }
    }
  }
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;

  fn x_pos() -> Relation {
    Relation::gt(Expr::var(0), Expr::zero())
  }

  fn y_pos() -> Relation {
    Relation::gt(Expr::var(1), Expr::zero())
  }

  #[test]
  fn guard_normalization_splits_equalities() {
    let guard = Guard::new(vec![Relation::eq(Expr::var(0), Expr::int(5))]);
    let normalized = guard.normalized();
    assert_eq!(normalized.len(), 2);
    for relation in &normalized {
      assert_eq!(*relation.rhs(), Expr::zero());
    }
  }

  #[test]
  fn dnf_distributes() {
    // (x > 0 || y > 0) && x > 0 has two disjuncts
    let formula = BoolExpr::and(vec![
      BoolExpr::or(vec![BoolExpr::Rel(x_pos()), BoolExpr::Rel(y_pos())]),
      BoolExpr::Rel(x_pos()),
    ]);
    let dnf = formula.dnf();
    assert_eq!(dnf.len(), 2);
    assert_eq!(dnf[0].len(), 2);
  }

  #[test]
  fn boolean_constant_folding() {
    assert_eq!(BoolExpr::and(vec![BoolExpr::True, BoolExpr::Rel(x_pos())]), BoolExpr::Rel(x_pos()));
    assert_eq!(BoolExpr::and(vec![BoolExpr::False, BoolExpr::Rel(x_pos())]), BoolExpr::False);
    assert_eq!(BoolExpr::or(vec![BoolExpr::True, BoolExpr::Rel(x_pos())]), BoolExpr::True);
  }
}
