/*!

  A rule consists of a left-hand side (location, guard, cost) and at least
  one right-hand side (location, update). Rules are immutable; every
  transformation produces a new rule via the builder or the `with_*`
  methods. The lhs/rhs locations are tied to the graph of the ITS problem
  and cannot be changed in place.

*/

use std::collections::BTreeSet;

use crate::expr::{Expr, Guard, Substitution};
use crate::{LocationIdx, VariableIdx};

// region RuleLhs / RuleRhs

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct RuleLhs {
  loc  : LocationIdx,
  guard: Guard,
  cost : Expr,
}

impl RuleLhs {
  pub fn new(loc: LocationIdx, guard: Guard, cost: Expr) -> RuleLhs {
    RuleLhs { loc, guard, cost }
  }

  pub fn loc(&self) -> LocationIdx {
    self.loc
  }

  pub fn guard(&self) -> &Guard {
    &self.guard
  }

  pub fn cost(&self) -> &Expr {
    &self.cost
  }

  pub fn collect_variables(&self, result: &mut BTreeSet<VariableIdx>) {
    self.guard.collect_variables(result);
    self.cost.collect_variables(result);
  }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct RuleRhs {
  loc   : LocationIdx,
  update: Substitution,
}

impl RuleRhs {
  pub fn new(loc: LocationIdx, update: Substitution) -> RuleRhs {
    RuleRhs { loc, update }
  }

  pub fn loc(&self) -> LocationIdx {
    self.loc
  }

  pub fn update(&self) -> &Substitution {
    &self.update
  }

  pub fn collect_variables(&self, result: &mut BTreeSet<VariableIdx>) {
    self.update.collect_all_variables(result);
  }
}

// endregion

// region Rule

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Rule {
  lhs : RuleLhs,
  rhss: Vec<RuleRhs>,
}

impl Rule {
  pub fn new(lhs: RuleLhs, rhss: Vec<RuleRhs>) -> Rule {
    assert!(!rhss.is_empty(), "a rule needs at least one right-hand side");
    Rule { lhs, rhss }
  }

  pub fn new_linear(
    lhs_loc: LocationIdx,
    guard: Guard,
    cost: Expr,
    rhs_loc: LocationIdx,
    update: Substitution,
  ) -> Rule {
    Rule::new(RuleLhs::new(lhs_loc, guard, cost), vec![RuleRhs::new(rhs_loc, update)])
  }

  /// An empty rule: guard `True`, cost 0, empty update.
  pub fn dummy(lhs_loc: LocationIdx, rhs_loc: LocationIdx) -> Rule {
    Rule::new_linear(lhs_loc, Guard::empty(), Expr::zero(), rhs_loc, Substitution::new())
  }

  pub fn is_dummy(&self) -> bool {
    self.is_linear()
        && self.lhs.guard.is_empty()
        && self.lhs.cost.is_zero()
        && self.rhss[0].update.is_empty()
  }

  pub fn lhs(&self) -> &RuleLhs {
    &self.lhs
  }

  pub fn rhss(&self) -> &[RuleRhs] {
    &self.rhss
  }

  pub fn lhs_loc(&self) -> LocationIdx {
    self.lhs.loc
  }

  pub fn guard(&self) -> &Guard {
    &self.lhs.guard
  }

  pub fn cost(&self) -> &Expr {
    &self.lhs.cost
  }

  pub fn rhs_count(&self) -> usize {
    self.rhss.len()
  }

  pub fn rhs_loc(&self, index: usize) -> LocationIdx {
    self.rhss[index].loc()
  }

  pub fn update(&self, index: usize) -> &Substitution {
    self.rhss[index].update()
  }

  pub fn is_linear(&self) -> bool {
    self.rhss.len() == 1
  }

  /// True iff every right-hand side targets the lhs location.
  pub fn is_simple_loop(&self) -> bool {
    self.rhss.iter().all(|rhs| rhs.loc() == self.lhs.loc)
  }

  /// Applies the substitution to guard, cost and the updates' right-hand
  /// sides (not to the updated variables themselves). Always safe when only
  /// temporary variables are substituted.
  pub fn subs(&self, sigma: &Substitution) -> Rule {
    let lhs = RuleLhs::new(self.lhs.loc, self.lhs.guard.subs(sigma), self.lhs.cost.subs(sigma));
    let rhss = self
        .rhss
        .iter()
        .map(|rhs| {
          let mut update = Substitution::new();
          for (var, value) in rhs.update().iter() {
            update.put(*var, value.subs(sigma));
          }
          RuleRhs::new(rhs.loc(), update)
        })
        .collect();
    Rule { lhs, rhss }
  }

  /// A linear rule with the same lhs whose single rhs targets `sink` with an
  /// empty update. Used for rules we can no longer describe accurately.
  pub fn replace_rhss_by_sink(&self, sink: LocationIdx) -> Rule {
    Rule::new(self.lhs.clone(), vec![RuleRhs::new(sink, Substitution::new())])
  }

  /// Removes all right-hand sides targeting `loc`; `None` if every rhs does.
  pub fn strip_rhs_location(&self, loc: LocationIdx) -> Option<Rule> {
    let remaining: Vec<RuleRhs> =
        self.rhss.iter().filter(|rhs| rhs.loc() != loc).cloned().collect();
    if remaining.is_empty() {
      None
    } else {
      Some(Rule::new(self.lhs.clone(), remaining))
    }
  }

  pub fn with_guard(&self, guard: Guard) -> Rule {
    self.builder().guard(guard).build()
  }

  pub fn with_cost(&self, cost: Expr) -> Rule {
    self.builder().cost(cost).build()
  }

  pub fn with_update(&self, index: usize, update: Substitution) -> Rule {
    self.builder().update(index, update).build()
  }

  pub fn builder(&self) -> RuleBuilder {
    RuleBuilder { lhs: self.lhs.clone(), rhss: self.rhss.clone() }
  }

  pub fn collect_variables(&self, result: &mut BTreeSet<VariableIdx>) {
    self.lhs.collect_variables(result);
    for rhs in &self.rhss {
      rhs.collect_variables(result);
    }
  }

  pub fn variables(&self) -> BTreeSet<VariableIdx> {
    let mut result = BTreeSet::new();
    self.collect_variables(&mut result);
    result
  }

  /// Structural equality up to a constant difference in the costs. When
  /// `compare_rhss` is false, right-hand sides are ignored.
  pub fn approx_equal(&self, other: &Rule, compare_rhss: bool) -> bool {
    if self.lhs.guard.len() != other.lhs.guard.len() {
      return false;
    }
    if compare_rhss {
      if self.rhss.len() != other.rhss.len() {
        return false;
      }
      for (a, b) in self.rhss.iter().zip(other.rhss.iter()) {
        if a.loc() != b.loc() || a.update() != b.update() {
          return false;
        }
      }
    }
    // Costs have to be equal up to a numeric constant
    let cost_difference = (self.lhs.cost.clone() - other.lhs.cost.clone()).expand();
    if cost_difference.as_number().is_none() {
      return false;
    }
    // The guard has to be fully equal, including the ordering
    self.lhs.guard == other.lhs.guard
  }
}

// endregion

// region RuleBuilder

/// Functional replacement for in-place mutation of guard, cost and updates.
pub struct RuleBuilder {
  lhs : RuleLhs,
  rhss: Vec<RuleRhs>,
}

impl RuleBuilder {
  pub fn guard(mut self, guard: Guard) -> RuleBuilder {
    self.lhs = RuleLhs::new(self.lhs.loc, guard, self.lhs.cost);
    self
  }

  pub fn cost(mut self, cost: Expr) -> RuleBuilder {
    self.lhs = RuleLhs::new(self.lhs.loc, self.lhs.guard, cost);
    self
  }

  pub fn update(mut self, index: usize, update: Substitution) -> RuleBuilder {
    let loc = self.rhss[index].loc();
    self.rhss[index] = RuleRhs::new(loc, update);
    self
  }

  pub fn build(self) -> Rule {
    Rule::new(self.lhs, self.rhss)
  }
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::Relation;

  fn sample_rule() -> Rule {
    let guard = Guard::new(vec![Relation::gt(Expr::var(0), Expr::zero())]);
    let mut update = Substitution::new();
    update.put(0, Expr::var(0) - Expr::one());
    Rule::new_linear(0, guard, Expr::one(), 0, update)
  }

  #[test]
  fn simple_loop_detection() {
    assert!(sample_rule().is_simple_loop());
    let guard = Guard::empty();
    let rule = Rule::new(
      RuleLhs::new(0, guard, Expr::zero()),
      vec![
        RuleRhs::new(0, Substitution::new()),
        RuleRhs::new(1, Substitution::new()),
      ],
    );
    assert!(!rule.is_simple_loop());
  }

  #[test]
  fn strip_rhs_location() {
    let rule = Rule::new(
      RuleLhs::new(0, Guard::empty(), Expr::zero()),
      vec![
        RuleRhs::new(1, Substitution::new()),
        RuleRhs::new(2, Substitution::new()),
      ],
    );
    let stripped = rule.strip_rhs_location(1).unwrap();
    assert_eq!(stripped.rhs_count(), 1);
    assert_eq!(stripped.rhs_loc(0), 2);
    assert!(stripped.strip_rhs_location(2).is_none());
  }

  #[test]
  fn builder_replaces_parts() {
    let rule = sample_rule();
    let rebuilt = rule.with_cost(Expr::int(5));
    assert_eq!(*rebuilt.cost(), Expr::int(5));
    assert_eq!(rebuilt.guard(), rule.guard());
    // the original is untouched
    assert_eq!(*rule.cost(), Expr::one());
  }

  #[test]
  fn approx_equality_ignores_constant_cost() {
    let rule = sample_rule();
    let pricier = rule.with_cost(Expr::int(3));
    assert!(rule.approx_equal(&pricier, true));
    let different = rule.with_guard(Guard::empty());
    assert!(!rule.approx_equal(&different, true));
  }

  #[test]
  fn dummy_rule() {
    assert!(Rule::dummy(0, 1).is_dummy());
    assert!(!sample_rule().is_dummy());
  }
}
