/*!

  Composition of two rules across a matching location: the second rule's
  guard and cost are pulled back through the first rule's update, the
  updates are composed, and the right-hand sides are spliced. The resulting
  guard is checked for satisfiability unless the caller opts out.

*/

use log::debug;

use crate::config::Config;
use crate::expr::Expr;
use crate::its::{ItsProblem, Rule, RuleLhs, RuleRhs};
use crate::smt::{self, SmtResult};

/// Chains the lhs of `first` (with the update of its `rhs_index`-th rhs)
/// with the lhs of `second`: concatenated guards, added costs, both pulled
/// back through the update.
fn chain_lhss(first: &Rule, rhs_index: usize, second: &Rule) -> RuleLhs {
  let update = first.update(rhs_index);

  let mut guard = first.guard().clone();
  for relation in second.guard() {
    guard.push(relation.subs(update));
  }

  // keep the sentinel on its own, so nontermination stays easy to identify
  let cost = if first.cost().is_nonterm() || second.cost().has_nonterm() {
    Expr::Nonterm
  } else {
    first.cost().clone() + second.cost().subs(update)
  };

  RuleLhs::new(first.lhs_loc(), guard, cost)
}

/// Composes two updates so that `first` is applied before `second`:
/// `second`'s right-hand sides read the state produced by `first`, so they
/// are pulled back through it; entries of `first` that `second` does not
/// overwrite are kept.
fn chain_updates(
  first: &crate::expr::Substitution,
  second: &crate::expr::Substitution,
) -> crate::expr::Substitution {
  let mut result = first.clone();
  for (var, value) in second.iter() {
    result.put(*var, value.subs(first));
  }
  result
}

/// Chains the rhs at `rhs_index` of `first` with `second`, splicing
/// `second`'s right-hand sides in place of the chained one.
fn chain_rules_on_rhs(first: &Rule, rhs_index: usize, second: &Rule) -> Rule {
  let first_update = first.update(rhs_index);
  let lhs = chain_lhss(first, rhs_index, second);

  let mut rhss: Vec<RuleRhs> = Vec::new();
  rhss.extend_from_slice(&first.rhss()[..rhs_index]);
  for second_rhs in second.rhss() {
    rhss.push(RuleRhs::new(
      second_rhs.loc(),
      chain_updates(first_update, second_rhs.update()),
    ));
  }
  rhss.extend_from_slice(&first.rhss()[rhs_index + 1..]);

  Rule::new(lhs, rhss)
}

/// Chains all right-hand sides of `first` that lead to `second`'s lhs
/// location with `second`. Returns `None` if the combined guard is
/// unsatisfiable (when `check_sat` is set) or if no rhs matches.
pub fn chain_rules(
  its: &ItsProblem,
  config: &Config,
  first: &Rule,
  second: &Rule,
  check_sat: bool,
) -> Option<Rule> {
  let mut result = first.clone();
  let mut rhs_index = 0;
  let mut chained_any = false;

  while rhs_index < result.rhs_count() {
    if result.rhs_loc(rhs_index) == second.lhs_loc() {
      result = chain_rules_on_rhs(&result, rhs_index, second);
      chained_any = true;
      // skip the freshly spliced rhss, relevant when second has self-loops
      rhs_index += second.rhs_count();
    } else {
      rhs_index += 1;
    }
  }

  if !chained_any {
    return None;
  }

  if check_sat
      && smt::check_guard(its.var_manager(), config, result.guard()) == SmtResult::Unsat
  {
    debug!("chaining yields an unsatisfiable guard, discarding");
    return None;
  }

  Some(result)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::{Guard, Relation, Substitution};
  use crate::its::VariableManager;

  fn its_with_two_locs() -> (ItsProblem, usize, usize, usize) {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(vm, "f");
    let second = its.add_named_location("g");
    (its, start, second, x)
  }

  #[test]
  fn guard_and_cost_are_pulled_back() {
    let (its, start, second, x) = its_with_two_locs();
    let config = Config::default();

    // f -> g with x := x - 1, cost 1
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::one());
    let first = Rule::new_linear(
      start,
      Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]),
      Expr::one(),
      second,
      update,
    );
    // g -> g with guard x > 1, cost x
    let second_rule = Rule::new_linear(
      second,
      Guard::new(vec![Relation::gt(Expr::var(x), Expr::one())]),
      Expr::var(x),
      second,
      Substitution::new(),
    );

    let chained = chain_rules(&its, &config, &first, &second_rule, true).unwrap();
    assert_eq!(chained.lhs_loc(), start);
    // second guard became x - 1 > 1
    assert!(chained
        .guard()
        .contains(&Relation::gt((Expr::var(x) - Expr::one()).expand(), Expr::one())));
    // cost became 1 + (x - 1)
    assert_eq!(*chained.cost(), (Expr::var(x)).expand());
  }

  #[test]
  fn updates_compose_in_order() {
    let (its, start, second, x) = its_with_two_locs();
    let config = Config::default();

    let mut first_update = Substitution::new();
    first_update.put(x, Expr::var(x) + Expr::one());
    let first = Rule::new_linear(start, Guard::empty(), Expr::zero(), second, first_update);

    let mut second_update = Substitution::new();
    second_update.put(x, Expr::int(2) * Expr::var(x));
    let second_rule =
        Rule::new_linear(second, Guard::empty(), Expr::zero(), second, second_update);

    let chained = chain_rules(&its, &config, &first, &second_rule, false).unwrap();
    // x := 2 * (x + 1)
    assert_eq!(
      chained.update(0).get(x).unwrap().expand(),
      (Expr::int(2) * Expr::var(x) + Expr::int(2)).expand()
    );
  }

  #[test]
  fn unsatisfiable_chain_is_rejected() {
    let (its, start, second, x) = its_with_two_locs();
    let config = Config::default();

    let first = Rule::new_linear(
      start,
      Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]),
      Expr::zero(),
      second,
      Substitution::new(),
    );
    let second_rule = Rule::new_linear(
      second,
      Guard::new(vec![Relation::lt(Expr::var(x), Expr::zero())]),
      Expr::zero(),
      second,
      Substitution::new(),
    );
    assert!(chain_rules(&its, &config, &first, &second_rule, true).is_none());
  }

  #[test]
  fn chaining_is_associative() {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, a) = ItsProblem::with_start(vm, "a");
    let b = its.add_named_location("b");
    let c = its.add_named_location("c");
    let d = its.add_named_location("d");
    let config = Config::default();

    let mut inc = Substitution::new();
    inc.put(x, Expr::var(x) + Expr::one());
    let mut double = Substitution::new();
    double.put(x, Expr::int(2) * Expr::var(x));

    let first = Rule::new_linear(
      a,
      Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]),
      Expr::one(),
      b,
      inc,
    );
    let second = Rule::new_linear(
      b,
      Guard::new(vec![Relation::lt(Expr::var(x), Expr::int(100))]),
      Expr::var(x),
      c,
      double,
    );
    let third = Rule::new_linear(
      c,
      Guard::new(vec![Relation::gt(Expr::var(x), Expr::int(1))]),
      Expr::int(2),
      d,
      Substitution::new(),
    );

    let left = chain_rules(
      &its,
      &config,
      &chain_rules(&its, &config, &first, &second, false).unwrap(),
      &third,
      false,
    )
    .unwrap();
    let right = chain_rules(
      &its,
      &config,
      &first,
      &chain_rules(&its, &config, &second, &third, false).unwrap(),
      false,
    )
    .unwrap();

    assert_eq!(left.guard(), right.guard());
    assert_eq!(left.cost().expand(), right.cost().expand());
    assert_eq!(left.update(0), right.update(0));
  }

  #[test]
  fn nonterm_cost_propagates() {
    let (its, start, second, _) = its_with_two_locs();
    let config = Config::default();

    let first = Rule::new_linear(start, Guard::empty(), Expr::one(), second, Substitution::new());
    let second_rule =
        Rule::new_linear(second, Guard::empty(), Expr::Nonterm, second, Substitution::new());
    let chained = chain_rules(&its, &config, &first, &second_rule, false).unwrap();
    assert!(chained.cost().is_nonterm());
  }
}
