/*!

  Guard strengthening by candidate invariants. When neither metering nor
  the calculus can accelerate a loop, a linear template `c*x + c0 >= 0` is
  searched such that every guarded step establishes it, no matter which
  state the step starts from:

    `G and x' = U(x)  =>  c*x' + c0 >= 0`.

  The universally quantified obligation is discharged with Farkas' lemma,
  so the template coefficients come out of a single SMT query. Such an
  invariant then holds from the first iteration on, and adding it to the
  guard restricts the rule to the states that satisfy it already, which is
  sound for lower bounds. Candidates that the guard implies anyway are
  discarded; they could not change the outcome of a retry.

*/

use std::collections::BTreeSet;

use log::debug;

use crate::config::Config;
use crate::expr::{BoolExpr, Expr, Relation};
use crate::its::{ItsProblem, Rule, VarType};
use crate::smt::{self, SmtResult, Solver};
use crate::VariableIdx;

use super::farkas::farkas_apply;

/// Searches a candidate invariant for a linear simple loop and returns the
/// strengthened rules. Empty when no genuinely restricting invariant is
/// found.
pub fn strengthen_by_invariants(its: &mut ItsProblem, config: &Config, rule: &Rule) -> Vec<Rule> {
  debug_assert!(rule.is_linear());
  let guard = rule.guard().clone();
  let update = rule.update(0).clone();

  if !guard.is_linear()
      || guard.iter().any(|rel| rel.op() == crate::expr::RelOp::Neq)
      || update.iter().any(|(_, value)| !value.is_linear(None))
  {
    return Vec::new();
  }

  // template over the updated variables and everything they read
  let mut relevant: BTreeSet<VariableIdx> = update.domain().collect();
  for (_, value) in update.iter() {
    relevant.extend(value.variables());
  }
  let template_vars: Vec<VariableIdx> = relevant.into_iter().collect();
  if template_vars.is_empty() {
    return Vec::new();
  }

  let coeffs: Vec<VariableIdx> = template_vars
      .iter()
      .map(|_| its.fresh_untracked_symbol("inv", VarType::Int))
      .collect();
  let abs_coeff = its.fresh_untracked_symbol("inv0", VarType::Int);

  // premise: the guard plus the step equations; the conclusion reads the
  // post-state, so updated variables contribute through their primed copy
  let mut premise: Vec<Relation> = guard.iter().cloned().collect();
  let mut conclusion_vars = template_vars.clone();
  let mut conclusion_coeffs: Vec<Expr> = vec![Expr::zero(); template_vars.len()];
  for (index, var) in template_vars.iter().enumerate() {
    if update.contains(*var) {
      let primed = its.fresh_untracked_symbol("prime", VarType::Int);
      premise.push(Relation::eq(Expr::var(primed), update.update_of(*var)));
      conclusion_vars.push(primed);
      conclusion_coeffs.push(-Expr::var(coeffs[index]));
    } else {
      conclusion_coeffs[index] = -Expr::var(coeffs[index]);
    }
  }

  // `inv(x') >= 0` encoded as `-c*x' <= c0`
  let obligation = match farkas_apply(
    &premise,
    &conclusion_vars,
    &conclusion_coeffs,
    Expr::var(abs_coeff),
    its.var_manager_mut(),
  ) {
    Some(formula) => formula,
    None          => return Vec::new(),
  };

  let nontrivial = BoolExpr::or(
    coeffs
        .iter()
        .map(|c| BoolExpr::Rel(Relation::new(Expr::var(*c), crate::expr::RelOp::Neq, Expr::zero())))
        .collect(),
  );

  let mut solver = Solver::new(its.var_manager(), config);
  solver.add(obligation);
  solver.add(nontrivial);
  if solver.check() != SmtResult::Sat {
    return Vec::new();
  }

  let model = solver.model();
  let mut invariant = Expr::num(model.get(abs_coeff));
  for (var, coeff) in template_vars.iter().zip(&coeffs) {
    invariant = invariant + Expr::num(model.get(*coeff)) * Expr::var(*var);
  }
  let invariant = Relation::ge(invariant.expand(), Expr::zero());

  // only keep candidates that genuinely restrict the guard and keep it
  // satisfiable
  let mut restricted = guard.clone();
  restricted.push(invariant.negated());
  if smt::check_guard(its.var_manager(), config, &restricted) != SmtResult::Sat {
    return Vec::new();
  }
  let mut strengthened_guard = guard;
  strengthened_guard.push(invariant.clone());
  if smt::check_guard(its.var_manager(), config, &strengthened_guard) != SmtResult::Sat {
    return Vec::new();
  }

  debug!("strengthening the guard with the invariant {}", invariant);
  vec![rule.with_guard(strengthened_guard)]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::{Guard, Substitution};
  use crate::its::VariableManager;

  #[test]
  fn finds_a_restricting_invariant() {
    // x > 0 with x := x + y: every step establishes x >= y + 1, which the
    // guard alone does not imply
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let y = vm.add_fresh_variable("y");
    let (mut its, start) = ItsProblem::with_start(vm, "f");
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) + Expr::var(y));
    let rule = Rule::new_linear(start, guard, Expr::one(), start, update);
    its.add_rule(rule.clone());

    let config = Config::default();
    let strengthened = strengthen_by_invariants(&mut its, &config, &rule);
    assert_eq!(strengthened.len(), 1);
    let result = &strengthened[0];
    assert_eq!(result.guard().len(), 2);
    assert_eq!(
      smt::check_guard(its.var_manager(), &config, result.guard()),
      SmtResult::Sat
    );
    // the added constraint mentions y, which the original guard does not
    assert!(result.guard()[1].variables().contains(&y));
  }

  #[test]
  fn implied_invariants_are_discarded() {
    // with the identity update every derivable invariant is a consequence
    // of the guard, so nothing restricting can be found
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(vm, "f");
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let mut update = Substitution::new();
    update.put(x, Expr::var(x));
    let rule = Rule::new_linear(start, guard, Expr::one(), start, update);
    its.add_rule(rule.clone());

    let config = Config::default();
    assert!(strengthen_by_invariants(&mut its, &config, &rule).is_empty());
  }
}
