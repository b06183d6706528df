/*!

  Farkas-based search for a metering function of a rule: a linear template
  `f(x) = c*x + c0` whose value under-approximates the number of loop
  iterations. The obligations are

    (1) `!l  =>  f(x) <= 0` for every limiting guard constraint `l`,
    (2) `G   =>  f(x) >= 1`,
    (3) `G and x' = U(x)  =>  f(x) <= f(x') + 1` for every update `U`.

  (3) bounds the decrease by one per step: together with (1) the loop then
  runs for at least `f(x)` iterations from any state satisfying `G`, which
  is the direction a lower bound needs. Coefficients are integer-typed, so
  a found metering function is integral by construction.

*/

use std::collections::BTreeSet;

use crate::config::Config;
use crate::expr::{BoolExpr, Expr, Guard, Relation, Substitution};
use crate::its::{ItsProblem, Rule, VarType};
use crate::smt::{self, SmtResult, Solver};
use crate::{VariableIdx, VariablePair};

use super::farkas::farkas_apply;

#[derive(Clone, Debug)]
pub enum MeteringResult {
  /// A metering function was found.
  Success(Expr),
  /// The guard never limits the loop: if it holds, the loop cannot exit.
  Nonterm,
  /// The rule is nonlinear and could not be reduced to a linear problem.
  Nonlinear,
  /// Two variables limit the loop; `min`/`max` would be needed.
  ConflictVar(VariablePair),
  /// No metering function exists (or the solver could not find one).
  Unsat,
}

pub struct MeteringFinder;

impl MeteringFinder {
  /// Searches a metering function for the given rule.
  pub fn generate(its: &mut ItsProblem, config: &Config, rule: &Rule) -> MeteringResult {
    let guard = rule.guard().clone();
    let updates: Vec<Substitution> =
        rule.rhss().iter().map(|rhs| rhs.update().clone()).collect();

    if !guard.is_linear() || updates.iter().any(|u| u.iter().any(|(_, e)| !e.is_linear(None))) {
      return MeteringResult::Nonlinear;
    }

    // Constraints that may limit the loop are those mentioning an updated
    // variable; the rest cannot change and is irrelevant for termination.
    let updated: BTreeSet<VariableIdx> = updates.iter().flat_map(|u| u.domain()).collect();
    let reduced_guard: Vec<Relation> = guard
        .iter()
        .filter(|rel| rel.variables().iter().any(|v| updated.contains(v)))
        .cloned()
        .collect();

    if reduced_guard.is_empty() {
      return MeteringResult::Nonterm;
    }

    // Relevant variables: those of the limiting constraints, closed under
    // the updates of relevant variables.
    let mut relevant: BTreeSet<VariableIdx> = BTreeSet::new();
    for rel in &reduced_guard {
      relevant.extend(rel.variables());
    }
    loop {
      let mut changed = false;
      for update in &updates {
        for (var, value) in update.iter() {
          if relevant.contains(var) {
            for dep in value.variables() {
              changed |= relevant.insert(dep);
            }
          }
        }
      }
      if !changed {
        break;
      }
    }
    let template_vars: Vec<VariableIdx> = relevant.iter().copied().collect();

    // Template coefficients; integer-typed so the function is integral.
    let coeffs: Vec<VariableIdx> = template_vars
        .iter()
        .map(|_| its.fresh_untracked_symbol("c", VarType::Int))
        .collect();
    let abs_coeff = its.fresh_untracked_symbol("c0", VarType::Int);

    let coeff_exprs: Vec<Expr> = coeffs.iter().map(|c| Expr::var(*c)).collect();

    let mut obligations: Vec<BoolExpr> = Vec::new();

    // (1): for every limiting constraint l: !l => f(x) <= 0
    for rel in &reduced_guard {
      let premise = vec![rel.negated()];
      let formula = farkas_apply(
        &premise,
        &template_vars,
        &coeff_exprs,
        -Expr::var(abs_coeff),
        its.var_manager_mut(),
      );
      match formula {
        Some(f) => obligations.push(f),
        None    => return MeteringResult::Nonlinear,
      }
    }

    // (2): G => f(x) >= 1, encoded as -c*x <= c0 - 1
    let negated_coeffs: Vec<Expr> = coeff_exprs.iter().map(|c| -c.clone()).collect();
    let positivity = farkas_apply(
      guard.relations(),
      &template_vars,
      &negated_coeffs,
      Expr::var(abs_coeff) - Expr::one(),
      its.var_manager_mut(),
    );
    match positivity {
      Some(f) => obligations.push(f),
      None    => return MeteringResult::Nonlinear,
    }

    // (3): for every update: G and x' = U(x) => c*x - c*x' <= 1
    for update in &updates {
      let mut premise: Vec<Relation> = guard.iter().cloned().collect();
      let mut extended_vars = template_vars.clone();
      let mut extended_coeffs = coeff_exprs.clone();

      for (index, var) in template_vars.iter().enumerate() {
        if update.contains(*var) {
          let primed = its.fresh_untracked_symbol("prime", VarType::Int);
          premise.push(Relation::eq(Expr::var(primed), update.update_of(*var)));
          extended_vars.push(primed);
          extended_coeffs.push(-extended_coeffs[index].clone());
        }
      }

      let formula = farkas_apply(
        &premise,
        &extended_vars,
        &extended_coeffs,
        Expr::one(),
        its.var_manager_mut(),
      );
      match formula {
        Some(f) => obligations.push(f),
        None    => return MeteringResult::Nonlinear,
      }
    }

    // suppress the trivial solution f = 0
    let nontrivial = BoolExpr::or(
      coeffs
          .iter()
          .map(|c| BoolExpr::Rel(Relation::new(Expr::var(*c), crate::expr::RelOp::Neq, Expr::zero())))
          .collect(),
    );
    obligations.push(nontrivial);

    let mut solver = Solver::new(its.var_manager(), config);
    for obligation in obligations {
      solver.add(obligation);
    }

    match solver.check() {
      SmtResult::Sat => {
        let model = solver.model();
        let mut metering = Expr::num(model.get(abs_coeff));
        for (var, coeff) in template_vars.iter().zip(&coeffs) {
          metering = metering + Expr::num(model.get(*coeff)) * Expr::var(*var);
        }
        MeteringResult::Success(metering.expand())
      }
      _ => {
        match Self::find_conflict_vars(&reduced_guard, &updated) {
          Some(pair) => MeteringResult::ConflictVar(pair),
          None       => MeteringResult::Unsat,
        }
      }
    }
  }

  /// Two variables conflict when each limits the loop through its own
  /// constraint; resolving that needs `min`/`max`, which a linear template
  /// cannot express.
  fn find_conflict_vars(
    reduced_guard: &[Relation],
    updated: &BTreeSet<VariableIdx>,
  ) -> Option<VariablePair> {
    let mut limiting: Vec<VariableIdx> = Vec::new();
    for rel in reduced_guard {
      for var in rel.variables() {
        if updated.contains(&var) && !limiting.contains(&var) {
          limiting.push(var);
        }
      }
    }
    if limiting.len() >= 2 {
      Some((limiting[0], limiting[1]))
    } else {
      None
    }
  }

  /// Instantiates temporary variables by bounds from the guard, e.g. for
  /// `t <= 4` the variable `t` becomes 4. Returns the instantiated rule if
  /// the guard stays satisfiable.
  pub fn instantiate_temp_vars_heuristic(
    its: &ItsProblem,
    config: &Config,
    rule: &Rule,
  ) -> Option<Rule> {
    let mut sigma = Substitution::new();
    for var in rule.variables() {
      if !its.is_temp_var(var) {
        continue;
      }
      let mut candidate: Option<Expr> = None;
      for rel in rule.guard() {
        if rel.op() == crate::expr::RelOp::Neq {
          continue;
        }
        // only plain `t <op> e` or `e <op> t` bounds with t-free e
        let bound = if rel.lhs().as_var() == Some(var) && !rel.rhs().contains_var(var) {
          Some(rel.rhs().clone())
        } else if rel.rhs().as_var() == Some(var) && !rel.lhs().contains_var(var) {
          Some(rel.lhs().clone())
        } else {
          None
        };
        if let Some(bound) = bound {
          let preferred = rel.is_equality() || candidate.is_none();
          if preferred {
            candidate = Some(bound);
          }
          if rel.is_equality() {
            break;
          }
        }
      }
      if let Some(bound) = candidate {
        sigma.put(var, bound);
      }
    }

    if sigma.is_empty() {
      return None;
    }
    let instantiated = rule.subs(&sigma);
    if smt::check_guard(its.var_manager(), config, instantiated.guard()) == SmtResult::Unsat {
      return None;
    }
    Some(instantiated)
  }

  /// Guard-strengthening for constant updates: propagates guard constraints
  /// over variables whose update does not depend on updated variables, e.g.
  /// for `x := 5` and guard `x < y` the constraint `5 < y` is added.
  pub fn strengthen_guard(_its: &ItsProblem, rule: &Rule) -> Option<Rule> {
    let mut additions: Vec<Relation> = Vec::new();

    for rhs in rule.rhss() {
      let updated: BTreeSet<VariableIdx> = rhs.update().domain().collect();
      let constant_updates: Vec<(VariableIdx, &Expr)> = rhs
          .update()
          .iter()
          .filter(|(_, value)| value.variables().iter().all(|v| !updated.contains(v)))
          .map(|(var, value)| (*var, value))
          .collect();

      for (var, value) in constant_updates {
        let sigma = Substitution::single(var, value.clone());
        for rel in rule.guard() {
          if rel.variables().contains(&var) {
            let propagated = rel.subs(&sigma);
            if !propagated.is_trivially_true()
                && !rule.guard().contains(&propagated)
                && !additions.contains(&propagated)
            {
              additions.push(propagated);
            }
          }
        }
      }
    }

    if additions.is_empty() {
      return None;
    }
    let mut guard = rule.guard().clone();
    for addition in additions {
      guard.push(addition);
    }
    Some(rule.with_guard(guard))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::its::VariableManager;

  fn counting_rule() -> (ItsProblem, Rule) {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(vm, "f");
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::one());
    let rule = Rule::new_linear(start, guard, Expr::one(), start, update);
    its.add_rule(rule.clone());
    (its, rule)
  }

  #[test]
  fn finds_the_obvious_metering_function() {
    let (mut its, rule) = counting_rule();
    let config = Config::default();
    match MeteringFinder::generate(&mut its, &config, &rule) {
      MeteringResult::Success(metering) => {
        // x itself meters the loop
        assert_eq!(metering, Expr::var(0));
      }
      other => panic!("expected success, got {:?}", other),
    }
  }

  #[test]
  fn missing_exit_is_nonterm() {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let y = vm.add_fresh_variable("y");
    let (mut its, start) = ItsProblem::with_start(vm, "f");
    // guard only constrains y, but only x is updated
    let guard = Guard::new(vec![Relation::gt(Expr::var(y), Expr::zero())]);
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) + Expr::one());
    let rule = Rule::new_linear(start, guard, Expr::one(), start, update);
    its.add_rule(rule.clone());

    let config = Config::default();
    assert!(matches!(
      MeteringFinder::generate(&mut its, &config, &rule),
      MeteringResult::Nonterm
    ));
  }

  #[test]
  fn temp_var_instantiation() {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let t = vm.add_fresh_temporary_variable("t");
    let (mut its, start) = ItsProblem::with_start(vm, "f");
    let guard = Guard::new(vec![
      Relation::gt(Expr::var(x), Expr::zero()),
      Relation::le(Expr::var(t), Expr::int(4)),
    ]);
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::var(t));
    let rule = Rule::new_linear(start, guard, Expr::one(), start, update);
    its.add_rule(rule.clone());

    let config = Config::default();
    let instantiated =
        MeteringFinder::instantiate_temp_vars_heuristic(&its, &config, &rule).unwrap();
    // t was replaced by its bound in the update
    assert_eq!(
      instantiated.update(0).get(x).unwrap().clone(),
      (Expr::var(x) - Expr::int(4)).expand()
    );
  }

  #[test]
  fn strengthening_propagates_constant_updates() {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let y = vm.add_fresh_variable("y");
    let (mut its, start) = ItsProblem::with_start(vm, "f");
    let guard = Guard::new(vec![Relation::lt(Expr::var(x), Expr::var(y))]);
    let mut update = Substitution::new();
    update.put(x, Expr::int(5));
    let rule = Rule::new_linear(start, guard, Expr::one(), start, update);
    its.add_rule(rule.clone());

    let strengthened = MeteringFinder::strengthen_guard(&its, &rule).unwrap();
    assert!(strengthened.guard().contains(&Relation::lt(Expr::int(5), Expr::var(y))));
  }
}
