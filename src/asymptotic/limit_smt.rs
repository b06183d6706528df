/*!

  Direct SMT encoding of polynomial limit problems: every variable is
  instantiated by a linear template `a*n + b`, and each tagged expression
  becomes a coefficient-wise sign condition that is sufficient for its
  direction. Target cost degrees are tried from high to low, so the first
  satisfiable encoding realises the best complexity this encoding can show.

*/

use std::collections::BTreeMap;

use crate::complexity::Complexity;
use crate::config::Config;
use crate::expr::{BoolExpr, Expr, Relation, Substitution};
use crate::its::{ItsProblem, VarType};
use crate::smt::{SmtResult, Solver};
use crate::VariableIdx;

use super::limit_problem::LimitProblem;
use super::limit_vector::Direction;

/// Coefficient-wise conditions that force a polynomial in `n` into the
/// given direction for all sufficiently large `n`.
fn direction_conditions(poly_in_n: &Expr, n: VariableIdx, dir: Direction, target_degree: u32) -> Option<Vec<BoolExpr>> {
  if !poly_in_n.is_polynomial_in(n) {
    return None;
  }
  let degree = poly_in_n.degree(n);
  let mut conditions = Vec::new();

  match dir {
    Direction::Pos => {
      // nonnegative coefficients with a positive absolute one
      for d in 1..=degree {
        conditions.push(BoolExpr::Rel(Relation::ge(poly_in_n.coeff(n, d), Expr::zero())));
      }
      conditions.push(BoolExpr::Rel(Relation::ge(poly_in_n.coeff(n, 0), Expr::one())));
    }
    // the constant directions must stay bounded, so the slope vanishes
    Direction::PosCons => {
      for d in 1..=degree {
        conditions.push(BoolExpr::Rel(Relation::eq(poly_in_n.coeff(n, d), Expr::zero())));
      }
      conditions.push(BoolExpr::Rel(Relation::ge(poly_in_n.coeff(n, 0), Expr::one())));
    }
    Direction::NegCons => {
      for d in 1..=degree {
        conditions.push(BoolExpr::Rel(Relation::eq(poly_in_n.coeff(n, d), Expr::zero())));
      }
      conditions.push(BoolExpr::Rel(Relation::le(poly_in_n.coeff(n, 0), -Expr::one())));
    }
    Direction::PosInf => {
      if degree < target_degree {
        return None;
      }
      for d in 0..=degree {
        conditions.push(BoolExpr::Rel(Relation::ge(poly_in_n.coeff(n, d), Expr::zero())));
      }
      conditions.push(BoolExpr::Rel(Relation::ge(poly_in_n.coeff(n, target_degree), Expr::one())));
    }
    Direction::NegInf => {
      for d in 0..degree {
        conditions.push(BoolExpr::Rel(Relation::le(poly_in_n.coeff(n, d), Expr::zero())));
      }
      if degree == 0 {
        return None;
      }
      conditions.push(BoolExpr::Rel(Relation::le(poly_in_n.coeff(n, degree), -Expr::one())));
    }
  }
  Some(conditions)
}

/// Tries to find a linear substitution realising a cost of degree at least
/// `target_degree` in `n`. When `freeze_program_vars` is set, non-temporary
/// variables are restricted to constants; solutions found that way witness
/// unbounded cost, since only under-specified temporaries grow.
fn encode_for_degree(
  its: &mut ItsProblem,
  config: &Config,
  problem: &LimitProblem,
  target_degree: u32,
  freeze_program_vars: bool,
) -> Option<Substitution> {
  let n = problem.n();
  let variables: Vec<VariableIdx> = problem.variables().into_iter().collect();

  // linear template per variable
  let mut template = Substitution::new();
  let mut coefficients: BTreeMap<VariableIdx, (Option<VariableIdx>, VariableIdx)> = BTreeMap::new();
  for var in &variables {
    let b = its.fresh_untracked_symbol("b", VarType::Int);
    if freeze_program_vars && !its.is_temp_var(*var) {
      coefficients.insert(*var, (None, b));
      template.put(*var, Expr::var(b));
    } else {
      let a = its.fresh_untracked_symbol("a", VarType::Int);
      coefficients.insert(*var, (Some(a), b));
      template.put(*var, Expr::var(a) * Expr::var(n) + Expr::var(b));
    }
  }

  let mut formula: Vec<BoolExpr> = Vec::new();
  for ex in problem.expressions() {
    let instantiated = ex.expr.subs(&template).expand();
    let wanted = if ex.dir == Direction::PosInf { target_degree } else { 0 };
    let conditions = direction_conditions(&instantiated, n, ex.dir, wanted)?;
    formula.extend(conditions);
  }

  let mut solver = Solver::new(its.var_manager(), config);
  solver.set_timeout(std::time::Duration::from_millis(config.smt_timeout_ms));
  for part in formula {
    solver.add(part);
  }
  if solver.check() != SmtResult::Sat {
    return None;
  }

  let model = solver.model();
  let mut solution = Substitution::new();
  for var in &variables {
    let (a, b) = coefficients[var].clone();
    let slope = match a {
      Some(a) => Expr::num(model.get(a)),
      None    => Expr::zero(),
    };
    let value = (slope * Expr::var(n) + Expr::num(model.get(b))).expand();
    solution.put(*var, value);
  }
  Some(solution)
}

/// Entry point: solves a polynomial limit problem by the template
/// encoding, aiming above `current_res`. The cost expression determines
/// the highest degree worth trying.
pub fn apply_encoding(
  its: &mut ItsProblem,
  config: &Config,
  problem: &LimitProblem,
  cost: &Expr,
  current_res: Complexity,
) -> Option<Substitution> {
  if !problem.is_polynomial() || !cost.is_polynomial() {
    return None;
  }

  // a linear template cannot push the degree beyond the cost's own degree
  let max_degree = cost.max_degree().max(1);
  for degree in (1..=max_degree).rev() {
    // prefer solutions where only temporaries grow: they witness
    // unbounded cost, the strongest possible verdict
    if let Some(solution) = encode_for_degree(its, config, problem, degree, true) {
      return Some(solution);
    }
    if Complexity::Poly(degree) <= current_res {
      break;
    }
    if let Some(solution) = encode_for_degree(its, config, problem, degree, false) {
      return Some(solution);
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::Guard;
  use crate::its::VariableManager;

  #[test]
  fn linear_cost_is_realised() {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, _) = ItsProblem::with_start(vm, "f");
    let n = its.add_fresh_variable("n");

    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]).normalized();
    let problem = LimitProblem::new(&guard, Some(&Expr::var(x)), n);

    let config = Config::default();
    let solution = apply_encoding(&mut its, &config, &problem, &Expr::var(x), Complexity::Const)
        .expect("encoding should succeed");
    // x grows linearly in n
    let mapped = solution.get(x).unwrap().clone();
    assert_eq!(mapped.degree(n), 1);
  }

  #[test]
  fn respects_current_result() {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, _) = ItsProblem::with_start(vm, "f");
    let n = its.add_fresh_variable("n");

    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]).normalized();
    let problem = LimitProblem::new(&guard, Some(&Expr::var(x)), n);

    let config = Config::default();
    // a linear cost cannot beat an already-known linear bound
    assert!(apply_encoding(&mut its, &config, &problem, &Expr::var(x), Complexity::Poly(1))
        .is_none());
  }
}
