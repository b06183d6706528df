/*!

  Farkas' lemma turns the universally quantified implication
  `forall x. A*x <= b  =>  c*x <= delta` into the existentially quantified
  `exists l >= 0. l^T * A = c^T  and  l^T * b <= delta`, which a plain SMT
  query can discharge. Here `c` and `delta` may mention the unknown
  coefficients of a metering template, while `A` and `b` are rational
  constants taken from a rule's guard and update, so the generated formula
  is linear in all unknowns.

*/

use std::collections::{BTreeMap, BTreeSet};

use num_traits::Zero;

use crate::expr::{BoolExpr, Expr, Relation};
use crate::its::{VarType, VariableManager};
use crate::smt::linear::linear_form;
use crate::{Numeric, VariableIdx};

/// Applies the lemma. `premises` is the constraint system `A*x <= b`
/// (arbitrary linear inequalities over `vars` and possibly further
/// variables, whose conclusion coefficients are fixed to zero).
/// `target_coeffs[i]` is the conclusion coefficient of `vars[i]` and may
/// mention unknowns, as may `delta`. Returns `None` if a premise is not
/// linear.
pub fn farkas_apply(
  premises: &[Relation],
  vars: &[VariableIdx],
  target_coeffs: &[Expr],
  delta: Expr,
  vm: &mut VariableManager,
) -> Option<BoolExpr> {
  debug_assert_eq!(vars.len(), target_coeffs.len());

  // premise rows: coefficients and bound of `a * x <= b`; equalities
  // contribute both directions
  let mut rows: Vec<(BTreeMap<VariableIdx, Numeric>, Numeric)> = Vec::new();
  for premise in premises {
    let parts: Vec<Relation> = if premise.is_equality() {
      let (ge, le) = premise.split_equality();
      vec![ge, le]
    } else {
      vec![premise.clone()]
    };
    for part in parts {
      let term = part.to_leq_zero_term();
      let (coeffs, constant) = linear_form(&term)?;
      rows.push((coeffs, -constant));
    }
  }

  let lambdas: Vec<VariableIdx> = rows
      .iter()
      .map(|_| vm.fresh_untracked_symbol("lambda", VarType::Real))
      .collect();

  let mut conjuncts: Vec<BoolExpr> = Vec::new();
  for lambda in &lambdas {
    conjuncts.push(BoolExpr::Rel(Relation::ge(Expr::var(*lambda), Expr::zero())));
  }

  // every variable of the premises needs a coefficient; extras get zero
  let mut all_vars: BTreeSet<VariableIdx> = vars.iter().copied().collect();
  for (coeffs, _) in &rows {
    all_vars.extend(coeffs.keys().copied());
  }

  for var in &all_vars {
    let mut sum = Expr::zero();
    for (row, lambda) in rows.iter().zip(&lambdas) {
      let coefficient = row.0.get(var).cloned().unwrap_or_else(Numeric::zero);
      if !coefficient.is_zero() {
        sum = sum + Expr::num(coefficient) * Expr::var(*lambda);
      }
    }
    let target = match vars.iter().position(|v| v == var) {
      Some(index) => target_coeffs[index].clone(),
      None        => Expr::zero(),
    };
    conjuncts.push(BoolExpr::Rel(Relation::eq(sum, target)));
  }

  let mut bound_sum = Expr::zero();
  for (row, lambda) in rows.iter().zip(&lambdas) {
    if !row.1.is_zero() {
      bound_sum = bound_sum + Expr::num(row.1.clone()) * Expr::var(*lambda);
    }
  }
  conjuncts.push(BoolExpr::Rel(Relation::le(bound_sum, delta)));

  Some(BoolExpr::and(conjuncts))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::smt::{check_formula, SmtResult};

  #[test]
  fn derivable_conclusion() {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");

    // premise x >= 2, conclusion 1*x <= ... derivable for delta >= -2:
    // from -x <= -2 with lambda = 1 we get coefficients (-1) and bound -2,
    // so the conclusion -x <= -2 is derivable.
    let premises = vec![Relation::ge(Expr::var(x), Expr::int(2))];
    let formula = farkas_apply(
      &premises,
      &[x],
      &[Expr::int(-1)],
      Expr::int(-2),
      &mut vm,
    )
    .unwrap();
    assert_eq!(check_formula(&vm, &Config::default(), formula), SmtResult::Sat);

    // the conclusion -x <= -3 is not derivable from x >= 2
    let formula = farkas_apply(
      &premises,
      &[x],
      &[Expr::int(-1)],
      Expr::int(-3),
      &mut vm,
    )
    .unwrap();
    assert_ne!(check_formula(&vm, &Config::default(), formula), SmtResult::Sat);
  }

  #[test]
  fn nonlinear_premise_is_rejected() {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let premises = vec![Relation::ge(Expr::var(x) * Expr::var(x), Expr::zero())];
    assert!(farkas_apply(&premises, &[x], &[Expr::one()], Expr::zero(), &mut vm).is_none());
  }
}
