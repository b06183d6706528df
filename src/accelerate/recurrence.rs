/*!

  Closes the update and cost of a linear self-loop under an iteration
  counter `n`: each updated variable is expressed as a function of the
  initial values and `n`, and the accumulated cost becomes a function of
  `n`. Updates must be triangular (a variable may depend on itself and on
  variables solved earlier in a topological order of the update graph);
  cyclic dependencies and shapes outside the supported recurrences fail.

  Temporary variables are treated as loop constants. For a lower bound this
  is sound: it restricts attention to the executions that pick the same
  value in every iteration.

*/

use std::collections::{BTreeMap, BTreeSet};

use num_traits::{One, ToPrimitive, Zero};

use crate::expr::{Expr, Substitution};
use crate::its::Rule;
use crate::{Numeric, VariableIdx};

#[derive(Clone, Debug)]
pub struct RecurrenceResult {
  /// Closed-form update: every updated variable as a function of the
  /// initial values and `n`.
  pub update        : Substitution,
  /// Accumulated cost of `n` iterations.
  pub cost          : Expr,
  /// The closed forms are sound for `n >= validity_bound`.
  pub validity_bound: u32,
}

/// Power sums `sum(k^d for k in 0..n)` for `d <= 8`, with exact rational
/// coefficients (Faulhaber).
fn faulhaber(degree: u32, n: &Expr) -> Option<Expr> {
  let r = |num: i64, den: i64| Expr::num(Numeric::new(num.into(), den.into()));
  let p = |e: u32| Expr::pow(n.clone(), Expr::int(e as i64));
  let result = match degree {
    0 => n.clone(),
    1 => r(1, 2) * p(2) + r(-1, 2) * n.clone(),
    2 => r(1, 3) * p(3) + r(-1, 2) * p(2) + r(1, 6) * n.clone(),
    3 => r(1, 4) * p(4) + r(-1, 2) * p(3) + r(1, 4) * p(2),
    4 => r(1, 5) * p(5) + r(-1, 2) * p(4) + r(1, 3) * p(3) + r(-1, 30) * n.clone(),
    5 => r(1, 6) * p(6) + r(-1, 2) * p(5) + r(5, 12) * p(4) + r(-1, 12) * p(2),
    6 => {
      r(1, 7) * p(7) + r(-1, 2) * p(6) + r(1, 2) * p(5) + r(-1, 6) * p(3)
          + r(1, 42) * n.clone()
    }
    7 => {
      r(1, 8) * p(8) + r(-1, 2) * p(7) + r(7, 12) * p(6) + r(-7, 24) * p(4)
          + r(1, 12) * p(2)
    }
    8 => {
      r(1, 9) * p(9) + r(-1, 2) * p(8) + r(2, 3) * p(7) + r(-7, 15) * p(5)
          + r(2, 9) * p(3) + r(-1, 30) * n.clone()
    }
    _ => return None,
  };
  Some(result)
}

/// `sum(f(k) for k in 0..n)`, where `f` is expressed in the variable `n`
/// itself. Supported summands: terms free of `n`, polynomial terms `k^d`
/// with `d <= 8`, and geometric terms `b^k` with a rational base.
fn symbolic_sum(f: &Expr, n: VariableIdx) -> Option<Expr> {
  let expanded = f.expand();
  let terms: Vec<Expr> = match expanded {
    Expr::Add(terms) => terms,
    other            => vec![other],
  };

  let n_expr = Expr::var(n);
  let mut result = Expr::zero();

  for term in terms {
    let factors: Vec<Expr> = match term {
      Expr::Mul(factors) => factors,
      other              => vec![other],
    };

    let mut coefficient: Vec<Expr> = Vec::new();
    let mut degree: u32 = 0;
    let mut geometric_base: Option<Numeric> = None;

    for factor in factors {
      if !factor.contains_var(n) {
        coefficient.push(factor);
        continue;
      }
      match &factor {
        Expr::Var(_) => degree += 1,
        Expr::Pow(base, exponent) => {
          match (base.as_ref(), exponent.as_ref()) {
            (Expr::Var(v), Expr::Number(d)) if *v == n && d.is_integer() => {
              degree += d.to_integer().to_u32()?;
            }
            (Expr::Number(b), Expr::Var(v)) if *v == n => {
              let base = match geometric_base {
                Some(existing) => existing * b.clone(),
                None           => b.clone(),
              };
              geometric_base = Some(base);
            }
            _ => return None,
          }
        }
        _ => return None,
      }
    }

    let coefficient = Expr::mul_factors(coefficient);
    let summed = match (degree, geometric_base) {
      (0, None)       => coefficient * n_expr.clone(),
      (d, None)       => coefficient * faulhaber(d, &n_expr)?,
      (0, Some(base)) => {
        if base.is_one() {
          coefficient * n_expr.clone()
        } else {
          // sum of b^k is (b^n - 1) / (b - 1)
          let scale = Expr::num((base.clone() - Numeric::one()).recip());
          coefficient
              * scale
              * (Expr::pow(Expr::num(base), n_expr.clone()) - Expr::one())
        }
      }
      (_, Some(_))    => return None,
    };
    result = result + summed;
  }

  Some(result)
}

/// Splits an update right-hand side into `c * var + rest` with a rational
/// constant `c`; fails for nonlinear self-dependencies.
fn self_coefficient(expr: &Expr, var: VariableIdx) -> Option<(Numeric, Expr)> {
  if !expr.is_polynomial_in(var) || expr.degree(var) > 1 {
    return None;
  }
  let coefficient = expr.coeff(var, 1);
  let c = coefficient.as_number()?.clone();
  let rest = (expr.clone() - Expr::num(c.clone()) * Expr::var(var)).expand();
  Some((c, rest))
}

/// Orders the updated variables so that dependencies come first; `None` on
/// cyclic dependencies between distinct variables.
fn topological_order(update: &Substitution) -> Option<Vec<VariableIdx>> {
  let domain: BTreeSet<VariableIdx> = update.domain().collect();
  let mut order: Vec<VariableIdx> = Vec::new();
  let mut placed: BTreeSet<VariableIdx> = BTreeSet::new();

  let mut remaining: Vec<VariableIdx> = domain.iter().copied().collect();
  while !remaining.is_empty() {
    let mut progress = false;
    remaining.retain(|var| {
      let value = update.get(*var).unwrap();
      let ready = value
          .variables()
          .into_iter()
          .all(|dep| dep == *var || !domain.contains(&dep) || placed.contains(&dep));
      if ready {
        order.push(*var);
        placed.insert(*var);
        progress = true;
      }
      !ready
    });
    if !progress {
      return None;
    }
  }
  Some(order)
}

/// Computes closed forms for a linear simple loop under the fresh counter
/// `n`. Returns `None` when the update or the cost is outside the supported
/// fragment.
pub fn iterate_rule(rule: &Rule, n: VariableIdx) -> Option<RecurrenceResult> {
  debug_assert!(rule.is_linear());
  let update = rule.update(0);
  if rule.cost().has_nonterm() {
    return None;
  }

  let order = topological_order(update)?;
  let n_expr = Expr::var(n);
  let mut closed: BTreeMap<VariableIdx, Expr> = BTreeMap::new();

  for var in order {
    let value = update.get(var).unwrap();
    let (c, rest) = self_coefficient(value, var)?;

    // Express the inhomogeneous part as a function of the iteration index
    // by substituting the closed forms of already-solved variables.
    let mut sigma = Substitution::new();
    for (dep, form) in &closed {
      sigma.put(*dep, form.clone());
    }
    let rest_k = rest.subs(&sigma);

    let x0 = Expr::var(var);
    let form = if c.is_one() {
      // x(n) = x0 + sum of rest(k)
      x0 + symbolic_sum(&rest_k, n)?
    } else if c.is_zero() {
      // constant update: x(n) = rest(n - 1)
      if rest_k.contains_var(n) {
        let shifted = Substitution::single(n, n_expr.clone() - Expr::one());
        rest_k.subs(&shifted)
      } else {
        rest_k
      }
    } else {
      // x(n) = c^n * (x0 - q) + q with the fixed point q = rest / (1 - c),
      // which requires rest to be constant over the iterations
      if rest_k.contains_var(n) {
        return None;
      }
      let q = Expr::num((Numeric::one() - c.clone()).recip()) * rest_k;
      let power = Expr::pow(Expr::num(c), n_expr.clone());
      power * (x0 - q.clone()) + q
    };
    closed.insert(var, form.expand());
  }

  // Disallow dependencies on constant-update variables: their closed form
  // is undefined at iteration zero, which the cost sum below relies on.
  for (var, _) in &closed {
    let value = update.get(*var).unwrap();
    let (c, _) = self_coefficient(value, *var)?;
    if c.is_zero() {
      for (other, _) in &closed {
        if other != var && update.get(*other).unwrap().contains_var(*var) {
          return None;
        }
      }
    }
  }

  let mut sigma = Substitution::new();
  for (var, form) in &closed {
    sigma.put(*var, form.clone());
  }
  let cost_k = rule.cost().subs(&sigma);
  let iterated_cost = symbolic_sum(&cost_k, n)?;

  let mut result_update = Substitution::new();
  for (var, form) in closed {
    result_update.put(var, form);
  }

  Some(RecurrenceResult {
    update        : result_update,
    cost          : iterated_cost.expand(),
    validity_bound: 1,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::{Guard, Relation};

  const X: VariableIdx = 0;
  const Y: VariableIdx = 1;
  const N: VariableIdx = 5;

  fn loop_rule(update: Substitution, cost: Expr) -> Rule {
    let guard = Guard::new(vec![Relation::gt(Expr::var(X), Expr::zero())]);
    Rule::new_linear(0, guard, cost, 0, update)
  }

  #[test]
  fn counting_loop() {
    let mut update = Substitution::new();
    update.put(X, Expr::var(X) - Expr::one());
    let result = iterate_rule(&loop_rule(update, Expr::one()), N).unwrap();

    assert_eq!(
      result.update.get(X).unwrap().clone(),
      (Expr::var(X) - Expr::var(N)).expand()
    );
    assert_eq!(result.cost, Expr::var(N));
    assert_eq!(result.validity_bound, 1);
  }

  #[test]
  fn doubling_loop() {
    let mut update = Substitution::new();
    update.put(X, Expr::int(2) * Expr::var(X));
    let result = iterate_rule(&loop_rule(update, Expr::var(X)), N).unwrap();

    // x(n) = 2^n * x
    let expected = (Expr::pow(Expr::int(2), Expr::var(N)) * Expr::var(X)).expand();
    assert_eq!(result.update.get(X).unwrap().clone(), expected);
    // cost is sum of 2^k * x = (2^n - 1) * x
    let cost = ((Expr::pow(Expr::int(2), Expr::var(N)) - Expr::one()) * Expr::var(X)).expand();
    assert_eq!(result.cost, cost);
  }

  #[test]
  fn triangular_update() {
    // y := y - 1; x := x + y  gives  x(n) = x + y*n - n(n-1)/2
    let mut update = Substitution::new();
    update.put(Y, Expr::var(Y) - Expr::one());
    update.put(X, Expr::var(X) + Expr::var(Y));
    let result = iterate_rule(&loop_rule(update, Expr::one()), N).unwrap();

    let half = Expr::num(Numeric::new(1.into(), 2.into()));
    let expected = (Expr::var(X) + Expr::var(Y) * Expr::var(N)
        - half.clone() * Expr::pow(Expr::var(N), Expr::int(2))
        + half * Expr::var(N))
        .expand();
    assert_eq!(result.update.get(X).unwrap().clone(), expected);
  }

  #[test]
  fn cyclic_update_fails() {
    // x := y; y := x is a cycle between distinct variables
    let mut update = Substitution::new();
    update.put(X, Expr::var(Y));
    update.put(Y, Expr::var(X));
    assert!(iterate_rule(&loop_rule(update, Expr::one()), N).is_none());
  }

  #[test]
  fn quadratic_cost() {
    // x := x - 1 with cost x: sum of (x - k) = x*n - n(n-1)/2
    let mut update = Substitution::new();
    update.put(X, Expr::var(X) - Expr::one());
    let result = iterate_rule(&loop_rule(update, Expr::var(X)), N).unwrap();

    let half = Expr::num(Numeric::new(1.into(), 2.into()));
    let expected = (Expr::var(X) * Expr::var(N)
        - half.clone() * Expr::pow(Expr::var(N), Expr::int(2))
        + half * Expr::var(N))
        .expand();
    assert_eq!(result.cost, expected);
  }
}
