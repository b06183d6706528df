/*!

  Linear arithmetic over the rationals: constraint extraction from
  expressions, Fourier-Motzkin elimination with model reconstruction, and a
  small Gaussian solver for exact linear equation systems.

  Rational infeasibility is definitive, so `Infeasible` is a sound `Unsat`
  for the integer problems as well. A rational model is only a candidate for
  integer problems; the caller verifies and repairs it.

*/

use std::collections::{BTreeMap, BTreeSet};

use num_traits::{One, Signed, Zero};

use crate::expr::{Expr, RelOp, Relation};
use crate::{Numeric, VariableIdx};

/// Growth cap: elimination aborts once this many constraints accumulate.
const CONSTRAINT_CAP: usize = 4_000;

// region LinearConstraint

/// `sum(coeffs[v] * v) + constant >= 0`, or `> 0` when strict.
#[derive(Clone, Debug)]
pub struct LinearConstraint {
  pub coeffs  : BTreeMap<VariableIdx, Numeric>,
  pub constant: Numeric,
  pub strict  : bool,
}

impl LinearConstraint {
  fn is_ground(&self) -> bool {
    self.coeffs.is_empty()
  }

  fn holds_trivially(&self) -> bool {
    debug_assert!(self.is_ground());
    if self.strict {
      self.constant.is_positive()
    } else {
      !self.constant.is_negative()
    }
  }
}

/// Extracts `coeffs` and `constant` from a linear expression; `None` if the
/// expression is not linear.
pub fn linear_form(expr: &Expr) -> Option<(BTreeMap<VariableIdx, Numeric>, Numeric)> {
  let mut coeffs: BTreeMap<VariableIdx, Numeric> = BTreeMap::new();
  let mut constant = Numeric::zero();

  let expanded = expr.expand();
  let terms: Vec<Expr> = match expanded {
    Expr::Add(terms) => terms,
    other            => vec![other],
  };

  for term in terms {
    match term {
      Expr::Number(n) => constant += n,
      Expr::Var(v)    => {
        let entry = coeffs.entry(v).or_insert_with(Numeric::zero);
        *entry += Numeric::one();
      }
      Expr::Mul(factors) => {
        let mut coefficient = Numeric::one();
        let mut var = None;
        for factor in factors {
          match factor {
            Expr::Number(n)            => coefficient *= n,
            Expr::Var(v) if var.is_none() => var = Some(v),
            _                          => return None,
          }
        }
        match var {
          Some(v) => {
            let entry = coeffs.entry(v).or_insert_with(Numeric::zero);
            *entry += coefficient;
          }
          None    => constant += coefficient,
        }
      }
      _ => return None,
    }
  }
  coeffs.retain(|_, c| !c.is_zero());
  Some((coeffs, constant))
}

/// Converts a relation into `>= 0` constraints. Equalities yield two
/// constraints; disequalities are not representable and yield `None`.
/// When `integer_shift` is set, strict bounds are tightened by one, which is
/// exact for integer-valued terms.
pub fn constraints_of(relation: &Relation, integer_shift: bool) -> Option<Vec<LinearConstraint>> {
  let difference = relation.lhs().clone() - relation.rhs().clone();
  let (coeffs, constant) = linear_form(&difference)?;

  let integral = integer_shift
      && constant.is_integer()
      && coeffs.values().all(Numeric::is_integer);

  let make = |negate: bool, strict: bool| {
    let mut c = coeffs.clone();
    let mut k = constant.clone();
    if negate {
      for value in c.values_mut() {
        *value = -value.clone();
      }
      k = -k;
    }
    if strict && integral {
      // t > 0 over the integers is t - 1 >= 0
      LinearConstraint { coeffs: c, constant: k - Numeric::one(), strict: false }
    } else {
      LinearConstraint { coeffs: c, constant: k, strict }
    }
  };

  let result = match relation.op() {
    RelOp::Ge  => vec![make(false, false)],
    RelOp::Gt  => vec![make(false, true)],
    RelOp::Le  => vec![make(true, false)],
    RelOp::Lt  => vec![make(true, true)],
    RelOp::Eq  => vec![make(false, false), make(true, false)],
    RelOp::Neq => return None,
  };
  Some(result)
}

// endregion

// region Fourier-Motzkin

pub enum LinearResult {
  Infeasible,
  Model(BTreeMap<VariableIdx, Numeric>),
  /// The elimination grew beyond the cap; feasibility is undecided.
  TooBig,
}

/// Decides rational feasibility by variable elimination and reconstructs a
/// model by back-substitution, preferring integral values.
pub fn feasible(constraints: &[LinearConstraint]) -> LinearResult {
  let mut variables: BTreeSet<VariableIdx> = BTreeSet::new();
  for constraint in constraints {
    variables.extend(constraint.coeffs.keys().copied());
  }

  let mut current: Vec<LinearConstraint> = constraints.to_vec();
  let mut stages: Vec<(VariableIdx, Vec<LinearConstraint>)> = Vec::new();

  for var in &variables {
    let (with_var, mut rest): (Vec<_>, Vec<_>) =
        current.into_iter().partition(|c| c.coeffs.contains_key(var));

    // lower bounds have a positive coefficient, upper bounds a negative one
    let lowers: Vec<&LinearConstraint> =
        with_var.iter().filter(|c| c.coeffs[var].is_positive()).collect();
    let uppers: Vec<&LinearConstraint> =
        with_var.iter().filter(|c| c.coeffs[var].is_negative()).collect();

    for lower in &lowers {
      for upper in &uppers {
        let a = lower.coeffs[var].clone();
        let b = -upper.coeffs[var].clone();
        // b * lower + a * upper eliminates the variable
        let mut coeffs: BTreeMap<VariableIdx, Numeric> = BTreeMap::new();
        for (v, c) in &lower.coeffs {
          let entry = coeffs.entry(*v).or_insert_with(Numeric::zero);
          *entry += c * &b;
        }
        for (v, c) in &upper.coeffs {
          let entry = coeffs.entry(*v).or_insert_with(Numeric::zero);
          *entry += c * &a;
        }
        coeffs.retain(|_, c| !c.is_zero());
        debug_assert!(!coeffs.contains_key(var));
        let constant = &lower.constant * &b + &upper.constant * &a;
        rest.push(LinearConstraint {
          coeffs,
          constant,
          strict: lower.strict || upper.strict,
        });
        if rest.len() > CONSTRAINT_CAP {
          return LinearResult::TooBig;
        }
      }
    }

    stages.push((*var, with_var));
    current = rest;
  }

  for ground in &current {
    debug_assert!(ground.is_ground());
    if !ground.holds_trivially() {
      return LinearResult::Infeasible;
    }
  }

  // Back-substitution, in reverse elimination order. The constraints stored
  // for a stage only mention its own variable and later-eliminated ones.
  let mut model: BTreeMap<VariableIdx, Numeric> = BTreeMap::new();
  for (var, constraints) in stages.iter().rev() {
    let mut lower: Option<(Numeric, bool)> = None;
    let mut upper: Option<(Numeric, bool)> = None;

    for constraint in constraints {
      let coefficient = constraint.coeffs[var].clone();
      let mut rest = constraint.constant.clone();
      for (v, c) in &constraint.coeffs {
        if v != var {
          rest += c * model.get(v).cloned().unwrap_or_else(Numeric::zero);
        }
      }
      // coefficient * var + rest >= 0
      let bound = -rest / coefficient.clone();
      if coefficient.is_positive() {
        let tighter = match &lower {
          Some((value, strict)) => {
            bound > *value || (bound == *value && constraint.strict && !strict)
          }
          None                  => true,
        };
        if tighter {
          lower = Some((bound, constraint.strict));
        }
      } else {
        let tighter = match &upper {
          Some((value, strict)) => {
            bound < *value || (bound == *value && constraint.strict && !strict)
          }
          None                  => true,
        };
        if tighter {
          upper = Some((bound, constraint.strict));
        }
      }
    }

    model.insert(*var, pick_value(&lower, &upper));
  }

  LinearResult::Model(model)
}

/// Picks a value in the interval, preferring integers.
fn pick_value(lower: &Option<(Numeric, bool)>, upper: &Option<(Numeric, bool)>) -> Numeric {
  match (lower, upper) {
    (None, None)            => Numeric::zero(),
    (Some((lb, _)), None)   => lb.floor() + Numeric::one(),
    (None, Some((ub, _)))   => ub.ceil() - Numeric::one(),
    (Some((lb, lb_strict)), Some((ub, ub_strict))) => {
      let fits = |candidate: &Numeric| {
        let above = if *lb_strict { candidate > lb } else { candidate >= lb };
        let below = if *ub_strict { candidate < ub } else { candidate <= ub };
        above && below
      };
      for candidate in [lb.ceil(), lb.floor() + Numeric::one(), ub.floor(), ub.ceil() - Numeric::one()] {
        if fits(&candidate) {
          return candidate;
        }
      }
      (lb + ub) / Numeric::from_integer(2.into())
    }
  }
}

// endregion

// region Gaussian elimination

/// Solves `matrix * x = rhs` exactly. Free variables are set to zero;
/// `None` if the system is inconsistent.
pub fn gauss_solve(mut matrix: Vec<Vec<Numeric>>, mut rhs: Vec<Numeric>) -> Option<Vec<Numeric>> {
  let rows = matrix.len();
  if rows == 0 {
    return Some(Vec::new());
  }
  let cols = matrix[0].len();
  let mut pivot_of_col: Vec<Option<usize>> = vec![None; cols];
  let mut row = 0;

  for col in 0..cols {
    // find a pivot
    let pivot = (row..rows).find(|r| !matrix[*r][col].is_zero());
    let pivot = match pivot {
      Some(p) => p,
      None    => continue,
    };
    matrix.swap(row, pivot);
    rhs.swap(row, pivot);

    let scale = matrix[row][col].clone();
    for c in col..cols {
      matrix[row][c] = &matrix[row][c] / &scale;
    }
    rhs[row] = &rhs[row] / &scale;

    for r in 0..rows {
      if r != row && !matrix[r][col].is_zero() {
        let factor = matrix[r][col].clone();
        for c in col..cols {
          matrix[r][c] = &matrix[r][c] - &factor * &matrix[row][c];
        }
        rhs[r] = &rhs[r] - &factor * &rhs[row];
      }
    }

    pivot_of_col[col] = Some(row);
    row += 1;
    if row == rows {
      break;
    }
  }

  // inconsistent row: 0 = nonzero
  for r in row..rows {
    if matrix[r].iter().all(Numeric::is_zero) && !rhs[r].is_zero() {
      return None;
    }
  }

  let mut solution = vec![Numeric::zero(); cols];
  for col in 0..cols {
    if let Some(r) = pivot_of_col[col] {
      solution[col] = rhs[r].clone();
    }
  }
  Some(solution)
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;

  fn int(value: i64) -> Numeric {
    Numeric::from_integer(value.into())
  }

  #[test]
  fn linear_form_extraction() {
    // 2x - 3y + 5
    let expr = Expr::int(2) * Expr::var(0) - Expr::int(3) * Expr::var(1) + Expr::int(5);
    let (coeffs, constant) = linear_form(&expr).unwrap();
    assert_eq!(coeffs[&0], int(2));
    assert_eq!(coeffs[&1], int(-3));
    assert_eq!(constant, int(5));
    assert!(linear_form(&(Expr::var(0) * Expr::var(1))).is_none());
  }

  #[test]
  fn infeasible_system() {
    // x >= 1 and x <= 0
    let a = constraints_of(&Relation::ge(Expr::var(0), Expr::one()), true).unwrap();
    let b = constraints_of(&Relation::le(Expr::var(0), Expr::zero()), true).unwrap();
    let all: Vec<_> = a.into_iter().chain(b).collect();
    assert!(matches!(feasible(&all), LinearResult::Infeasible));
  }

  #[test]
  fn model_reconstruction() {
    // 1 <= x, x <= 3, y >= x + 1
    let mut all = Vec::new();
    all.extend(constraints_of(&Relation::ge(Expr::var(0), Expr::one()), true).unwrap());
    all.extend(constraints_of(&Relation::le(Expr::var(0), Expr::int(3)), true).unwrap());
    all.extend(
      constraints_of(&Relation::ge(Expr::var(1), Expr::var(0) + Expr::one()), true).unwrap(),
    );
    match feasible(&all) {
      LinearResult::Model(model) => {
        assert!(model[&0] >= int(1) && model[&0] <= int(3));
        assert!(model[&1] >= &model[&0] + int(1));
      }
      _ => panic!("expected a model"),
    }
  }

  #[test]
  fn strict_bounds_over_rationals() {
    // x > 0 and x < 1 without integer shift: feasible over the rationals
    let mut all = Vec::new();
    all.extend(constraints_of(&Relation::gt(Expr::var(0), Expr::zero()), false).unwrap());
    all.extend(constraints_of(&Relation::lt(Expr::var(0), Expr::one()), false).unwrap());
    match feasible(&all) {
      LinearResult::Model(model) => {
        assert!(model[&0] > int(0) && model[&0] < int(1));
      }
      _ => panic!("expected a model"),
    }

    // with the integer shift the same system is infeasible
    let mut shifted = Vec::new();
    shifted.extend(constraints_of(&Relation::gt(Expr::var(0), Expr::zero()), true).unwrap());
    shifted.extend(constraints_of(&Relation::lt(Expr::var(0), Expr::one()), true).unwrap());
    assert!(matches!(feasible(&shifted), LinearResult::Infeasible));
  }

  #[test]
  fn gauss_solves_unique_system() {
    // x + y = 3, x - y = 1  =>  x = 2, y = 1
    let matrix = vec![vec![int(1), int(1)], vec![int(1), int(-1)]];
    let rhs = vec![int(3), int(1)];
    let solution = gauss_solve(matrix, rhs).unwrap();
    assert_eq!(solution, vec![int(2), int(1)]);

    // inconsistent: x + y = 1, x + y = 2
    let matrix = vec![vec![int(1), int(1)], vec![int(1), int(1)]];
    assert!(gauss_solve(matrix, vec![int(1), int(2)]).is_none());
  }
}
