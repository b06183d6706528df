/*!

  Rule preprocessing: guard simplification by syntactic implication,
  removal of trivial updates, and elimination of temporary variables by
  equality propagation and transitive elimination. The full pass also runs
  SMT queries; the fast variant is purely syntactic.

*/

use std::collections::BTreeSet;

use log::debug;
use num_traits::One;

use crate::config::Config;
use crate::Numeric;
use crate::expr::{Expr, Guard, RelOp, Relation, Substitution};
use crate::its::{ItsProblem, Rule};
use crate::smt::linear::linear_form;
use crate::smt::{self, SmtResult};
use crate::VariableIdx;

pub struct Preprocess;

impl Preprocess {
  /// The main preprocessing pass; involves SMT queries. Returns the
  /// simplified rule, or `None` if nothing changed.
  pub fn preprocess_rule(its: &ItsProblem, config: &Config, rule: &Rule) -> Option<Rule> {
    let mut changed = false;
    let mut current = rule.clone();

    if let Some(simplified) = Self::eliminate_temp_vars(its, &current) {
      current = simplified;
      changed = true;
    }
    if let Some(simplified) = Self::remove_trivial_updates(&current) {
      current = simplified;
      changed = true;
    }
    if let Some(simplified) = Self::simplify_guard(&current) {
      current = simplified;
      changed = true;
    }
    if let Some(simplified) = Self::simplify_guard_by_smt(its, config, &current) {
      current = simplified;
      changed = true;
    }

    if changed {
      Some(current)
    } else {
      None
    }
  }

  /// The cheap variant without SMT queries.
  pub fn simplify_rule(its: &ItsProblem, rule: &Rule) -> Option<Rule> {
    let mut changed = false;
    let mut current = rule.clone();

    if let Some(simplified) = Self::eliminate_temp_vars(its, &current) {
      current = simplified;
      changed = true;
    }
    if let Some(simplified) = Self::remove_trivial_updates(&current) {
      current = simplified;
      changed = true;
    }
    if let Some(simplified) = Self::simplify_guard(&current) {
      current = simplified;
      changed = true;
    }

    if changed {
      Some(current)
    } else {
      None
    }
  }

  /// Drops trivially true constraints and constraints syntactically implied
  /// by another one (`x > 1` implies `x > 0`). Quadratic, no SMT.
  pub fn simplify_guard(rule: &Rule) -> Option<Rule> {
    let guard = rule.guard();
    let mut keep: Vec<Relation> = Vec::new();
    let mut changed = false;

    'outer: for (index, relation) in guard.iter().enumerate() {
      if relation.is_trivially_true() {
        changed = true;
        continue;
      }
      if relation.op().is_inequality() {
        let normalized = relation.normalize_inequality();
        for (other_index, other) in guard.iter().enumerate() {
          if other_index == index || !other.op().is_inequality() {
            continue;
          }
          if implies_syntactically(&other.normalize_inequality(), &normalized)
              && (other_index < index || !implies_syntactically(&normalized, &other.normalize_inequality()))
          {
            changed = true;
            continue 'outer;
          }
        }
      }
      if keep.contains(relation) {
        changed = true;
        continue;
      }
      keep.push(relation.clone());
    }

    if changed {
      Some(rule.with_guard(Guard::new(keep)))
    } else {
      None
    }
  }

  /// Drops constraints implied by the rest of the guard, checked by SMT.
  fn simplify_guard_by_smt(its: &ItsProblem, config: &Config, rule: &Rule) -> Option<Rule> {
    let guard = rule.guard();
    if guard.len() < 2 {
      return None;
    }
    let mut keep: Vec<Relation> = guard.iter().cloned().collect();
    let mut changed = false;

    let mut index = 0;
    while index < keep.len() {
      if keep.len() < 2 {
        break;
      }
      let candidate = keep[index].clone();
      if candidate.op() == RelOp::Neq {
        index += 1;
        continue;
      }
      let mut rest = Guard::new(keep.clone());
      rest.remove(index);
      if smt::is_implication(its.var_manager(), config, &rest, &candidate) {
        debug!("guard constraint {} is implied, dropping", candidate);
        keep.remove(index);
        changed = true;
      } else {
        index += 1;
      }
    }

    if changed {
      Some(rule.with_guard(Guard::new(keep)))
    } else {
      None
    }
  }

  /// Removes updates of the form `x := x`.
  pub fn remove_trivial_updates(rule: &Rule) -> Option<Rule> {
    let mut changed = false;
    let mut current = rule.clone();
    for index in 0..rule.rhs_count() {
      let mut update = rule.update(index).clone();
      if update.remove_identities() {
        current = current.with_update(index, update);
        changed = true;
      }
    }
    if changed {
      Some(current)
    } else {
      None
    }
  }

  /// Eliminates temporary variables by equality propagation (`t == 2*x`
  /// allows substituting `t`) and transitive elimination (`a <= t <= b`
  /// becomes `a <= b` when `t` occurs nowhere else).
  pub fn eliminate_temp_vars(its: &ItsProblem, rule: &Rule) -> Option<Rule> {
    let mut changed = false;
    let mut current = rule.clone();

    // equality propagation
    loop {
      let mut found: Option<(usize, VariableIdx, Expr)> = None;
      for (index, relation) in current.guard().iter().enumerate() {
        if !relation.is_equality() {
          continue;
        }
        let difference = (relation.lhs().clone() - relation.rhs().clone()).expand();
        if let Some((coeffs, constant)) = linear_form(&difference) {
          let candidate = coeffs.iter().find(|(v, c)| {
            its.is_temp_var(**v) && (c.is_one() || **c == -Numeric::one())
          });
          if let Some((var, coefficient)) = candidate {
            let var = *var;
            // solve difference = 0 for var
            let mut solution = Expr::zero();
            for (v, c) in &coeffs {
              if *v != var {
                solution = solution + Expr::num(-c.clone()) * Expr::var(*v);
              }
            }
            solution = solution + Expr::num(-constant.clone());
            if !coefficient.is_one() {
              solution = -solution;
            }
            found = Some((index, var, solution.expand()));
            break;
          }
        }
      }

      match found {
        Some((index, var, solution)) => {
          let mut guard = current.guard().clone();
          guard.remove(index);
          let sigma = Substitution::single(var, solution);
          current = current.with_guard(guard).subs(&sigma);
          changed = true;
        }
        None => break,
      }
    }

    // transitive elimination of temporaries that only bound each other
    let temp_only_in_guard: Vec<VariableIdx> = {
      let mut guard_vars: BTreeSet<VariableIdx> = BTreeSet::new();
      current.guard().collect_variables(&mut guard_vars);
      let mut elsewhere: BTreeSet<VariableIdx> = BTreeSet::new();
      current.cost().collect_variables(&mut elsewhere);
      for rhs in current.rhss() {
        rhs.collect_variables(&mut elsewhere);
      }
      guard_vars
          .into_iter()
          .filter(|v| its.is_temp_var(*v) && !elsewhere.contains(v))
          .collect()
    };

    for var in temp_only_in_guard {
      let mut lowers: Vec<Expr> = Vec::new();
      let mut uppers: Vec<Expr> = Vec::new();
      let mut rest: Vec<Relation> = Vec::new();
      let mut eligible = true;

      for relation in current.guard() {
        if !relation.variables().contains(&var) {
          rest.push(relation.clone());
          continue;
        }
        if !relation.op().is_inequality() {
          eligible = false;
          break;
        }
        // bring into t <= 0 form and solve for var with unit coefficient
        let term = relation.to_leq_zero_term();
        match linear_form(&term) {
          Some((coeffs, constant)) => {
            let coefficient = match coeffs.get(&var) {
              Some(c) => c.clone(),
              None    => {
                eligible = false;
                break;
              }
            };
            let mut other = Expr::num(constant);
            for (v, c) in &coeffs {
              if *v != var {
                other = other + Expr::num(c.clone()) * Expr::var(*v);
              }
            }
            if coefficient.is_one() {
              // var + other <= 0, so var <= -other
              uppers.push((-other).expand());
            } else if coefficient == -Numeric::one() {
              // -var + other <= 0, so var >= other
              lowers.push(other.expand());
            } else {
              eligible = false;
              break;
            }
          }
          None => {
            eligible = false;
            break;
          }
        }
      }

      if !eligible {
        continue;
      }
      for lower in &lowers {
        for upper in &uppers {
          rest.push(Relation::le(lower.clone(), upper.clone()));
        }
      }
      current = current.with_guard(Guard::new(rest));
      changed = true;
    }

    if changed {
      Some(current)
    } else {
      None
    }
  }

  /// Appends `cost >= 0` to the guard unless trivially implied.
  pub fn ensure_nonnegative_cost(rule: &Rule) -> Option<Rule> {
    let constraint = Relation::ge(rule.cost().clone(), Expr::zero());
    if rule.cost().is_nonterm() || constraint.is_trivially_true() || rule.guard().contains(&constraint) {
      return None;
    }
    let mut guard = rule.guard().clone();
    guard.push(constraint);
    Some(rule.with_guard(guard))
  }
}

/// `a > 0` implies `b > 0` syntactically when `b - a` is a non-negative
/// constant (both in the `t > 0` normal form).
fn implies_syntactically(premise: &Relation, conclusion: &Relation) -> bool {
  let difference = (conclusion.lhs().clone() - premise.lhs().clone()).expand();
  match difference.as_number() {
    Some(value) => !num_traits::Signed::is_negative(value),
    None        => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::its::VariableManager;

  fn its_with_temp() -> (ItsProblem, usize, usize, usize) {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let t = vm.add_fresh_temporary_variable("t");
    let (its, start) = ItsProblem::with_start(vm, "f");
    (its, start, x, t)
  }

  #[test]
  fn implied_constraints_are_dropped() {
    let (_, start, x, _) = its_with_temp();
    let guard = Guard::new(vec![
      Relation::gt(Expr::var(x), Expr::one()),
      Relation::gt(Expr::var(x), Expr::zero()),
      Relation::ge(Expr::var(x) + Expr::one(), Expr::var(x)),
    ]);
    let rule = Rule::new_linear(start, guard, Expr::one(), start, Substitution::new());
    let simplified = Preprocess::simplify_guard(&rule).unwrap();
    assert_eq!(simplified.guard().len(), 1);
    assert_eq!(simplified.guard()[0], Relation::gt(Expr::var(x), Expr::one()));
  }

  #[test]
  fn simplification_is_idempotent() {
    let (_, start, x, _) = its_with_temp();
    let guard = Guard::new(vec![
      Relation::gt(Expr::var(x), Expr::one()),
      Relation::gt(Expr::var(x), Expr::zero()),
    ]);
    let rule = Rule::new_linear(start, guard, Expr::one(), start, Substitution::new());
    let once = Preprocess::simplify_guard(&rule).unwrap();
    assert!(Preprocess::simplify_guard(&once).is_none());
  }

  #[test]
  fn equality_propagation_removes_temporaries() {
    let (its, start, x, t) = its_with_temp();
    // t == 2x, x > t
    let guard = Guard::new(vec![
      Relation::eq(Expr::var(t), Expr::int(2) * Expr::var(x)),
      Relation::gt(Expr::var(x), Expr::var(t)),
    ]);
    let rule = Rule::new_linear(start, guard, Expr::one(), start, Substitution::new());
    let simplified = Preprocess::eliminate_temp_vars(&its, &rule).unwrap();
    assert!(!simplified.variables().contains(&t));
  }

  #[test]
  fn transitive_elimination() {
    let (its, start, x, t) = its_with_temp();
    // x <= t, t <= 10 and t occurs nowhere else: becomes x <= 10
    let guard = Guard::new(vec![
      Relation::le(Expr::var(x), Expr::var(t)),
      Relation::le(Expr::var(t), Expr::int(10)),
    ]);
    let rule = Rule::new_linear(start, guard, Expr::one(), start, Substitution::new());
    let simplified = Preprocess::eliminate_temp_vars(&its, &rule).unwrap();
    assert!(!simplified.variables().contains(&t));
    assert!(simplified.guard().contains(&Relation::le(Expr::var(x), Expr::int(10))));
  }

  #[test]
  fn trivial_updates_are_removed() {
    let (_, start, x, _) = its_with_temp();
    let mut update = Substitution::new();
    update.put(x, Expr::var(x));
    let rule = Rule::new_linear(start, Guard::empty(), Expr::one(), start, update);
    let simplified = Preprocess::remove_trivial_updates(&rule).unwrap();
    assert!(simplified.update(0).is_empty());
  }

  #[test]
  fn cost_constraint_is_added_once() {
    let (_, start, x, _) = its_with_temp();
    let rule =
        Rule::new_linear(start, Guard::empty(), Expr::var(x), start, Substitution::new());
    let ensured = Preprocess::ensure_nonnegative_cost(&rule).unwrap();
    assert!(ensured.guard().contains(&Relation::ge(Expr::var(x), Expr::zero())));
    // constant costs need no constraint
    let constant = Rule::new_linear(start, Guard::empty(), Expr::one(), start, Substitution::new());
    assert!(Preprocess::ensure_nonnegative_cost(&constant).is_none());
  }
}
