/*!

  Metering-based forward acceleration: find a metering function, close the
  loop's update and cost under it, and instantiate the iteration counter by
  the metering function. Nonlinear rules get the exponential cost
  approximation `(d^f - 1)/(d - 1)` and are redirected to a sink, since
  their result state cannot be described by a single right-hand side.

*/

use crate::config::Config;
use crate::expr::{Expr, Relation, Substitution};
use crate::its::{ItsProblem, Rule};
use crate::smt::{self, SmtResult};
use crate::{LocationIdx, Numeric, VariablePair};

use super::metering::{MeteringFinder, MeteringResult};
use super::recurrence;

#[derive(Clone, Debug)]
pub struct MeteredRule {
  pub info: String,
  pub rule: Rule,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ForwardStatus {
  Success,
  SuccessWithRestriction,
  NoMetering,
  TooComplicated,
}

#[derive(Clone, Debug)]
pub struct ForwardResult {
  pub status: ForwardStatus,
  pub rules : Vec<MeteredRule>,
}

impl ForwardResult {
  fn failed(status: ForwardStatus) -> ForwardResult {
    ForwardResult { status, rules: Vec::new() }
  }

  pub fn succeeded(&self) -> bool {
    matches!(self.status, ForwardStatus::Success | ForwardStatus::SuccessWithRestriction)
  }
}

/// Metering with the instantiation fallback: if no metering function is
/// found, temporaries are instantiated by their bounds and the search runs
/// again. Returns the result and the rule it refers to.
fn meter_with_instantiation(
  its: &mut ItsProblem,
  config: &Config,
  rule: &Rule,
) -> (MeteringResult, Rule) {
  let meter = MeteringFinder::generate(its, config, rule);

  if config.temp_var_instantiation {
    if matches!(meter, MeteringResult::Unsat | MeteringResult::ConflictVar(_)) {
      if let Some(instantiated) = MeteringFinder::instantiate_temp_vars_heuristic(its, config, rule)
      {
        let meter = MeteringFinder::generate(its, config, &instantiated);
        return (meter, instantiated);
      }
    }
  }

  (meter, rule.clone())
}

/// Searches a metering function and computes the iterated rule.
fn meter_and_iterate(
  its: &mut ItsProblem,
  config: &Config,
  rule: &Rule,
  sink: LocationIdx,
  conflict_var: &mut Option<VariablePair>,
) -> ForwardResult {
  // For nonlinear rules the iterated cost assumes at least cost 1 per step.
  let mut rule = rule.clone();
  if !rule.is_linear() {
    let mut guard = rule.guard().clone();
    guard.push(Relation::ge(rule.cost().clone(), Expr::one()));
    rule = rule.with_guard(guard);
  }

  let (mut meter, mut rule) = meter_with_instantiation(its, config, &rule);

  // Nontermination requires positive costs in every step; re-meter with the
  // strengthened guard.
  if matches!(meter, MeteringResult::Nonterm) && rule.is_linear() {
    let mut guard = rule.guard().clone();
    guard.push(Relation::ge(rule.cost().clone(), Expr::one()));
    rule = rule.with_guard(guard);
    let remetered = meter_with_instantiation(its, config, &rule);
    meter = remetered.0;
    rule = remetered.1;
    if matches!(meter, MeteringResult::Nonterm) {
      let nonterm = rule.with_cost(Expr::Nonterm).replace_rhss_by_sink(sink);
      return ForwardResult {
        status: ForwardStatus::Success,
        rules : vec![MeteredRule { info: "NONTERM".to_string(), rule: nonterm }],
      };
    }
  }

  match meter {
    MeteringResult::Nonlinear        => ForwardResult::failed(ForwardStatus::TooComplicated),
    MeteringResult::Nonterm          => ForwardResult::failed(ForwardStatus::NoMetering),
    MeteringResult::Unsat            => ForwardResult::failed(ForwardStatus::NoMetering),
    MeteringResult::ConflictVar(pair) => {
      *conflict_var = Some(pair);
      ForwardResult::failed(ForwardStatus::NoMetering)
    }
    MeteringResult::Success(metering) => {
      let info = format!("metering function {}", metering);

      if rule.is_linear() {
        // Close update and cost under a fresh counter, then let the counter
        // take its maximal value, the metering function.
        let n = its.add_fresh_temporary_variable("tv");
        let closed = match recurrence::iterate_rule(&rule, n) {
          Some(closed) => closed,
          None         => return ForwardResult::failed(ForwardStatus::TooComplicated),
        };
        let instantiate = Substitution::single(n, metering.clone());

        let mut update = Substitution::new();
        for (var, value) in closed.update.iter() {
          update.put(*var, value.subs(&instantiate).expand());
        }
        let cost = closed.cost.subs(&instantiate).expand();

        let mut guard = rule.guard().clone();
        guard.push(Relation::ge(
          metering.clone(),
          Expr::int(closed.validity_bound.max(1) as i64),
        ));

        let accelerated =
            Rule::new_linear(rule.lhs_loc(), guard, cost, rule.rhs_loc(0), update);
        ForwardResult {
          status: ForwardStatus::Success,
          rules : vec![MeteredRule { info, rule: accelerated }],
        }
      } else {
        // every iteration multiplies the number of runs by the rhs count
        let degree = rule.rhs_count() as i64;
        let scale = Expr::num((Numeric::from_integer((degree - 1).into())).recip());
        let cost = scale
            * (Expr::pow(Expr::int(degree), metering.clone()) - Expr::one());

        let mut guard = rule.guard().clone();
        guard.push(Relation::ge(metering.clone(), Expr::one()));

        let accelerated = rule.with_guard(guard).with_cost(cost.expand()).replace_rhss_by_sink(sink);
        ForwardResult {
          status: ForwardStatus::Success,
          rules : vec![MeteredRule { info, rule: accelerated }],
        }
      }
    }
  }
}

/// One fast attempt without heuristics; used by the conflict-variable and
/// strengthening retries.
pub fn accelerate_fast(
  its: &mut ItsProblem,
  config: &Config,
  rule: &Rule,
  sink: LocationIdx,
) -> Option<MeteredRule> {
  let mut conflict = None;
  let mut result = meter_and_iterate(its, config, rule, sink, &mut conflict);
  if result.status == ForwardStatus::Success {
    result.rules.pop()
  } else {
    None
  }
}

/// Full forward acceleration with the conflict-variable and guard
/// strengthening heuristics.
pub fn forward_accelerate(
  its: &mut ItsProblem,
  config: &Config,
  rule: &Rule,
  sink: LocationIdx,
) -> ForwardResult {
  let mut conflict_var = None;
  let result = meter_and_iterate(its, config, rule, sink, &mut conflict_var);
  if result.status != ForwardStatus::NoMetering {
    return result;
  }

  // min/max workaround: restrict the guard to one of the two orderings
  if config.conflict_var_heuristic {
    if let Some((a, b)) = conflict_var {
      let mut rules = Vec::new();
      for (relation, label) in [
        (Relation::ge(Expr::var(a), Expr::var(b)), ">="),
        (Relation::le(Expr::var(a), Expr::var(b)), "<="),
      ] {
        let mut guard = rule.guard().clone();
        guard.push(relation);
        let restricted = rule.with_guard(guard);
        if smt::check_guard(its.var_manager(), config, restricted.guard()) != SmtResult::Unsat {
          if let Some(accelerated) = accelerate_fast(its, config, &restricted, sink) {
            let info = format!(
              "{} (after adding {} {} {})",
              accelerated.info,
              its.var_name(a),
              label,
              its.var_name(b)
            );
            rules.push(MeteredRule { info, rule: accelerated.rule });
          }
        }
      }
      if !rules.is_empty() {
        let status = if rules.len() == 2 {
          ForwardStatus::Success
        } else {
          ForwardStatus::SuccessWithRestriction
        };
        return ForwardResult { status, rules };
      }
    }
  }

  // constant updates: propagate guard constraints one step
  if config.constant_update_heuristic {
    if let Some(strengthened) = MeteringFinder::strengthen_guard(its, rule) {
      if let Some(accelerated) = accelerate_fast(its, config, &strengthened, sink) {
        let info = format!("{} (after strengthening guard)", accelerated.info);
        return ForwardResult {
          status: ForwardStatus::SuccessWithRestriction,
          rules : vec![MeteredRule { info, rule: accelerated.rule }],
        };
      }
    }
  }

  ForwardResult::failed(ForwardStatus::NoMetering)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::Guard;
  use crate::its::{RuleLhs, RuleRhs, VariableManager};

  #[test]
  fn counting_loop_is_accelerated() {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(vm, "f");
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::one());
    let rule = Rule::new_linear(start, guard, Expr::one(), start, update);
    its.add_rule(rule.clone());
    let sink = its.add_location();

    let config = Config::default();
    let result = forward_accelerate(&mut its, &config, &rule, sink);
    assert!(result.succeeded());
    let accelerated = &result.rules[0].rule;
    // counter instantiated by the metering function x: cost is x
    assert_eq!(*accelerated.cost(), Expr::var(x));
    // update became x := x - x = 0
    assert_eq!(accelerated.update(0).get(x).unwrap().clone(), Expr::zero());
  }

  #[test]
  fn nonlinear_rule_gets_exponential_cost() {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(vm, "f");
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::one());
    let rule = Rule::new(
      RuleLhs::new(start, guard, Expr::one()),
      vec![
        RuleRhs::new(start, update.clone()),
        RuleRhs::new(start, update),
      ],
    );
    its.add_rule(rule.clone());
    let sink = its.add_location();

    let config = Config::default();
    let result = forward_accelerate(&mut its, &config, &rule, sink);
    assert!(result.succeeded());
    let accelerated = &result.rules[0].rule;
    assert_eq!(accelerated.rhs_loc(0), sink);
    // the cost contains a power of the branching degree
    let mut powers = Vec::new();
    accelerated.cost().collect_powers(&mut powers);
    assert!(powers.iter().any(|p| matches!(p, Expr::Pow(base, _) if **base == Expr::int(2))));
  }
}
