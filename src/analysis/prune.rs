/*!

  Pruning: syntactic duplicate removal, complexity-guided selection among
  parallel rules, and removal of constant-cost leaves and unreachable parts
  of the graph.

*/

use std::collections::BTreeSet;
use std::time::Duration;

use log::debug;

use crate::asymptotic;
use crate::complexity::Complexity;
use crate::config::Config;
use crate::its::{ItsProblem, Rule};
use crate::timeout::Timeout;
use crate::{LocationIdx, LocationSet, TransIdx};

pub struct Pruning;

impl Pruning {
  /// Removes duplicates among the given transitions: rules that are
  /// structurally equal up to a constant cost difference. The rule with the
  /// strictly greater cost survives; on equal costs the one with the
  /// smaller id does. Returns the removed ids.
  pub fn remove_duplicate_rules(
    its: &mut ItsProblem,
    transitions: &[TransIdx],
    compare_rhss: bool,
  ) -> BTreeSet<TransIdx> {
    let mut to_remove: BTreeSet<TransIdx> = BTreeSet::new();

    for (position, first) in transitions.iter().enumerate() {
      if to_remove.contains(first) || !its.has_rule(*first) {
        continue;
      }
      for second in &transitions[position + 1..] {
        if to_remove.contains(second) || !its.has_rule(*second) {
          continue;
        }
        let rule_a = its.rule(*first);
        let rule_b = its.rule(*second);
        if rule_a.approx_equal(rule_b, compare_rhss) {
          let difference = (rule_a.cost().clone() - rule_b.cost().clone()).expand();
          let a_is_cheaper = match difference.as_number() {
            Some(value) => num_traits::Signed::is_negative(value),
            None        => false,
          };
          if a_is_cheaper {
            to_remove.insert(*first);
            break; // first is gone, move on
          } else {
            to_remove.insert(*second);
          }
        }
      }
    }

    for id in &to_remove {
      debug!("removing duplicate rule {}", id);
      its.remove_rule(*id);
    }
    to_remove
  }

  /// Keeps only the most promising rules when too many connect the same
  /// pair of locations. Rules are ranked by a best-effort asymptotic bound
  /// with a short budget, then by the number of unbounded variables.
  pub fn prune_parallel_rules(its: &mut ItsProblem, config: &Config, timeout: &Timeout) -> bool {
    let mut changed = false;
    let budget = Duration::from_millis(config.limit_timeout_ms);

    for node in its.locations() {
      if timeout.soft() {
        break;
      }
      for pre in its.predecessor_locations(node) {
        let parallel = its.transitions_from_to(pre, node);
        Self::remove_duplicate_rules(its, &parallel, true);

        let parallel = its.transitions_from_to(pre, node);
        if parallel.len() <= config.max_parallel_rules {
          continue;
        }

        // alternating iteration that tends to avoid choosing similar edges
        let mut ranked: Vec<(TransIdx, Complexity, usize)> = Vec::new();
        for position in 0..parallel.len() {
          let index = if position % 2 == 0 {
            position / 2
          } else {
            parallel.len() - 1 - position / 2
          };
          let id = parallel[index];
          let guard = its.rule(id).guard().clone();
          let cost = its.rule(id).cost().clone();
          let result = asymptotic::determine_complexity(
            its,
            config,
            &guard,
            &cost,
            false,
            Complexity::Unknown,
            budget,
          );
          ranked.push((id, result.complexity, result.infty_vars));
        }
        ranked.sort_by(|a, b| (b.1, b.2).cmp(&(a.1, a.2)));

        let keep: BTreeSet<TransIdx> =
            ranked.iter().take(config.max_parallel_rules).map(|(id, _, _)| *id).collect();
        let had_dummy = parallel.iter().any(|id| its.rule(*id).is_dummy());

        for id in &parallel {
          if !keep.contains(id) {
            debug!("pruning parallel rule {} from {} to {}", id, pre, node);
            // nonlinear rules only lose the edges into `node`
            if let Some(stripped) = its.rule(*id).strip_rhs_location(node) {
              its.add_rule(stripped);
            }
            its.remove_rule(*id);
          }
        }
        // preserve the skip-the-batch semantics of an empty rule
        if had_dummy && !keep.iter().any(|id| its.rule(*id).is_dummy()) {
          its.add_rule(Rule::dummy(pre, node));
        }
        changed = true;
      }
    }
    changed
  }

  /// DFS helper: removes rules into leaves when the whole reachable
  /// sub-graph has at most constant complexity.
  fn remove_const_leaves(its: &mut ItsProblem, node: LocationIdx, visited: &mut LocationSet) -> bool {
    if visited.contains(node) {
      return false;
    }
    visited.insert(node);

    let mut changed = false;
    for next in its.successor_locations(node) {
      changed |= Self::remove_const_leaves(its, next, visited);

      let is_leaf = |its: &ItsProblem, loc: LocationIdx| !its.has_transitions_from(loc);
      if is_leaf(its, next) {
        for id in its.transitions_from_to(node, next) {
          let rule = its.rule(id);
          if rule.cost().complexity() > Complexity::Const {
            continue;
          }
          if rule.rhss().iter().all(|rhs| is_leaf(its, rhs.loc())) {
            debug!("removing constant leaf rule {}", id);
            its.remove_rule(id);
            changed = true;
          }
        }
        if !its.has_transitions_to(next) && !its.is_initial_location(next) {
          debug!("removing isolated sink {}", next);
          its.remove_only_location(next);
          changed = true;
        }
      }
    }
    changed
  }

  /// Removes constant-cost leaf rules and every location not reachable from
  /// the initial one.
  pub fn remove_leaves_and_unreachable(its: &mut ItsProblem) -> bool {
    let mut visited = LocationSet::new();
    let mut changed = Self::remove_const_leaves(its, its.initial_location(), &mut visited);

    for node in its.locations() {
      if !visited.contains(node) {
        debug!("removing unreachable location {}", node);
        its.remove_location_and_rules(node);
        changed = true;
      }
    }
    changed
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::{Expr, Guard, Relation, Substitution};
  use crate::its::VariableManager;

  fn base_its() -> (ItsProblem, LocationIdx, usize) {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (its, start) = ItsProblem::with_start(vm, "f");
    (its, start, x)
  }

  fn guarded_rule(from: LocationIdx, to: LocationIdx, x: usize, cost: Expr) -> Rule {
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    Rule::new_linear(from, guard, cost, to, Substitution::new())
  }

  #[test]
  fn duplicate_removal_keeps_the_expensive_rule() {
    let (mut its, start, x) = base_its();
    let cheap = its.add_rule(guarded_rule(start, start, x, Expr::one()));
    let pricey = its.add_rule(guarded_rule(start, start, x, Expr::int(5)));

    let transitions = its.all_transitions();
    let removed =
        Pruning::remove_duplicate_rules(&mut its, &transitions, true);
    assert!(removed.contains(&cheap));
    assert!(its.has_rule(pricey));
  }

  #[test]
  fn duplicate_removal_is_idempotent() {
    let (mut its, start, x) = base_its();
    its.add_rule(guarded_rule(start, start, x, Expr::one()));
    its.add_rule(guarded_rule(start, start, x, Expr::one()));
    its.add_rule(guarded_rule(start, start, x, Expr::one()));

    let transitions = its.all_transitions();
    let first = Pruning::remove_duplicate_rules(&mut its, &transitions, true);
    assert_eq!(first.len(), 2);
    let transitions = its.all_transitions();
    let second = Pruning::remove_duplicate_rules(&mut its, &transitions, true);
    assert!(second.is_empty());
  }

  #[test]
  fn equal_costs_keep_the_smaller_id() {
    let (mut its, start, x) = base_its();
    let first = its.add_rule(guarded_rule(start, start, x, Expr::one()));
    let second = its.add_rule(guarded_rule(start, start, x, Expr::one()));
    let transitions = its.all_transitions();
    let removed = Pruning::remove_duplicate_rules(&mut its, &transitions, true);
    assert!(removed.contains(&second));
    assert!(its.has_rule(first));
  }

  #[test]
  fn unreachable_locations_are_removed() {
    let (mut its, start, x) = base_its();
    let island = its.add_location();
    its.add_rule(guarded_rule(island, island, x, Expr::one()));
    let reachable = its.add_location();
    its.add_rule(guarded_rule(start, reachable, x, Expr::var(x)));

    assert!(Pruning::remove_leaves_and_unreachable(&mut its));
    assert!(!its.has_location(island));
    assert!(its.has_location(reachable));
  }

  #[test]
  fn constant_leaves_are_removed() {
    let (mut its, start, x) = base_its();
    let leaf = its.add_location();
    its.add_rule(guarded_rule(start, leaf, x, Expr::one()));

    assert!(Pruning::remove_leaves_and_unreachable(&mut its));
    assert!(!its.has_location(leaf));
    assert!(its.is_empty());
  }

  #[test]
  fn expensive_leaves_survive() {
    let (mut its, start, x) = base_its();
    let leaf = its.add_location();
    its.add_rule(guarded_rule(start, leaf, x, Expr::var(x)));

    assert!(!Pruning::remove_leaves_and_unreachable(&mut its));
    assert!(its.has_location(leaf));
  }
}
