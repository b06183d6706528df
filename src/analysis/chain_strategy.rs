/*!

  Location elimination strategies built on rule composition: linear paths,
  tree-shaped paths, forced elimination of a single location, and chaining
  accelerated rules with their incoming rules.

*/

use std::collections::BTreeSet;

use log::debug;

use crate::config::Config;
use crate::its::ItsProblem;
use crate::proof::Proof;
use crate::timeout::Timeout;
use crate::{LocationIdx, LocationSet, TransIdx};

use super::chain::chain_rules;
use super::preprocess::Preprocess;
use crate::complexity::Complexity;

/// Eliminates `loc` by chaining every incoming with every outgoing rule.
/// Incoming rules that could not be chained with every outgoing rule are
/// preserved behind a fresh dummy location when their cost is interesting.
/// The location must not have simple loops; other self-loops are tolerated
/// when `allow_self_loops` is set.
fn eliminate_location_by_chaining(
  its: &mut ItsProblem,
  config: &Config,
  loc: LocationIdx,
  keep_unchainable: bool,
  allow_self_loops: bool,
  proof: &mut Proof,
) {
  let mut keep: BTreeSet<TransIdx> = BTreeSet::new();
  debug!("eliminating location {} by chaining", loc);
  proof.section(format!(
    "Eliminating location {} by chaining",
    its.printable_location_name(loc)
  ));

  for incoming in its.transitions_to(loc) {
    let incoming_rule = its.rule(incoming).clone();
    assert!(
      allow_self_loops || incoming_rule.lhs_loc() != loc,
      "eliminating a location with self-loops"
    );
    // self-loops at loc die together with loc anyway
    if incoming_rule.lhs_loc() == loc {
      continue;
    }

    let mut chained_with_all = true;
    for outgoing in its.transitions_from(loc) {
      let outgoing_rule = its.rule(outgoing).clone();
      match chain_rules(its, config, &incoming_rule, &outgoing_rule, true) {
        Some(mut new_rule) => {
          if allow_self_loops {
            // chained rules may still lead back to loc; those edges go
            match new_rule.strip_rhs_location(loc) {
              Some(stripped) => new_rule = stripped,
              None           => continue,
            }
          }
          let new_rule = Preprocess::simplify_guard(&new_rule).unwrap_or(new_rule);
          let added = its.add_rule(new_rule);
          proof.append(format!("Chained rules {} and {} to new rule {}.", incoming, outgoing, added));
        }
        None => {
          chained_with_all = false;
          proof.append(format!("Failed to chain rules {} and {}.", incoming, outgoing));
        }
      }
    }

    if keep_unchainable && !chained_with_all {
      // only worth keeping if it might contribute complexity
      if incoming_rule.cost().complexity() > Complexity::Const {
        keep.insert(incoming);
      }
    }
  }

  if keep_unchainable && !keep.is_empty() {
    let dummy_loc = its.add_location();
    for id in keep {
      let rule = its.rule(id).clone();
      match rule.strip_rhs_location(loc) {
        Some(stripped) => {
          let added = its.add_rule(stripped);
          proof.append(format!(
            "Keeping rule {} after partial deletion, yielding rule {}.",
            id, added
          ));
        }
        None => {
          let added = its.add_rule(rule.replace_rhss_by_sink(dummy_loc));
          proof.append(format!("Keeping rule {} by adding a dummy rule {}.", id, added));
        }
      }
    }
    if !its.has_transitions_to(dummy_loc) {
      its.remove_only_location(dummy_loc);
    }
  }

  its.remove_location_and_rules(loc);
}

/// DFS from the initial location, calling `function` on every node. When
/// `repeat` is set, the function runs on each node until it reports no
/// change.
fn call_on_each_node<F>(its: &mut ItsProblem, timeout: &Timeout, repeat: bool, mut function: F) -> bool
where
  F: FnMut(&mut ItsProblem, LocationIdx) -> bool,
{
  fn walk<F>(
    its: &mut ItsProblem,
    timeout: &Timeout,
    repeat: bool,
    function: &mut F,
    node: LocationIdx,
    visited: &mut LocationSet,
  ) -> bool
  where
    F: FnMut(&mut ItsProblem, LocationIdx) -> bool,
  {
    if visited.contains(node) {
      return false;
    }
    visited.insert(node);

    let mut changed_overall = false;
    loop {
      let changed = function(its, node);
      changed_overall |= changed;
      if timeout.soft() {
        return changed_overall;
      }
      if !(repeat && changed) {
        break;
      }
    }

    for next in its.successor_locations(node) {
      changed_overall |= walk(its, timeout, repeat, function, next, visited);
      if timeout.soft() {
        return changed_overall;
      }
    }
    changed_overall
  }

  let mut visited = LocationSet::new();
  let initial = its.initial_location();
  walk(its, timeout, repeat, &mut function, initial, &mut visited)
}

/// A node lies on a linear path when it has exactly one incoming and one
/// outgoing transition and no self-loop.
fn is_on_linear_path(its: &ItsProblem, node: LocationIdx) -> bool {
  if its.transitions_from(node).len() != 1 {
    return false;
  }
  let preds = its.predecessor_locations(node);
  if preds.len() != 1 || preds.contains(&node) {
    return false;
  }
  let pred = *preds.iter().next().unwrap();
  its.transitions_from_to(pred, node).len() == 1
}

/// Contracts linear paths; runs until no progress at every node.
pub fn chain_linear_paths(
  its: &mut ItsProblem,
  config: &Config,
  timeout: &Timeout,
) -> Option<Proof> {
  let mut proof = Proof::new();
  let changed = call_on_each_node(its, timeout, true, |its, node| {
    let mut changed = false;
    for succ in its.successor_locations(node) {
      if its.is_initial_location(succ) || succ == node {
        continue;
      }
      if is_on_linear_path(its, succ) {
        eliminate_location_by_chaining(its, config, succ, true, false, &mut proof);
        changed = true;
      }
    }
    changed
  });
  if changed {
    Some(proof)
  } else {
    None
  }
}

/// Contracts tree-shaped paths: nodes with a single predecessor but
/// arbitrarily many successors. Called only once per node to avoid rule
/// explosion.
pub fn chain_tree_paths(its: &mut ItsProblem, config: &Config, timeout: &Timeout) -> Option<Proof> {
  let mut proof = Proof::new();
  let changed = call_on_each_node(its, timeout, false, |its, node| {
    let mut changed = false;
    for succ in its.successor_locations(node) {
      if its.is_initial_location(succ) || succ == node {
        continue;
      }
      // a node with several predecessors might be a loop head; try to
      // contract the rest first
      if its.predecessor_locations(succ).len() > 1 {
        continue;
      }
      if its.has_transitions_from(succ) && its.simple_loops_at(succ).is_empty() {
        eliminate_location_by_chaining(its, config, succ, true, false, &mut proof);
        changed = true;
      }
      if timeout.soft() {
        break;
      }
    }
    changed
  });
  if changed {
    Some(proof)
  } else {
    None
  }
}

/// Eliminates the first location (in DFS order) without simple loops that
/// is neither the initial location nor a dead end.
pub fn eliminate_a_location(
  its: &mut ItsProblem,
  config: &Config,
  timeout: &Timeout,
  proof: &mut Proof,
) -> Option<String> {
  fn search(
    its: &mut ItsProblem,
    config: &Config,
    timeout: &Timeout,
    node: LocationIdx,
    visited: &mut LocationSet,
    proof: &mut Proof,
  ) -> Option<String> {
    if visited.contains(node) {
      return None;
    }
    visited.insert(node);

    let has_incoming = its.has_transitions_to(node);
    let has_outgoing = its.has_transitions_from(node);
    let has_simple_loop = !its.simple_loops_at(node).is_empty();

    if has_simple_loop || its.is_initial_location(node) || !has_incoming || !has_outgoing {
      for succ in its.successor_locations(node) {
        if let Some(name) = search(its, config, timeout, succ, visited, proof) {
          return Some(name);
        }
        if timeout.soft() {
          return None;
        }
      }
      return None;
    }

    let name = its.printable_location_name(node);
    debug!("eliminating location {}", name);
    eliminate_location_by_chaining(its, config, node, true, true, proof);
    Some(name)
  }

  let mut visited = LocationSet::new();
  let initial = its.initial_location();
  search(its, config, timeout, initial, &mut visited, proof)
}

/// Chains accelerated rules with their incoming rules. The accelerated
/// rules are removed afterwards; chained incoming rules are also removed
/// unless configured otherwise.
pub fn chain_accelerated_rules(
  its: &mut ItsProblem,
  config: &Config,
  timeout: &Timeout,
  accelerated_rules: &BTreeSet<TransIdx>,
) -> Option<Proof> {
  if accelerated_rules.is_empty() {
    return None;
  }
  let mut proof = Proof::new();
  proof.section(format!(
    "Chaining {} accelerated rules with incoming rules",
    accelerated_rules.len()
  ));
  let mut successfully_chained: BTreeSet<TransIdx> = BTreeSet::new();

  // visit each lhs location once, so freshly chained rules do not serve as
  // incoming rules of a later accelerated rule at the same location
  let mut nodes: BTreeSet<LocationIdx> = BTreeSet::new();
  for id in accelerated_rules {
    if its.has_rule(*id) {
      nodes.insert(its.rule(*id).lhs_loc());
    }
  }

  for node in nodes {
    let incoming_transitions = its.transitions_to(node);

    for accel in its.transitions_from(node) {
      if timeout.soft() {
        break;
      }
      if !accelerated_rules.contains(&accel) {
        continue;
      }
      let accel_rule = its.rule(accel).clone();

      for incoming in &incoming_transitions {
        if accelerated_rules.contains(incoming) || !its.has_rule(*incoming) {
          continue;
        }
        let incoming_rule = its.rule(*incoming).clone();
        // self-loops at node cannot serve as incoming rules
        if incoming_rule.lhs_loc() == node {
          continue;
        }

        if let Some(new_rule) = chain_rules(its, config, &incoming_rule, &accel_rule, true) {
          let new_rule = Preprocess::simplify_rule(its, &new_rule).unwrap_or(new_rule);
          let added = its.add_rule(new_rule);
          proof.append(format!(
            "Chained incoming rule {} with accelerated rule {} to new rule {}.",
            incoming, accel, added
          ));
          successfully_chained.insert(*incoming);
        }
      }

      proof.append(format!("Removing accelerated rule {}.", accel));
      its.remove_rule(accel);
    }
  }

  if !config.keep_incoming_in_chain_accelerated {
    for id in successfully_chained {
      proof.append(format!("Removing incoming rule {} (after successful chaining).", id));
      its.remove_rule(id);
    }
  }

  Some(proof)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::{Expr, Guard, Relation, Substitution};
  use crate::its::{Rule, VariableManager};

  /// f -> g -> h, where g is on a linear path.
  fn path_its() -> (ItsProblem, LocationIdx, LocationIdx, LocationIdx, usize) {
    let mut vm = VariableManager::new();
    let x = vm.add_fresh_variable("x");
    let (mut its, f) = ItsProblem::with_start(vm, "f");
    let g = its.add_named_location("g");
    let h = its.add_named_location("h");
    its.add_rule(Rule::new_linear(
      f,
      Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]),
      Expr::one(),
      g,
      Substitution::new(),
    ));
    its.add_rule(Rule::new_linear(g, Guard::empty(), Expr::var(x), h, Substitution::new()));
    (its, f, g, h, x)
  }

  #[test]
  fn linear_path_is_contracted() {
    let (mut its, f, g, h, _) = path_its();
    let config = Config::default();
    let timeout = Timeout::disabled();

    let proof = chain_linear_paths(&mut its, &config, &timeout);
    assert!(proof.is_some());
    assert!(!its.has_location(g));
    // one chained rule from f to h, with the summed cost
    let rules = its.transitions_from_to(f, h);
    assert_eq!(rules.len(), 1);
    let rule = its.rule(rules[0]);
    assert_eq!(*rule.cost(), (Expr::var(0) + Expr::one()).expand());
  }

  #[test]
  fn initial_location_is_never_eliminated() {
    let (mut its, f, _, _, _) = path_its();
    let config = Config::default();
    let timeout = Timeout::disabled();
    chain_linear_paths(&mut its, &config, &timeout);
    assert!(its.has_location(f));
    assert_eq!(its.initial_location(), f);
  }

  #[test]
  fn eliminate_a_location_skips_loop_heads() {
    let (mut its, _, g, _, x) = path_its();
    // give g a simple loop; it must not be eliminated then
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::one());
    its.add_rule(Rule::new_linear(
      g,
      Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]),
      Expr::one(),
      g,
      update,
    ));

    let config = Config::default();
    let timeout = Timeout::disabled();
    let mut proof = Proof::new();
    let eliminated = eliminate_a_location(&mut its, &config, &timeout, &mut proof);
    assert!(eliminated.is_none());
    assert!(its.has_location(g));
  }
}
