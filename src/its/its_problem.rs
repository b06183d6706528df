/*!

  `ItsProblem` owns all rules and locations of an integer transition system.
  Rules reference locations only by index, never by address. The incidence
  index is kept consistent on every mutation; all mutation goes through
  `add_rule`/`remove_rule` and the location API, so a cancelled
  transformation always leaves the problem in a consistent state.

*/

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::expr::Expr;
use crate::its::hypergraph::HyperGraph;
use crate::its::rule::Rule;
use crate::its::variable_manager::{VarType, VariableManager};
use crate::{LocationIdx, TransIdx, VariableIdx};

#[derive(Clone, Debug, Default)]
pub struct ItsProblem {
  var_manager     : VariableManager,
  rules           : BTreeMap<TransIdx, Rule>,
  graph           : HyperGraph,
  locations       : BTreeSet<LocationIdx>,
  location_names  : HashMap<LocationIdx, String>,
  initial_location: LocationIdx,
  next_location   : LocationIdx,
  next_transition : TransIdx,
}

impl ItsProblem {
  pub fn new() -> ItsProblem {
    ItsProblem::default()
  }

  // region Variables (delegation to the variable manager)

  pub fn var_manager(&self) -> &VariableManager {
    &self.var_manager
  }

  pub fn var_manager_mut(&mut self) -> &mut VariableManager {
    &mut self.var_manager
  }

  pub fn add_fresh_variable(&mut self, basename: &str) -> VariableIdx {
    self.var_manager.add_fresh_variable(basename)
  }

  pub fn add_fresh_temporary_variable(&mut self, basename: &str) -> VariableIdx {
    self.var_manager.add_fresh_temporary_variable(basename)
  }

  pub fn fresh_untracked_symbol(&mut self, basename: &str, var_type: VarType) -> VariableIdx {
    self.var_manager.fresh_untracked_symbol(basename, var_type)
  }

  pub fn is_temp_var(&self, var: VariableIdx) -> bool {
    self.var_manager.is_temp_var(var)
  }

  pub fn var_name(&self, var: VariableIdx) -> &str {
    self.var_manager.var_name(var)
  }

  // endregion

  // region Locations

  pub fn initial_location(&self) -> LocationIdx {
    self.initial_location
  }

  pub fn is_initial_location(&self, loc: LocationIdx) -> bool {
    self.initial_location == loc
  }

  pub fn set_initial_location(&mut self, loc: LocationIdx) {
    assert!(self.locations.contains(&loc), "unknown location {}", loc);
    self.initial_location = loc;
  }

  pub fn add_location(&mut self) -> LocationIdx {
    let loc = self.next_location;
    self.next_location += 1;
    self.locations.insert(loc);
    loc
  }

  pub fn add_named_location(&mut self, name: &str) -> LocationIdx {
    let loc = self.add_location();
    self.location_names.insert(loc, name.to_string());
    loc
  }

  pub fn locations(&self) -> Vec<LocationIdx> {
    self.locations.iter().copied().collect()
  }

  pub fn has_location(&self, loc: LocationIdx) -> bool {
    self.locations.contains(&loc)
  }

  pub fn location_name(&self, loc: LocationIdx) -> Option<&str> {
    self.location_names.get(&loc).map(String::as_str)
  }

  /// A printable name for proof output; synthesised for unnamed locations.
  pub fn printable_location_name(&self, loc: LocationIdx) -> String {
    match self.location_name(loc) {
      Some(name) => name.to_string(),
      None       => format!("l{}", loc),
    }
  }

  /// Removes a location that no live rule references. Referencing rules must
  /// be removed first; violating this is a bug and aborts the process.
  pub fn remove_only_location(&mut self, loc: LocationIdx) {
    assert!(
      !self.graph.has_transitions_from(loc) && !self.graph.has_transitions_to(loc),
      "removing location {} which still has incident rules",
      loc
    );
    self.locations.remove(&loc);
    self.location_names.remove(&loc);
  }

  /// Removes a location together with all rules that visit it.
  pub fn remove_location_and_rules(&mut self, loc: LocationIdx) {
    let mut incident: BTreeSet<TransIdx> = self.graph.transitions_from(loc).into_iter().collect();
    incident.extend(self.graph.transitions_to(loc));
    for id in incident {
      self.remove_rule(id);
    }
    self.remove_only_location(loc);
  }

  // endregion

  // region Rules

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  pub fn rule(&self, id: TransIdx) -> &Rule {
    &self.rules[&id]
  }

  pub fn has_rule(&self, id: TransIdx) -> bool {
    self.rules.contains_key(&id)
  }

  pub fn rule_count(&self) -> usize {
    self.rules.len()
  }

  /// Adds a rule and returns its fresh transition id. All referenced
  /// locations must be live, and no update may assign a temporary variable.
  pub fn add_rule(&mut self, rule: Rule) -> TransIdx {
    assert!(self.locations.contains(&rule.lhs_loc()), "lhs location is not live");
    for rhs in rule.rhss() {
      assert!(self.locations.contains(&rhs.loc()), "rhs location is not live");
      for var in rhs.update().domain() {
        assert!(
          !self.var_manager.is_temp_var(var),
          "temporary variable {} must not be updated",
          self.var_manager.var_name(var)
        );
      }
    }

    let id = self.next_transition;
    self.next_transition += 1;
    let targets = rule.rhss().iter().map(|rhs| rhs.loc()).collect();
    self.graph.add_transition(id, rule.lhs_loc(), targets);
    self.rules.insert(id, rule);
    id
  }

  pub fn remove_rule(&mut self, id: TransIdx) {
    self.graph.remove_transition(id);
    self.rules.remove(&id);
  }

  pub fn all_transitions(&self) -> Vec<TransIdx> {
    self.rules.keys().copied().collect()
  }

  pub fn transitions_from(&self, loc: LocationIdx) -> Vec<TransIdx> {
    self.graph.transitions_from(loc)
  }

  pub fn transitions_to(&self, loc: LocationIdx) -> Vec<TransIdx> {
    self.graph.transitions_to(loc)
  }

  pub fn transitions_from_to(&self, from: LocationIdx, to: LocationIdx) -> Vec<TransIdx> {
    self.graph.transitions_from_to(from, to)
  }

  pub fn has_transitions_from(&self, loc: LocationIdx) -> bool {
    self.graph.has_transitions_from(loc)
  }

  pub fn has_transitions_to(&self, loc: LocationIdx) -> bool {
    self.graph.has_transitions_to(loc)
  }

  pub fn successor_locations(&self, loc: LocationIdx) -> BTreeSet<LocationIdx> {
    self.graph.successors(loc)
  }

  pub fn predecessor_locations(&self, loc: LocationIdx) -> BTreeSet<LocationIdx> {
    self.graph.predecessors(loc)
  }

  /// Ids of rules at `loc` whose every right-hand side targets `loc`.
  pub fn simple_loops_at(&self, loc: LocationIdx) -> Vec<TransIdx> {
    self
        .graph
        .transitions_from(loc)
        .into_iter()
        .filter(|id| self.rules[id].is_simple_loop())
        .collect()
  }

  pub fn is_linear(&self) -> bool {
    self.rules.values().all(Rule::is_linear)
  }

  /// The sum of guard sizes and cost, a cheap progress metric for logging.
  pub fn size(&self) -> usize {
    self.rules.values().map(|rule| rule.guard().len() + rule.rhs_count()).sum()
  }

  /// Convenience constructor for tests and programmatic use.
  pub fn with_start(var_manager: VariableManager, start: &str) -> (ItsProblem, LocationIdx) {
    let mut its = ItsProblem { var_manager, ..ItsProblem::default() };
    let loc = its.add_named_location(start);
    its.set_initial_location(loc);
    (its, loc)
  }

  /// The guard-satisfiability query `cost >= 0` needs the cost; convenience
  /// accessor used by preprocessing.
  pub fn rule_cost(&self, id: TransIdx) -> &Expr {
    self.rules[&id].cost()
  }

  // endregion
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::{Guard, Relation, Substitution};

  fn loop_its() -> (ItsProblem, LocationIdx, VariableIdx) {
    let mut manager = VariableManager::new();
    let x = manager.add_fresh_variable("x");
    let (mut its, start) = ItsProblem::with_start(manager, "f");
    let guard = Guard::new(vec![Relation::gt(Expr::var(x), Expr::zero())]);
    let mut update = Substitution::new();
    update.put(x, Expr::var(x) - Expr::one());
    its.add_rule(Rule::new_linear(start, guard, Expr::one(), start, update));
    (its, start, x)
  }

  #[test]
  fn incidence_lists_are_consistent() {
    let (its, start, _) = loop_its();
    let from = its.transitions_from(start);
    let to = its.transitions_to(start);
    assert_eq!(from, to);
    assert_eq!(its.simple_loops_at(start), from);
  }

  #[test]
  fn transition_ids_are_monotonic() {
    let (mut its, start, _) = loop_its();
    let first = its.add_rule(Rule::dummy(start, start));
    its.remove_rule(first);
    let second = its.add_rule(Rule::dummy(start, start));
    assert!(second > first);
  }

  #[test]
  #[should_panic]
  fn removing_referenced_location_is_fatal() {
    let (mut its, start, _) = loop_its();
    its.remove_only_location(start);
  }

  #[test]
  #[should_panic]
  fn updating_temporary_is_fatal() {
    let mut manager = VariableManager::new();
    let t = manager.add_fresh_temporary_variable("t");
    let (mut its, start) = ItsProblem::with_start(manager, "f");
    let mut update = Substitution::new();
    update.put(t, Expr::zero());
    its.add_rule(Rule::new_linear(start, Guard::empty(), Expr::zero(), start, update));
  }
}
